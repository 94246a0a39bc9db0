use std::{
    error::Error,
    fmt::{self, Display},
    str::FromStr,
};

/// A compute device tensors and models can be placed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Device {
    #[default]
    Cpu,
    Cuda(usize),
}

impl Device {
    /// Checks that this build can execute on the device.
    ///
    /// # Returns
    /// An error if the device is not backed by any kernel implementation.
    pub fn ensure_available(self) -> Result<(), DeviceErr> {
        match self {
            Device::Cpu => Ok(()),
            Device::Cuda(_) => Err(DeviceErr::Unavailable { device: self }),
        }
    }
}

impl Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda(ordinal) => write!(f, "cuda:{ordinal}"),
        }
    }
}

impl FromStr for Device {
    type Err = ParseDeviceErr;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();

        let (kind, ordinal) = match lower.split_once(':') {
            Some((kind, ordinal)) => (kind, Some(ordinal)),
            None => (lower.as_str(), None),
        };

        match (kind, ordinal) {
            ("cpu", None) => Ok(Device::Cpu),
            ("cuda", None) => Ok(Device::Cuda(0)),
            ("cuda", Some(ordinal)) => ordinal
                .parse()
                .map(Device::Cuda)
                .map_err(|_| ParseDeviceErr(s.to_string())),
            _ => Err(ParseDeviceErr(s.to_string())),
        }
    }
}

/// Returned when a device identifier can't be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseDeviceErr(String);

impl Display for ParseDeviceErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown device `{}`, expected `cpu`, `cuda` or `cuda:<ordinal>`",
            self.0
        )
    }
}

impl Error for ParseDeviceErr {}

/// The requested compute device can't be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceErr {
    Unavailable { device: Device },
}

impl Display for DeviceErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceErr::Unavailable { device } => write!(
                f,
                "device {device} is not available in this build, use `--device cpu`"
            ),
        }
    }
}

impl Error for DeviceErr {}
