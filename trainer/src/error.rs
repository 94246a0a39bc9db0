use std::{
    error::Error,
    fmt::{self, Display},
    io,
};

use dataset::{LoadErr, SourceErr};
use machine_learning::{DeviceErr, MlErr};

/// The trainer's result type.
pub type Result<T> = std::result::Result<T, TrainErr>;

/// The command line could not be turned into a `Config`.
#[derive(Debug)]
pub enum ConfigErr {
    /// Rejected by the parser, including `--help` and `--version` requests.
    Cli(clap::Error),
    InvalidValue {
        option: &'static str,
        reason: String,
    },
}

impl Display for ConfigErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigErr::Cli(e) => write!(f, "{e}"),
            ConfigErr::InvalidValue { option, reason } => {
                write!(f, "invalid value for {option}: {reason}")
            }
        }
    }
}

impl Error for ConfigErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ConfigErr::Cli(e) => Some(e),
            ConfigErr::InvalidValue { .. } => None,
        }
    }
}

impl From<clap::Error> for ConfigErr {
    fn from(value: clap::Error) -> Self {
        Self::Cli(value)
    }
}

/// Every way a training run can fail.
#[derive(Debug)]
pub enum TrainErr {
    Config(ConfigErr),
    Source(SourceErr),
    Load(LoadErr),
    Device(DeviceErr),
    Compute(MlErr),
    Io(io::Error),
}

impl Display for TrainErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrainErr::Config(e) => write!(f, "configuration error: {e}"),
            TrainErr::Source(e) => write!(f, "data source error: {e}"),
            TrainErr::Load(e) => write!(f, "data loading error: {e}"),
            TrainErr::Device(e) => write!(f, "device error: {e}"),
            TrainErr::Compute(e) => write!(f, "compute error: {e}"),
            TrainErr::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl Error for TrainErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            TrainErr::Config(e) => Some(e),
            TrainErr::Source(e) => Some(e),
            TrainErr::Load(e) => Some(e),
            TrainErr::Device(e) => Some(e),
            TrainErr::Compute(e) => Some(e),
            TrainErr::Io(e) => Some(e),
        }
    }
}

impl From<ConfigErr> for TrainErr {
    fn from(value: ConfigErr) -> Self {
        Self::Config(value)
    }
}

impl From<SourceErr> for TrainErr {
    fn from(value: SourceErr) -> Self {
        Self::Source(value)
    }
}

impl From<LoadErr> for TrainErr {
    fn from(value: LoadErr) -> Self {
        Self::Load(value)
    }
}

impl From<DeviceErr> for TrainErr {
    fn from(value: DeviceErr) -> Self {
        Self::Device(value)
    }
}

impl From<MlErr> for TrainErr {
    fn from(value: MlErr) -> Self {
        Self::Compute(value)
    }
}

impl From<io::Error> for TrainErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}
