use std::{
    error::Error,
    fmt::{self, Display},
};

use ndarray::ShapeError;

use crate::Device;

/// The result type used in the entire machine learning module.
pub type Result<T> = std::result::Result<T, MlErr>;

/// The machine learning module's error type.
///
/// Every variant is a failure of the forward or backward computation, none of them
/// is recoverable by the training loop.
#[derive(Debug)]
pub enum MlErr {
    SizeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    ShapeMismatch {
        what: &'static str,
        got: Vec<usize>,
        expected: Vec<usize>,
    },
    LabelOutOfRange {
        label: usize,
        classes: usize,
    },
    NotForwarded {
        layer: &'static str,
    },
    DeviceMismatch {
        expected: Device,
        got: Device,
    },
    Init(String),
    Layout(ShapeError),
}

impl Display for MlErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MlErr::SizeMismatch {
                what,
                got,
                expected,
            } => write!(f, "size mismatch for {what}: got {got}, expected {expected}"),
            MlErr::ShapeMismatch {
                what,
                got,
                expected,
            } => write!(
                f,
                "shape mismatch for {what}: got {got:?}, expected {expected:?}"
            ),
            MlErr::LabelOutOfRange { label, classes } => write!(
                f,
                "label {label} is out of range for a model with {classes} classes"
            ),
            MlErr::NotForwarded { layer } => {
                write!(f, "backward called on {layer} before a forward pass")
            }
            MlErr::DeviceMismatch { expected, got } => {
                write!(f, "tensor lives on {got} but the model lives on {expected}")
            }
            MlErr::Init(detail) => write!(f, "failed to initialize parameters: {detail}"),
            MlErr::Layout(e) => write!(f, "invalid array layout: {e}"),
        }
    }
}

impl Error for MlErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            MlErr::Layout(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ShapeError> for MlErr {
    fn from(value: ShapeError) -> Self {
        Self::Layout(value)
    }
}
