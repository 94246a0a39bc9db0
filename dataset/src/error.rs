use std::{
    error::Error,
    fmt::{self, Display},
    io,
    path::PathBuf,
};

use arrow::error::ArrowError;
use image::ImageError;
use ndarray::ShapeError;

/// Failures while locating or opening the data files.
#[derive(Debug)]
pub enum SourceErr {
    Pattern(glob::PatternError),
    NoShards {
        root: PathBuf,
        pattern: String,
    },
    Io {
        path: PathBuf,
        source: io::Error,
    },
    Arrow {
        path: PathBuf,
        source: ArrowError,
    },
    Schema {
        path: PathBuf,
        reason: String,
    },
}

impl Display for SourceErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceErr::Pattern(e) => write!(f, "invalid shard pattern: {e}"),
            SourceErr::NoShards { root, pattern } => write!(
                f,
                "no shard matching `{pattern}` found under {}",
                root.display()
            ),
            SourceErr::Io { path, source } => write!(f, "{}: {source}", path.display()),
            SourceErr::Arrow { path, source } => {
                write!(f, "{}: malformed arrow stream: {source}", path.display())
            }
            SourceErr::Schema { path, reason } => {
                write!(f, "{}: unexpected schema: {reason}", path.display())
            }
        }
    }
}

impl Error for SourceErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SourceErr::Pattern(e) => Some(e),
            SourceErr::Io { source, .. } => Some(source),
            SourceErr::Arrow { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<glob::PatternError> for SourceErr {
    fn from(value: glob::PatternError) -> Self {
        Self::Pattern(value)
    }
}

/// Failures while fetching, transforming or collating samples.
#[derive(Debug)]
pub enum LoadErr {
    OutOfBounds {
        index: usize,
        len: usize,
    },
    NullValue {
        column: &'static str,
        row: usize,
    },
    Decode(ImageError),
    InvalidLabel(i64),
    ShapeMismatch {
        got: Vec<usize>,
        expected: Vec<usize>,
    },
    /// Wraps the failure of a single sample with its global index.
    Sample {
        index: usize,
        source: Box<LoadErr>,
    },
    WorkerPool(rayon::ThreadPoolBuildError),
    WorkerSpawn(io::Error),
    WorkerPanicked,
    EmptyEpoch {
        epoch: usize,
    },
    Layout(ShapeError),
}

impl Display for LoadErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadErr::OutOfBounds { index, len } => {
                write!(f, "sample {index} is out of bounds for a dataset of {len}")
            }
            LoadErr::NullValue { column, row } => {
                write!(f, "null value in column `{column}` at row {row}")
            }
            LoadErr::Decode(e) => write!(f, "failed to decode image: {e}"),
            LoadErr::InvalidLabel(label) => write!(f, "invalid class label {label}"),
            LoadErr::ShapeMismatch { got, expected } => {
                write!(f, "shape mismatch: got {got:?}, expected {expected:?}")
            }
            LoadErr::Sample { index, source } => write!(f, "sample {index}: {source}"),
            LoadErr::WorkerPool(e) => write!(f, "failed to start the loader workers: {e}"),
            LoadErr::WorkerSpawn(e) => write!(f, "failed to spawn the loader thread: {e}"),
            LoadErr::WorkerPanicked => write!(f, "a loader worker panicked"),
            LoadErr::EmptyEpoch { epoch } => write!(f, "epoch {epoch} produced no batch"),
            LoadErr::Layout(e) => write!(f, "invalid array layout: {e}"),
        }
    }
}

impl Error for LoadErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            LoadErr::Decode(e) => Some(e),
            LoadErr::Sample { source, .. } => Some(source.as_ref()),
            LoadErr::WorkerPool(e) => Some(e),
            LoadErr::WorkerSpawn(e) => Some(e),
            LoadErr::Layout(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ImageError> for LoadErr {
    fn from(value: ImageError) -> Self {
        Self::Decode(value)
    }
}

impl From<ShapeError> for LoadErr {
    fn from(value: ShapeError) -> Self {
        Self::Layout(value)
    }
}
