use rand::Rng;

use crate::LoadErr;

/// A sample together with its class label.
#[derive(Debug, Clone, PartialEq)]
pub struct Labeled<T> {
    pub input: T,
    pub label: i64,
}

impl<T> Labeled<T> {
    pub fn new(input: T, label: i64) -> Self {
        Self { input, label }
    }

    /// Transforms the input, keeping the label.
    pub fn try_map<U, E, F>(self, f: F) -> Result<Labeled<U>, E>
    where
        F: FnOnce(T) -> Result<U, E>,
    {
        Ok(Labeled {
            input: f(self.input)?,
            label: self.label,
        })
    }
}

/// A finite, randomly accessible collection of samples.
///
/// Sources are shared between the loader workers, so `get` takes `&self` and receives all the
/// randomness it may need through `rng`.
pub trait SampleSource: Send + Sync {
    type Sample: Send;

    /// Returns the amount of samples.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fetches the sample at `index`.
    ///
    /// # Errors
    /// `LoadErr::OutOfBounds` if `index >= len()`, or any error of producing the sample.
    fn get<R: Rng + ?Sized>(&self, index: usize, rng: &mut R) -> Result<Self::Sample, LoadErr>;
}

impl<S: SampleSource + ?Sized> SampleSource for std::sync::Arc<S> {
    type Sample = S::Sample;

    fn len(&self) -> usize {
        (**self).len()
    }

    fn get<R: Rng + ?Sized>(&self, index: usize, rng: &mut R) -> Result<Self::Sample, LoadErr> {
        (**self).get(index, rng)
    }
}

pub(crate) fn check_bounds(index: usize, len: usize) -> Result<(), LoadErr> {
    if index >= len {
        return Err(LoadErr::OutOfBounds { index, len });
    }

    Ok(())
}
