mod convert;
mod crop;
mod flip;

pub use convert::{DecodeImage, Normalize, ToFloat, ToUint8};
pub use crop::{RandomResizedCrop, resize};
pub use flip::RandomHorizontalFlip;

use rand::Rng;

use crate::{Labeled, LoadErr, SampleSource};

/// A step of a sample pipeline.
///
/// Transforms are pure functions of their input and `rng`, so the same seed always produces
/// the same sample no matter which worker runs it.
pub trait Transform<I>: Send + Sync {
    type Output;

    fn apply<R: Rng + ?Sized>(&self, input: I, rng: &mut R) -> Result<Self::Output, LoadErr>;
}

/// Composition helpers for every `Transform`.
pub trait TransformExt<I>: Transform<I> + Sized {
    /// Feeds the output of `self` into `next`.
    fn then<T>(self, next: T) -> Chain<Self, T>
    where
        T: Transform<Self::Output>,
    {
        Chain {
            first: self,
            second: next,
        }
    }
}

impl<I, T: Transform<I>> TransformExt<I> for T {}

/// Two transforms applied one after the other.
#[derive(Debug, Clone)]
pub struct Chain<A, B> {
    first: A,
    second: B,
}

impl<I, A, B> Transform<I> for Chain<A, B>
where
    A: Transform<I>,
    B: Transform<A::Output>,
{
    type Output = B::Output;

    fn apply<R: Rng + ?Sized>(&self, input: I, rng: &mut R) -> Result<Self::Output, LoadErr> {
        let mid = self.first.apply(input, rng)?;
        self.second.apply(mid, rng)
    }
}

/// A source whose inputs go through `transform` every time they are fetched.
#[derive(Debug)]
pub struct Transformed<S, T> {
    source: S,
    transform: T,
}

impl<S, T> Transformed<S, T> {
    pub fn new(source: S, transform: T) -> Self {
        Self { source, transform }
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}

impl<S, T, I> SampleSource for Transformed<S, T>
where
    S: SampleSource<Sample = Labeled<I>>,
    T: Transform<I>,
    T::Output: Send,
{
    type Sample = Labeled<T::Output>;

    fn len(&self) -> usize {
        self.source.len()
    }

    fn get<R: Rng + ?Sized>(&self, index: usize, rng: &mut R) -> Result<Self::Sample, LoadErr> {
        let sample = self.source.get(index, rng)?;
        sample.try_map(|input| self.transform.apply(input, rng))
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    struct AddOne;

    impl Transform<i32> for AddOne {
        type Output = i32;

        fn apply<R: Rng + ?Sized>(&self, input: i32, _: &mut R) -> Result<i32, LoadErr> {
            Ok(input + 1)
        }
    }

    struct Double;

    impl Transform<i32> for Double {
        type Output = i64;

        fn apply<R: Rng + ?Sized>(&self, input: i32, _: &mut R) -> Result<i64, LoadErr> {
            Ok(input as i64 * 2)
        }
    }

    #[test]
    fn chains_apply_in_order() {
        let mut rng = StdRng::seed_from_u64(0);
        let pipeline = AddOne.then(AddOne).then(Double);

        assert_eq!(pipeline.apply(3, &mut rng).unwrap(), 10);
    }
}
