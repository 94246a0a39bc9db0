use rand::Rng;

use crate::{LoadErr, SampleSource, source::check_bounds};

/// The ordered concatenation of several sources into one logical dataset.
///
/// Global index `i` maps to the first source whose cumulative length exceeds `i`.
#[derive(Debug)]
pub struct Concat<S> {
    sources: Vec<S>,
    ends: Vec<usize>,
}

impl<S: SampleSource> Concat<S> {
    pub fn new(sources: Vec<S>) -> Self {
        let ends = sources
            .iter()
            .scan(0, |acc, source| {
                *acc += source.len();
                Some(*acc)
            })
            .collect();

        Self { sources, ends }
    }

    pub fn sources(&self) -> &[S] {
        &self.sources
    }

    /// Maps a global index to the source holding it and the index inside that source.
    pub fn locate(&self, index: usize) -> Result<(usize, usize), LoadErr> {
        check_bounds(index, self.len())?;

        let source = self.ends.partition_point(|&end| end <= index);
        let start = if source == 0 { 0 } else { self.ends[source - 1] };
        Ok((source, index - start))
    }
}

impl<S: SampleSource> SampleSource for Concat<S> {
    type Sample = S::Sample;

    fn len(&self) -> usize {
        self.ends.last().copied().unwrap_or(0)
    }

    fn get<R: Rng + ?Sized>(&self, index: usize, rng: &mut R) -> Result<Self::Sample, LoadErr> {
        let (source, local) = self.locate(index)?;
        self.sources[source].get(local, rng)
    }
}
