//! In-memory random sources for exercising models and loaders without any data on disk.

use std::num::NonZeroUsize;

use ndarray::{Array1, Array2, ArrayView1, Axis};
use ndarray_rand::{RandomExt, rand_distr::StandardNormal};
use rand::Rng;

use crate::{LoadErr, SampleSource, loader::Collate, source::check_bounds};

/// `length` rows of `size` standard normal features, each with the target `sin(max(row))`.
#[derive(Debug, Clone)]
pub struct RandomDataset {
    data: Array2<f32>,
    targets: Array1<f32>,
}

impl RandomDataset {
    pub fn new<R: Rng + ?Sized>(size: usize, length: usize, rng: &mut R) -> Self {
        let data = Array2::random_using((length, size), StandardNormal, rng);
        let targets = data
            .axis_iter(Axis(0))
            .map(|row| row.fold(f32::NEG_INFINITY, |m, &v| m.max(v)).sin())
            .collect();

        Self { data, targets }
    }

    pub fn data(&self) -> &Array2<f32> {
        &self.data
    }

    pub fn targets(&self) -> ArrayView1<'_, f32> {
        self.targets.view()
    }
}

impl SampleSource for RandomDataset {
    type Sample = (Array1<f32>, f32);

    fn len(&self) -> usize {
        self.targets.len()
    }

    fn get<R: Rng + ?Sized>(&self, index: usize, _: &mut R) -> Result<Self::Sample, LoadErr> {
        check_bounds(index, self.len())?;
        Ok((self.data.row(index).to_owned(), self.targets[index]))
    }
}

/// Stacked feature rows and their targets.
#[derive(Debug, Clone)]
pub struct TensorBatch {
    pub inputs: Array2<f32>,
    pub targets: Array1<f32>,
}

impl Collate for (Array1<f32>, f32) {
    type Batch = TensorBatch;

    fn collate(samples: Vec<Self>) -> Result<TensorBatch, LoadErr> {
        let views: Vec<_> = samples.iter().map(|(x, _)| x.view()).collect();
        let inputs = ndarray::stack(Axis(0), &views)?;
        let targets = samples.iter().map(|&(_, y)| y).collect();

        Ok(TensorBatch { inputs, targets })
    }
}

/// `n_sentences` sequences of `context_size` token ids drawn uniformly below `vocab_size`.
#[derive(Debug, Clone)]
pub struct RandomCorpus {
    tokens: Array2<usize>,
    vocab_size: usize,
}

impl RandomCorpus {
    pub fn new<R: Rng + ?Sized>(
        n_sentences: usize,
        context_size: usize,
        vocab_size: NonZeroUsize,
        rng: &mut R,
    ) -> Self {
        let vocab_size = vocab_size.get();
        let tokens = Array2::from_shape_simple_fn((n_sentences, context_size), || {
            rng.random_range(0..vocab_size)
        });

        Self { tokens, vocab_size }
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }
}

impl SampleSource for RandomCorpus {
    type Sample = Array1<usize>;

    fn len(&self) -> usize {
        self.tokens.nrows()
    }

    fn get<R: Rng + ?Sized>(&self, index: usize, _: &mut R) -> Result<Array1<usize>, LoadErr> {
        check_bounds(index, self.len())?;
        Ok(self.tokens.row(index).to_owned())
    }
}

impl Collate for Array1<usize> {
    type Batch = Array2<usize>;

    fn collate(samples: Vec<Self>) -> Result<Array2<usize>, LoadErr> {
        let views: Vec<_> = samples.iter().map(|row| row.view()).collect();
        Ok(ndarray::stack(Axis(0), &views)?)
    }
}
