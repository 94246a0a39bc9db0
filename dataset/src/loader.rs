use std::{
    num::NonZeroUsize,
    sync::Arc,
    thread::{self, JoinHandle},
    vec,
};

use log::{debug, warn};
use machine_learning::Device;
use ndarray::{Array1, Array3, Array4, Axis};
use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};
use rayon::{ThreadPool, ThreadPoolBuilder, prelude::*};
use tokio::sync::mpsc;

use crate::{Labeled, LoadErr, SampleSource};

const DEFAULT_BATCH_SIZE: NonZeroUsize = NonZeroUsize::new(64).unwrap();
const DEFAULT_PREFETCH_FACTOR: NonZeroUsize = NonZeroUsize::new(2).unwrap();

/// How a `DataLoader` splits, orders and prefetches the samples of its source.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    pub batch_size: NonZeroUsize,
    /// Threads fetching samples in the background, `0` loads on the caller's thread.
    pub num_workers: usize,
    pub pin_memory: bool,
    pub shuffle: bool,
    /// Whether to skip the last batch when it is shorter than `batch_size`.
    pub drop_last: bool,
    /// Batches buffered per worker.
    pub prefetch_factor: NonZeroUsize,
    pub seed: u64,
    pub device: Device,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            num_workers: 4,
            pin_memory: false,
            shuffle: false,
            drop_last: false,
            prefetch_factor: DEFAULT_PREFETCH_FACTOR,
            seed: rand::random(),
            device: Device::default(),
        }
    }
}

/// Merges the samples of a batch into a single value.
pub trait Collate: Sized + Send {
    type Batch: Send;

    fn collate(samples: Vec<Self>) -> Result<Self::Batch, LoadErr>;
}

/// A batch of `[C, H, W]` images and their class indices.
#[derive(Debug, Clone)]
pub struct ImageBatch {
    /// `[N, C, H, W]`.
    pub inputs: Array4<f32>,
    pub labels: Array1<usize>,
}

impl ImageBatch {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

impl Collate for Labeled<Array3<f32>> {
    type Batch = ImageBatch;

    fn collate(samples: Vec<Self>) -> Result<ImageBatch, LoadErr> {
        let mut labels = Vec::with_capacity(samples.len());

        if let Some(first) = samples.first() {
            for sample in &samples {
                if sample.input.dim() != first.input.dim() {
                    return Err(LoadErr::ShapeMismatch {
                        got: sample.input.shape().to_vec(),
                        expected: first.input.shape().to_vec(),
                    });
                }

                let label =
                    usize::try_from(sample.label).map_err(|_| LoadErr::InvalidLabel(sample.label))?;
                labels.push(label);
            }
        }

        let views: Vec<_> = samples.iter().map(|sample| sample.input.view()).collect();
        let inputs = ndarray::stack(Axis(0), &views)?;

        Ok(ImageBatch {
            inputs,
            labels: Array1::from(labels),
        })
    }
}

/// A collated batch as handed to the training loop.
#[derive(Debug, Clone)]
pub struct Batch<B> {
    pub data: B,
    /// Position of the batch inside its epoch.
    pub index: usize,
    pub device: Device,
    /// Whether page locked staging was asked for. No backend stages batches yet, so they are
    /// always pageable.
    pub pin_requested: bool,
}

/// The item every epoch iterator yields.
pub type BatchResult<D> = Result<Batch<<<D as SampleSource>::Sample as Collate>::Batch>, LoadErr>;

/// Splits a source into batches, one epoch at a time.
///
/// With workers, a producer thread assembles the batches in order while the samples of each
/// batch are fetched in parallel, staying at most `num_workers * prefetch_factor` batches ahead
/// of the consumer.
pub struct DataLoader<D> {
    source: Arc<D>,
    config: LoaderConfig,
    pool: Option<Arc<ThreadPool>>,
}

impl<D> DataLoader<D>
where
    D: SampleSource + 'static,
    D::Sample: Collate,
{
    /// # Errors
    /// `LoadErr::WorkerPool` if the worker threads can't be started.
    pub fn new(source: Arc<D>, config: LoaderConfig) -> Result<Self, LoadErr> {
        let pool = match config.num_workers {
            0 => None,
            n => {
                let pool = ThreadPoolBuilder::new()
                    .num_threads(n)
                    .thread_name(|i| format!("loader-worker-{i}"))
                    .build()
                    .map_err(LoadErr::WorkerPool)?;

                Some(Arc::new(pool))
            }
        };

        if config.pin_memory {
            warn!("pin_memory has no effect on {}, batches stay pageable", config.device);
        }

        debug!(
            samples = source.len(),
            batch_size = config.batch_size.get(),
            workers = config.num_workers;
            "data loader ready"
        );

        Ok(Self {
            source,
            config,
            pool,
        })
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    pub fn source(&self) -> &D {
        &self.source
    }

    /// Returns the amount of batches in one epoch.
    pub fn num_batches(&self) -> usize {
        let (len, size) = (self.source.len(), self.config.batch_size.get());

        if self.config.drop_last {
            len / size
        } else {
            len.div_ceil(size)
        }
    }

    /// Starts a pass over the whole source.
    ///
    /// # Errors
    /// `LoadErr::WorkerSpawn` if the producer thread can't be spawned.
    pub fn epoch(&self, epoch: usize) -> Result<Batches<D>, LoadErr> {
        let plan = self.plan(epoch);
        let fetcher = Fetcher {
            source: Arc::clone(&self.source),
            pool: self.pool.clone(),
            seed: self.config.seed,
            epoch,
            device: self.config.device,
            pin_requested: self.config.pin_memory,
        };

        let state = match self.pool {
            None => State::Inline {
                fetcher,
                plan: plan.into_iter().enumerate(),
            },
            Some(_) => {
                let capacity = self.config.num_workers * self.config.prefetch_factor.get();
                let (tx, rx) = mpsc::channel(capacity);

                let producer = thread::Builder::new()
                    .name(format!("loader-epoch-{epoch}"))
                    .spawn(move || {
                        for (index, indices) in plan.into_iter().enumerate() {
                            let batch = fetcher.fetch(index, &indices);
                            let failed = batch.is_err();

                            // the receiver is gone once the epoch iterator is dropped
                            if tx.blocking_send(batch).is_err() || failed {
                                break;
                            }
                        }
                    })
                    .map_err(LoadErr::WorkerSpawn)?;

                State::Prefetch {
                    rx,
                    producer: Some(producer),
                }
            }
        };

        Ok(Batches { state })
    }

    /// Splits the (possibly shuffled) indices of `epoch` into batches.
    fn plan(&self, epoch: usize) -> Vec<Vec<usize>> {
        let mut order: Vec<usize> = (0..self.source.len()).collect();

        if self.config.shuffle {
            let mut rng = StdRng::seed_from_u64(mix(self.config.seed, epoch as u64));
            order.shuffle(&mut rng);
        }

        let size = self.config.batch_size.get();
        order
            .chunks(size)
            .filter(|chunk| !self.config.drop_last || chunk.len() == size)
            .map(<[usize]>::to_vec)
            .collect()
    }
}

fn mix(a: u64, b: u64) -> u64 {
    (a ^ b.wrapping_mul(0x9E37_79B9_7F4A_7C15))
        .wrapping_mul(0xBF58_476D_1CE4_E5B9)
        .rotate_left(31)
}

/// The random state of one sample, a function of its position only.
fn sample_rng(seed: u64, epoch: usize, index: usize) -> StdRng {
    StdRng::seed_from_u64(mix(mix(seed, epoch as u64), index as u64))
}

struct Fetcher<D> {
    source: Arc<D>,
    pool: Option<Arc<ThreadPool>>,
    seed: u64,
    epoch: usize,
    device: Device,
    pin_requested: bool,
}

impl<D> Fetcher<D>
where
    D: SampleSource,
    D::Sample: Collate,
{
    fn fetch(&self, index: usize, indices: &[usize]) -> BatchResult<D> {
        let get = |&i: &usize| {
            let mut rng = sample_rng(self.seed, self.epoch, i);

            self.source.get(i, &mut rng).map_err(|e| LoadErr::Sample {
                index: i,
                source: Box::new(e),
            })
        };

        let samples = match &self.pool {
            Some(pool) => pool.install(|| indices.par_iter().map(get).collect::<Result<Vec<_>, _>>()),
            None => indices.iter().map(get).collect::<Result<Vec<_>, _>>(),
        }?;

        Ok(Batch {
            data: <D::Sample as Collate>::collate(samples)?,
            index,
            device: self.device,
            pin_requested: self.pin_requested,
        })
    }
}

enum State<D>
where
    D: SampleSource,
    D::Sample: Collate,
{
    Inline {
        fetcher: Fetcher<D>,
        plan: std::iter::Enumerate<vec::IntoIter<Vec<usize>>>,
    },
    Prefetch {
        rx: mpsc::Receiver<BatchResult<D>>,
        producer: Option<JoinHandle<()>>,
    },
}

/// The batches of one epoch, in order.
///
/// Dropping it early stops the background producer before its next batch.
pub struct Batches<D>
where
    D: SampleSource,
    D::Sample: Collate,
{
    state: State<D>,
}

impl<D> Iterator for Batches<D>
where
    D: SampleSource,
    D::Sample: Collate,
{
    type Item = BatchResult<D>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.state {
            State::Inline { fetcher, plan } => {
                let (index, indices) = plan.next()?;
                Some(fetcher.fetch(index, &indices))
            }
            State::Prefetch { rx, producer } => {
                if let Some(batch) = rx.blocking_recv() {
                    return Some(batch);
                }

                // closed channel: the producer either finished or died mid batch
                match producer.take()?.join() {
                    Ok(()) => None,
                    Err(_) => Some(Err(LoadErr::WorkerPanicked)),
                }
            }
        }
    }
}
