use std::{io::Write, num::NonZeroUsize};

use dataset::{Batch, Batches, Collate, DataLoader, ImageBatch, LoadErr, SampleSource};
use log::{debug, info};
use machine_learning::{Network, arch::Model, loss::LossFn, optimization::Optimizer};

use crate::error::Result;

/// Anything that can hand out the image batches of an epoch.
pub trait EpochSource {
    type Batches<'a>: Iterator<Item = std::result::Result<Batch<ImageBatch>, LoadErr>>
    where
        Self: 'a;

    fn epoch(&self, epoch: usize) -> std::result::Result<Self::Batches<'_>, LoadErr>;
}

impl<D> EpochSource for DataLoader<D>
where
    D: SampleSource + 'static,
    D::Sample: Collate<Batch = ImageBatch>,
{
    type Batches<'a> = Batches<D>;

    fn epoch(&self, epoch: usize) -> std::result::Result<Batches<D>, LoadErr> {
        DataLoader::epoch(self, epoch)
    }
}

/// Runs the epochs of a training session.
#[derive(Debug, Clone, Copy)]
pub struct TrainLoop {
    num_epochs: NonZeroUsize,
    batches_per_epoch: Option<NonZeroUsize>,
}

impl TrainLoop {
    /// # Arguments
    /// * `num_epochs` - How many passes to make.
    /// * `batches_per_epoch` - How many batches each pass trains on, all of them when `None`.
    pub fn new(num_epochs: NonZeroUsize, batches_per_epoch: Option<NonZeroUsize>) -> Self {
        Self {
            num_epochs,
            batches_per_epoch,
        }
    }

    /// Trains `network` and reports the loss of the last batch of every epoch on `out`, as
    /// `Epoch {epoch}/{num_epochs} Loss: {loss}`.
    ///
    /// # Returns
    /// The reported losses, one per epoch.
    ///
    /// # Errors
    /// The first failure of any batch aborts the run. An epoch without batches is a
    /// `LoadErr::EmptyEpoch`.
    pub fn run<S, M, O, L, W>(
        &self,
        source: &S,
        network: &mut Network<M>,
        optimizer: &mut O,
        loss_fn: &L,
        out: &mut W,
    ) -> Result<Vec<f32>>
    where
        S: EpochSource + ?Sized,
        M: Model,
        O: Optimizer + ?Sized,
        L: LossFn + ?Sized,
        W: Write + ?Sized,
    {
        let total = self.num_epochs.get();
        let limit = self.batches_per_epoch.map_or(usize::MAX, NonZeroUsize::get);
        let mut losses = Vec::with_capacity(total);

        for epoch in 0..total {
            let mut last = None;

            for batch in source.epoch(epoch)?.take(limit) {
                let Batch {
                    data, index, device, ..
                } = batch?;

                let loss = network.train_step(
                    data.inputs,
                    data.labels.view(),
                    device,
                    loss_fn,
                    optimizer,
                )?;

                debug!(epoch = epoch + 1, batch = index, loss = loss; "step done");
                last = Some(loss);
            }

            let loss = last.ok_or(LoadErr::EmptyEpoch { epoch })?;
            writeln!(out, "Epoch {}/{total} Loss: {loss}", epoch + 1)?;
            info!(epoch = epoch + 1, loss = loss; "epoch finished");

            losses.push(loss);
        }

        Ok(losses)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        cell::{Cell, RefCell},
        vec,
    };

    use machine_learning::{
        Device, MlErr,
        arch::{Sequential, layers::Layer},
        loss::CrossEntropy,
        optimization::{Adam, GradientDescent},
    };
    use ndarray::{Array1, Array4};
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::error::TrainErr;

    /// Serves the same batches every epoch and records how many of them were consumed.
    struct Stub {
        batches: usize,
        device: Device,
        served: Cell<usize>,
        epochs: RefCell<Vec<usize>>,
    }

    impl Stub {
        fn new(batches: usize) -> Self {
            Self {
                batches,
                device: Device::Cpu,
                served: Cell::new(0),
                epochs: RefCell::new(Vec::new()),
            }
        }

        fn batch(&self, index: usize) -> std::result::Result<Batch<ImageBatch>, LoadErr> {
            self.served.set(self.served.get() + 1);

            let inputs = Array4::from_shape_fn((4, 3, 6, 6), |(n, c, i, j)| {
                ((n + 1) * (c + 1)) as f32 * 0.1 + (i * j) as f32 * 0.01
            });

            Ok(Batch {
                data: ImageBatch {
                    inputs,
                    labels: Array1::from(vec![0, 1, 2, 1]),
                },
                index,
                device: self.device,
                pin_requested: false,
            })
        }
    }

    impl EpochSource for Stub {
        type Batches<'a> = Box<dyn Iterator<Item = std::result::Result<Batch<ImageBatch>, LoadErr>> + 'a>;

        fn epoch(&self, epoch: usize) -> std::result::Result<Self::Batches<'_>, LoadErr> {
            self.epochs.borrow_mut().push(epoch);
            Ok(Box::new((0..self.batches).map(|i| self.batch(i))))
        }
    }

    fn network() -> Network<Sequential> {
        let model = Sequential::new([
            Layer::conv(3, 8, 3, 1),
            Layer::batch_norm(8),
            Layer::relu(),
            Layer::global_avg_pool(),
            Layer::dense((8, 3)),
        ]);

        let mut rng = StdRng::seed_from_u64(5);
        Network::new(model, Device::Cpu, &mut rng).unwrap()
    }

    fn epochs(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[test]
    fn one_line_per_epoch() {
        let source = Stub::new(3);
        let mut net = network();
        let mut adam = Adam::new(net.size(), 1e-3);
        let mut out = Vec::new();

        let losses = TrainLoop::new(epochs(2), NonZeroUsize::new(1))
            .run(&source, &mut net, &mut adam, &CrossEntropy, &mut out)
            .unwrap();

        let out = String::from_utf8(out).unwrap();
        let lines: Vec<_> = out.lines().collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], format!("Epoch 1/2 Loss: {}", losses[0]));
        assert_eq!(lines[1], format!("Epoch 2/2 Loss: {}", losses[1]));
        assert_eq!(*source.epochs.borrow(), [0, 1]);
    }

    #[test]
    fn only_the_first_batch_is_trained_by_default() {
        let source = Stub::new(5);
        let mut net = network();
        let mut sgd = GradientDescent::new(1e-2);

        TrainLoop::new(epochs(3), NonZeroUsize::new(1))
            .run(&source, &mut net, &mut sgd, &CrossEntropy, &mut Vec::new())
            .unwrap();

        assert_eq!(source.served.get(), 3);
    }

    #[test]
    fn full_epochs_train_every_batch() {
        let source = Stub::new(5);
        let mut net = network();
        let before = net.params().to_vec();
        let mut sgd = GradientDescent::new(1e-2);

        TrainLoop::new(epochs(2), None)
            .run(&source, &mut net, &mut sgd, &CrossEntropy, &mut Vec::new())
            .unwrap();

        assert_eq!(source.served.get(), 10);
        assert_ne!(net.params(), before.as_slice());
    }

    #[test]
    fn loss_goes_down_on_a_repeated_batch() {
        let source = Stub::new(1);
        let mut net = network();
        let mut adam = Adam::new(net.size(), 1e-2);

        let losses = TrainLoop::new(epochs(30), None)
            .run(&source, &mut net, &mut adam, &CrossEntropy, &mut Vec::new())
            .unwrap();

        assert!(losses[29] < losses[0], "{losses:?}");
    }

    #[test]
    fn empty_epochs_are_an_error() {
        let source = Stub::new(0);
        let mut net = network();
        let mut adam = Adam::new(net.size(), 1e-3);
        let mut out = Vec::new();

        let err = TrainLoop::new(epochs(2), NonZeroUsize::new(1))
            .run(&source, &mut net, &mut adam, &CrossEntropy, &mut out)
            .unwrap_err();

        assert!(matches!(err, TrainErr::Load(LoadErr::EmptyEpoch { epoch: 0 })));
        assert!(out.is_empty());
    }

    #[test]
    fn batches_on_another_device_are_refused() {
        let source = Stub {
            device: Device::Cuda(0),
            ..Stub::new(1)
        };
        let mut net = network();
        let mut adam = Adam::new(net.size(), 1e-3);

        let err = TrainLoop::new(epochs(1), None)
            .run(&source, &mut net, &mut adam, &CrossEntropy, &mut Vec::new())
            .unwrap_err();

        assert!(matches!(err, TrainErr::Compute(MlErr::DeviceMismatch { .. })));
    }
}
