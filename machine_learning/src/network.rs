use log::debug;
use ndarray::{Array2, Array4, ArrayView1};
use rand::Rng;

use crate::{Device, MlErr, Result, arch::Model, loss::LossFn, optimization::Optimizer};

/// A model together with the buffers it trains: its parameters and its gradient.
///
/// Both buffers are flat and laid out in the order the model visits its layers on the forward
/// pass.
#[derive(Debug)]
pub struct Network<M> {
    model: M,
    params: Box<[f32]>,
    grad: Box<[f32]>,
    device: Device,
}

impl<M: Model> Network<M> {
    /// Creates a new `Network` placed on `device`, with freshly initialized parameters.
    ///
    /// # Arguments
    /// * `model` - The architecture to train.
    /// * `device` - Where the parameters live. Checking that the device is usable is up to the caller.
    /// * `rng` - The source of randomness for the initialization.
    pub fn new<R: Rng + ?Sized>(model: M, device: Device, rng: &mut R) -> Result<Self> {
        let size = model.size();
        let mut params = vec![0.; size].into_boxed_slice();
        model.init(&mut params, rng)?;
        debug!(params = size; "network initialized on {device}");

        Ok(Self {
            model,
            params,
            grad: vec![0.; size].into_boxed_slice(),
            device,
        })
    }

    /// Returns the amount of trainable parameters.
    pub fn size(&self) -> usize {
        self.params.len()
    }

    pub fn params(&self) -> &[f32] {
        &self.params
    }

    pub fn grad(&self) -> &[f32] {
        &self.grad
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Clears the gradient accumulated by previous backward passes.
    pub fn zero_grad(&mut self) {
        self.grad.fill(0.);
    }

    /// Computes the logits of a batch that lives on `device`.
    pub fn forward(&mut self, x: Array4<f32>, device: Device) -> Result<Array2<f32>> {
        if device != self.device {
            return Err(MlErr::DeviceMismatch {
                expected: self.device,
                got: device,
            });
        }

        self.model.forward(&self.params, x)
    }

    /// Accumulates into the gradient the contribution of the last forward pass.
    pub fn backward(&mut self, d: Array2<f32>) -> Result<()> {
        self.model.backward(&self.params, &mut self.grad, d)
    }

    /// Applies the accumulated gradient onto the parameters.
    pub fn step<O: Optimizer + ?Sized>(&mut self, optimizer: &mut O) -> Result<()> {
        optimizer.update_params(&mut self.params, &self.grad)
    }

    /// Runs one full optimization step over a batch: clears the gradient, makes the forward and
    /// backward passes and updates the parameters.
    ///
    /// # Returns
    /// The loss of the batch, computed before the update.
    pub fn train_step<L, O>(
        &mut self,
        x: Array4<f32>,
        labels: ArrayView1<usize>,
        device: Device,
        loss_fn: &L,
        optimizer: &mut O,
    ) -> Result<f32>
    where
        L: LossFn + ?Sized,
        O: Optimizer + ?Sized,
    {
        self.zero_grad();

        let logits = self.forward(x, device)?;
        let loss = loss_fn.loss(logits.view(), labels)?;
        let d = loss_fn.loss_prime(logits.view(), labels)?;

        self.backward(d)?;
        self.step(optimizer)?;
        Ok(loss)
    }
}
