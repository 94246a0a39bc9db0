use ndarray::Array4;
use rand::Rng;

use super::{BatchNorm2d, Conv2d, Dense, GlobalAvgPool, MaxPool2d, Relu, Residual};
use crate::Result;

#[derive(Debug, Clone)]
pub enum Layer {
    Conv(Conv2d),
    BatchNorm(BatchNorm2d),
    Relu(Relu),
    MaxPool(MaxPool2d),
    GlobalAvgPool(GlobalAvgPool),
    Dense(Dense),
    Residual(Box<Residual>),
}

impl Layer {
    pub fn conv(in_channels: usize, out_channels: usize, kernel: usize, stride: usize) -> Self {
        Self::Conv(Conv2d::new(
            in_channels,
            out_channels,
            kernel,
            stride,
            kernel / 2,
        ))
    }

    pub fn batch_norm(channels: usize) -> Self {
        Self::BatchNorm(BatchNorm2d::new(channels))
    }

    pub fn relu() -> Self {
        Self::Relu(Relu::new())
    }

    pub fn max_pool(kernel: usize, stride: usize, padding: usize) -> Self {
        Self::MaxPool(MaxPool2d::new(kernel, stride, padding))
    }

    pub fn global_avg_pool() -> Self {
        Self::GlobalAvgPool(GlobalAvgPool::new())
    }

    pub fn dense(dim: (usize, usize)) -> Self {
        Self::Dense(Dense::new(dim))
    }

    pub fn residual(block: Residual) -> Self {
        Self::Residual(Box::new(block))
    }

    /// Returns the amount of parameters this layer has.
    pub fn size(&self) -> usize {
        match self {
            Self::Conv(l) => l.size(),
            Self::BatchNorm(l) => l.size(),
            Self::Dense(l) => l.size(),
            Self::Residual(l) => l.size(),
            Self::Relu(_) | Self::MaxPool(_) | Self::GlobalAvgPool(_) => 0,
        }
    }

    /// Writes the initial values of this layer's parameters into `params`.
    pub fn init<R: Rng + ?Sized>(&self, params: &mut [f32], rng: &mut R) -> Result<()> {
        match self {
            Self::Conv(l) => l.init_params().fill(params, rng),
            Self::BatchNorm(l) => l.init_params(params),
            Self::Dense(l) => l.init_params().fill(params, rng),
            Self::Residual(l) => l.init(params, rng),
            Self::Relu(_) | Self::MaxPool(_) | Self::GlobalAvgPool(_) => Ok(()),
        }
    }

    pub fn forward(&mut self, params: &[f32], x: Array4<f32>) -> Result<Array4<f32>> {
        match self {
            Self::Conv(l) => l.forward(params, x),
            Self::BatchNorm(l) => l.forward(params, x),
            Self::Relu(l) => Ok(l.forward(x)),
            Self::MaxPool(l) => l.forward(x),
            Self::GlobalAvgPool(l) => l.forward(x),
            Self::Dense(l) => l.forward(params, x),
            Self::Residual(l) => l.forward(params, x),
        }
    }

    pub fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        d: Array4<f32>,
    ) -> Result<Array4<f32>> {
        match self {
            Self::Conv(l) => l.backward(params, grad, d),
            Self::BatchNorm(l) => l.backward(params, grad, d),
            Self::Relu(l) => l.backward(d),
            Self::MaxPool(l) => l.backward(d),
            Self::GlobalAvgPool(l) => l.backward(d),
            Self::Dense(l) => l.backward(params, grad, d),
            Self::Residual(l) => l.backward(params, grad, d),
        }
    }
}
