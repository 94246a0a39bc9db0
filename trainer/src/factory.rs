use log::info;
use machine_learning::{
    Device, Network,
    arch::{Architecture, Sequential},
    loss::CrossEntropy,
    optimization::{Adam, GradientDescent, Optimizer},
};
use rand::Rng;

use crate::{config::OptimizerKind, error::Result};

/// Builds `arch` with `num_classes` outputs, randomly initialized and placed on `device`.
///
/// # Errors
/// `TrainErr::Device` if this build can't run on `device`.
pub fn build_network<R: Rng + ?Sized>(
    arch: Architecture,
    num_classes: usize,
    device: Device,
    rng: &mut R,
) -> Result<Network<Sequential>> {
    device.ensure_available()?;

    let network = Network::new(arch.build(num_classes), device, rng)?;
    info!(params = network.size(); "built {arch} with {num_classes} classes on {device}");
    Ok(network)
}

/// Builds the optimizer of a network holding `len` parameters.
pub fn build_optimizer(kind: OptimizerKind, len: usize, learning_rate: f32) -> Box<dyn Optimizer> {
    match kind {
        OptimizerKind::Adam => Box::new(Adam::new(len, learning_rate)),
        OptimizerKind::Sgd => Box::new(GradientDescent::new(learning_rate)),
    }
}

pub fn build_loss() -> CrossEntropy {
    CrossEntropy::new()
}
