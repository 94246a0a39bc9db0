pub mod config;
pub mod driver;
pub mod error;
pub mod factory;

use std::{io::Write, sync::Arc};

use dataset::{DataLoader, imagenet};
use log::{debug, info};
use rand::{SeedableRng, rngs::StdRng};

pub use config::Config;
pub use driver::{EpochSource, TrainLoop};
pub use error::{ConfigErr, Result, TrainErr};

/// Trains the configured network on the ImageNet shards under `config.dataroot`, writing one
/// progress line per epoch on `out`.
///
/// # Returns
/// The loss reported for every epoch.
pub fn run<W: Write + ?Sized>(config: &Config, out: &mut W) -> Result<Vec<f32>> {
    info!(
        seed = config.seed,
        batch_size = config.batch_size.get(),
        epochs = config.num_epochs.get();
        "training {} on {}",
        config.arch,
        config.device
    );

    if config.use_tf32 {
        debug!("--use-tf32 has no effect, every matmul runs in full f32");
    }

    let train = Arc::new(imagenet::open_train(&config.dataroot)?);
    let loader = DataLoader::new(train, config.loader_config())?;

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut network =
        factory::build_network(config.arch, config.num_classes.get(), config.device, &mut rng)?;
    let mut optimizer =
        factory::build_optimizer(config.optimizer, network.size(), config.learning_rate);
    let loss_fn = factory::build_loss();

    TrainLoop::new(config.num_epochs, config.batches_per_epoch).run(
        &loader,
        &mut network,
        optimizer.as_mut(),
        &loss_fn,
        out,
    )
}
