use std::{ffi::OsString, num::NonZeroUsize, path::PathBuf};

use clap::{Parser, ValueEnum};
use dataset::LoaderConfig;
use machine_learning::{Device, arch::Architecture};

use crate::error::ConfigErr;

/// Where the Hugging Face cache of ImageNet-1k lives on the training cluster.
pub const DEFAULT_DATAROOT: &str = "/mimer/NOBACKUP/Datasets/ImageNet/hf-cache/imagenet-1k/default/1.0.0/09dbb3153f1ac686bac1f40d24f307c383b383bc171f2df5d9e91c1ad57455b9/";

/// The optimizers the trainer can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OptimizerKind {
    #[default]
    Adam,
    /// Plain gradient descent.
    Sgd,
}

/// Trains a ResNet image classifier on the arrow shards of ImageNet-1k.
#[derive(Debug, Parser)]
#[command(name = "train", version)]
struct Args {
    /// Samples per batch.
    #[arg(long, default_value = "64", allow_negative_numbers = true)]
    batch_size: NonZeroUsize,

    #[arg(long, default_value_t = 1e-3, allow_negative_numbers = true)]
    learning_rate: f32,

    #[arg(long, default_value = "10", allow_negative_numbers = true)]
    num_epochs: NonZeroUsize,

    /// Accepted for compatibility, it has no effect on the cpu kernels.
    #[arg(long)]
    use_tf32: bool,

    /// Background threads loading samples, 0 loads them on the training thread.
    #[arg(long, default_value_t = 4, allow_negative_numbers = true)]
    num_workers: usize,

    #[arg(long)]
    pin_memory: bool,

    /// `cpu`, `cuda` or `cuda:N`.
    #[arg(long, default_value = "cuda")]
    device: Device,

    /// Directory holding the `imagenet-1k-train-*.arrow` shards.
    #[arg(long, default_value = DEFAULT_DATAROOT)]
    dataroot: PathBuf,

    #[arg(long, default_value = "resnet50")]
    arch: Architecture,

    #[arg(long, default_value = "1000", allow_negative_numbers = true)]
    num_classes: NonZeroUsize,

    #[arg(long, value_enum, default_value_t)]
    optimizer: OptimizerKind,

    /// Seeds the initialization, the sampler and the augmentations. Random when absent.
    #[arg(long)]
    seed: Option<u64>,

    /// Visit the samples in a new random order every epoch.
    #[arg(long)]
    shuffle: bool,

    /// Skip the last batch of an epoch when it is short.
    #[arg(long)]
    drop_last: bool,

    /// Batches trained per epoch, 0 for the whole dataset.
    #[arg(long, default_value_t = 1, allow_negative_numbers = true)]
    batches_per_epoch: usize,
}

/// Everything a training run needs to know, fixed for the whole run.
#[derive(Debug, Clone)]
pub struct Config {
    pub batch_size: NonZeroUsize,
    pub learning_rate: f32,
    pub num_epochs: NonZeroUsize,
    pub use_tf32: bool,
    pub num_workers: usize,
    pub pin_memory: bool,
    pub device: Device,
    pub dataroot: PathBuf,
    pub arch: Architecture,
    pub num_classes: NonZeroUsize,
    pub optimizer: OptimizerKind,
    pub seed: u64,
    pub shuffle: bool,
    pub drop_last: bool,
    /// `None` trains on every batch of an epoch.
    pub batches_per_epoch: Option<NonZeroUsize>,
}

impl Config {
    /// Builds the configuration from command line arguments, the first one being the binary.
    ///
    /// # Errors
    /// `ConfigErr::Cli` if the arguments can't be parsed, `ConfigErr::InvalidValue` if a
    /// value is out of its range.
    pub fn try_parse_from<I, T>(args: I) -> Result<Self, ConfigErr>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        Self::from_args(Args::try_parse_from(args)?)
    }

    /// The loader settings this run asks for.
    pub fn loader_config(&self) -> LoaderConfig {
        LoaderConfig {
            batch_size: self.batch_size,
            num_workers: self.num_workers,
            pin_memory: self.pin_memory,
            shuffle: self.shuffle,
            drop_last: self.drop_last,
            seed: self.seed,
            device: self.device,
            ..Default::default()
        }
    }

    fn from_args(args: Args) -> Result<Self, ConfigErr> {
        if !args.learning_rate.is_finite() || args.learning_rate <= 0. {
            return Err(ConfigErr::InvalidValue {
                option: "--learning-rate",
                reason: format!("expected a positive number, got {}", args.learning_rate),
            });
        }

        Ok(Self {
            batch_size: args.batch_size,
            learning_rate: args.learning_rate,
            num_epochs: args.num_epochs,
            use_tf32: args.use_tf32,
            num_workers: args.num_workers,
            pin_memory: args.pin_memory,
            device: args.device,
            dataroot: args.dataroot,
            arch: args.arch,
            num_classes: args.num_classes,
            optimizer: args.optimizer,
            seed: args.seed.unwrap_or_else(rand::random),
            shuffle: args.shuffle,
            drop_last: args.drop_last,
            batches_per_epoch: NonZeroUsize::new(args.batches_per_epoch),
        })
    }
}

#[cfg(test)]
mod tests {
    use clap::error::ErrorKind;

    use super::*;

    fn parse(args: &[&str]) -> Result<Config, ConfigErr> {
        Config::try_parse_from(std::iter::once("train").chain(args.iter().copied()))
    }

    #[test]
    fn defaults_match_the_reference_run() {
        let config = parse(&[]).unwrap();

        assert_eq!(config.batch_size.get(), 64);
        assert_eq!(config.learning_rate, 1e-3);
        assert_eq!(config.num_epochs.get(), 10);
        assert!(!config.use_tf32);
        assert_eq!(config.num_workers, 4);
        assert!(!config.pin_memory);
        assert_eq!(config.device, Device::Cuda(0));
        assert_eq!(config.dataroot, PathBuf::from(DEFAULT_DATAROOT));
        assert_eq!(config.arch, Architecture::ResNet50);
        assert_eq!(config.num_classes.get(), 1000);
        assert_eq!(config.optimizer, OptimizerKind::Adam);
        assert_eq!(config.batches_per_epoch.map(NonZeroUsize::get), Some(1));
    }

    #[test]
    fn every_flag_is_read() {
        let config = parse(&[
            "--batch-size",
            "8",
            "--learning-rate",
            "0.5",
            "--num-epochs",
            "2",
            "--use-tf32",
            "--num-workers",
            "0",
            "--pin-memory",
            "--device",
            "CPU",
            "--dataroot",
            "/data/imagenet",
            "--arch",
            "resnet18",
            "--num-classes",
            "10",
            "--optimizer",
            "sgd",
            "--seed",
            "42",
            "--shuffle",
            "--drop-last",
            "--batches-per-epoch",
            "0",
        ])
        .unwrap();

        assert_eq!(config.batch_size.get(), 8);
        assert_eq!(config.learning_rate, 0.5);
        assert_eq!(config.num_epochs.get(), 2);
        assert!(config.use_tf32 && config.pin_memory && config.shuffle && config.drop_last);
        assert_eq!(config.num_workers, 0);
        assert_eq!(config.device, Device::Cpu);
        assert_eq!(config.dataroot, PathBuf::from("/data/imagenet"));
        assert_eq!(config.arch, Architecture::ResNet18);
        assert_eq!(config.num_classes.get(), 10);
        assert_eq!(config.optimizer, OptimizerKind::Sgd);
        assert_eq!(config.seed, 42);
        assert_eq!(config.batches_per_epoch, None);

        let loader = config.loader_config();
        assert_eq!(loader.batch_size.get(), 8);
        assert_eq!(loader.seed, 42);
        assert!(loader.shuffle && loader.drop_last && loader.pin_memory);
    }

    #[test]
    fn negative_batch_size_is_rejected() {
        let err = parse(&["--batch-size", "-1"]).unwrap_err();
        assert!(matches!(&err, ConfigErr::Cli(e) if e.kind() == ErrorKind::ValueValidation));
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        for args in [
            ["--batch-size", "abc"],
            ["--batch-size", "0"],
            ["--num-epochs", "0"],
            ["--num-workers", "-2"],
        ] {
            assert!(matches!(parse(&args), Err(ConfigErr::Cli(_))), "{args:?}");
        }
    }

    #[test]
    fn learning_rate_must_be_positive() {
        for lr in ["0", "-0.1", "NaN", "inf"] {
            let err = parse(&["--learning-rate", lr]).unwrap_err();
            assert!(
                matches!(err, ConfigErr::InvalidValue { option: "--learning-rate", .. }),
                "{lr}"
            );
        }
    }

    #[test]
    fn unknown_devices_and_architectures_are_rejected() {
        assert!(matches!(parse(&["--device", "tpu"]), Err(ConfigErr::Cli(_))));
        assert!(matches!(parse(&["--arch", "vgg16"]), Err(ConfigErr::Cli(_))));
        assert_eq!(parse(&["--device", "cuda:3"]).unwrap().device, Device::Cuda(3));
    }

    #[test]
    fn help_is_reported_through_the_parser() {
        let err = parse(&["--help"]).unwrap_err();
        assert!(matches!(&err, ConfigErr::Cli(e) if e.kind() == ErrorKind::DisplayHelp));
    }
}
