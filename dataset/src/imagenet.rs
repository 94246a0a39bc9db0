//! The ImageNet-1k training split as published in the Hugging Face `datasets` cache.

use std::path::Path;

use log::info;

use crate::{
    ArrowShard, Concat, SampleSource, SourceErr,
    shards::discover_shards,
    transform::{
        Chain, DecodeImage, Normalize, RandomHorizontalFlip, RandomResizedCrop, ToFloat, ToUint8,
        TransformExt, Transformed,
    },
};

/// File names of the 257 training shards.
pub const SHARD_PATTERN: &str = "imagenet-1k-train-00???-of-00257.arrow";

pub const CROP_SIZE: usize = 224;
pub const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const STD: [f32; 3] = [0.229, 0.224, 0.225];

pub type TrainPipeline = Chain<
    Chain<
        Chain<Chain<Chain<DecodeImage, ToUint8>, RandomResizedCrop>, RandomHorizontalFlip>,
        ToFloat,
    >,
    Normalize,
>;

/// The concatenated training shards, with the training augmentations applied on access.
pub type ImageNetTrain = Transformed<Concat<ArrowShard>, TrainPipeline>;

/// Decode, random resized crop to 224x224, random horizontal flip, scale to `[0, 1]` and
/// normalize with the ImageNet channel statistics.
pub fn train_pipeline() -> TrainPipeline {
    DecodeImage
        .then(ToUint8)
        .then(RandomResizedCrop::new((CROP_SIZE, CROP_SIZE)))
        .then(RandomHorizontalFlip::new(0.5))
        .then(ToFloat)
        .then(Normalize::new(MEAN, STD))
}

/// Opens the training shards found under `root`.
pub fn open_train(root: &Path) -> Result<ImageNetTrain, SourceErr> {
    open_train_with(root, SHARD_PATTERN)
}

/// Same as `open_train` but with a custom shard file pattern.
pub fn open_train_with(root: &Path, pattern: &str) -> Result<ImageNetTrain, SourceErr> {
    let paths = discover_shards(root, pattern)?;
    let shards = paths
        .iter()
        .map(ArrowShard::open)
        .collect::<Result<Vec<_>, _>>()?;

    let concat = Concat::new(shards);
    info!(
        shards = paths.len(),
        samples = concat.len();
        "opened training set at {}",
        root.display()
    );

    Ok(Transformed::new(concat, train_pipeline()))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{ImageFormat, Rgb, RgbImage};
    use rand::{Rng, SeedableRng, rngs::StdRng};

    use super::*;
    use crate::transform::Transform;

    fn noise_png<R: Rng>(w: u32, h: u32, rng: &mut R) -> Vec<u8> {
        let img = RgbImage::from_fn(w, h, |_, _| Rgb(rng.random()));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png).unwrap();
        bytes
    }

    #[test]
    fn pipeline_normalizes_uniform_noise_per_channel() {
        let pipeline = train_pipeline();
        let mut rng = StdRng::seed_from_u64(21);
        let (mut sum, mut sq, mut count) = ([0f64; 3], [0f64; 3], 0f64);

        for i in 0..300 {
            let bytes = noise_png(24 + i % 17, 20 + i % 13, &mut rng);
            let out = pipeline.apply(bytes, &mut rng).unwrap();
            assert_eq!(out.shape(), &[3, CROP_SIZE, CROP_SIZE]);

            for (c, channel) in out.outer_iter().enumerate() {
                let (lo, hi) = (-MEAN[c] / STD[c], (1. - MEAN[c]) / STD[c]);
                for &v in channel {
                    assert!(v.is_finite() && v >= lo - 1e-4 && v <= hi + 1e-4, "{v}");
                    sum[c] += v as f64;
                    sq[c] += (v as f64).powi(2);
                }
            }
            count += (CROP_SIZE * CROP_SIZE) as f64;
        }

        for c in 0..3 {
            let mean = sum[c] / count;
            let var = sq[c] / count - mean.powi(2);
            let expected = (0.5 - MEAN[c] as f64) / STD[c] as f64;

            assert!((mean - expected).abs() < 0.06, "channel {c}: mean {mean}, expected {expected}");
            assert!(var.is_finite() && var > 0., "channel {c}: variance {var}");
        }
    }
}
