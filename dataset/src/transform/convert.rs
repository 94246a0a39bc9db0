use image::DynamicImage;
use ndarray::{Array3, Axis, Zip};
use rand::Rng;

use super::Transform;
use crate::LoadErr;

/// Decodes the encoded bytes of an image (JPEG or PNG).
#[derive(Debug, Default, Clone, Copy)]
pub struct DecodeImage;

impl Transform<Vec<u8>> for DecodeImage {
    type Output = DynamicImage;

    fn apply<R: Rng + ?Sized>(&self, input: Vec<u8>, _: &mut R) -> Result<DynamicImage, LoadErr> {
        Ok(image::load_from_memory(&input)?)
    }
}

/// Converts an image of any pixel format into 8 bit RGB in `[C, H, W]` layout, rescaling the
/// value range of deeper formats.
#[derive(Debug, Default, Clone, Copy)]
pub struct ToUint8;

impl Transform<DynamicImage> for ToUint8 {
    type Output = Array3<u8>;

    fn apply<R: Rng + ?Sized>(&self, input: DynamicImage, _: &mut R) -> Result<Array3<u8>, LoadErr> {
        let rgb = input.to_rgb8();
        let (w, h) = rgb.dimensions();
        let hwc = Array3::from_shape_vec((h as usize, w as usize, 3), rgb.into_raw())?;

        Ok(hwc.permuted_axes([2, 0, 1]).as_standard_layout().into_owned())
    }
}

/// Maps `u8` pixels into `[0, 1]`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ToFloat;

impl Transform<Array3<u8>> for ToFloat {
    type Output = Array3<f32>;

    fn apply<R: Rng + ?Sized>(&self, input: Array3<u8>, _: &mut R) -> Result<Array3<f32>, LoadErr> {
        Ok(input.mapv(|v| v as f32 / 255.))
    }
}

/// Per channel standardization, `(x - mean) / std`.
#[derive(Debug, Clone)]
pub struct Normalize {
    mean: Vec<f32>,
    std: Vec<f32>,
}

impl Normalize {
    pub fn new(mean: impl Into<Vec<f32>>, std: impl Into<Vec<f32>>) -> Self {
        Self {
            mean: mean.into(),
            std: std.into(),
        }
    }
}

impl Transform<Array3<f32>> for Normalize {
    type Output = Array3<f32>;

    fn apply<R: Rng + ?Sized>(
        &self,
        mut input: Array3<f32>,
        _: &mut R,
    ) -> Result<Array3<f32>, LoadErr> {
        let (c, h, w) = input.dim();

        if c != self.mean.len() || c != self.std.len() {
            return Err(LoadErr::ShapeMismatch {
                got: vec![c, h, w],
                expected: vec![self.mean.len(), h, w],
            });
        }

        Zip::from(input.axis_iter_mut(Axis(0)))
            .and(&self.mean[..])
            .and(&self.std[..])
            .for_each(|mut channel, &mean, &std| channel.mapv_inplace(|v| (v - mean) / std));

        Ok(input)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{ImageBuffer, ImageFormat, Luma, Rgb, RgbImage};
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    fn png(img: DynamicImage) -> Vec<u8> {
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png).unwrap();
        bytes
    }

    #[test]
    fn decodes_into_channels_first() {
        let mut rng = StdRng::seed_from_u64(0);
        let img = RgbImage::from_fn(3, 2, |x, y| Rgb([x as u8, y as u8, 200]));

        let decoded = DecodeImage.apply(png(img.into()), &mut rng).unwrap();
        let chw = ToUint8.apply(decoded, &mut rng).unwrap();

        assert_eq!(chw.dim(), (3, 2, 3));
        assert_eq!(chw[[0, 1, 2]], 2);
        assert_eq!(chw[[1, 1, 2]], 1);
        assert_eq!(chw[[2, 0, 0]], 200);
    }

    #[test]
    fn deep_grayscale_is_rescaled_to_rgb() {
        let mut rng = StdRng::seed_from_u64(0);
        let img = ImageBuffer::from_pixel(2, 2, Luma([u16::MAX]));

        let chw = ToUint8
            .apply(DynamicImage::ImageLuma16(img), &mut rng)
            .unwrap();

        assert_eq!(chw.dim(), (3, 2, 2));
        assert!(chw.iter().all(|&v| v == 255));
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        let mut rng = StdRng::seed_from_u64(0);
        let err = DecodeImage.apply(vec![1, 2, 3, 4], &mut rng);
        assert!(matches!(err, Err(LoadErr::Decode(_))));
    }

    #[test]
    fn channel_constants_normalize_to_zero_and_one() {
        let mut rng = StdRng::seed_from_u64(0);
        let mean: [f32; 3] = [0.485, 0.456, 0.406];
        let std: [f32; 3] = [0.229, 0.224, 0.225];
        let normalize = Normalize::new(mean, std);

        let at_mean = Array3::from_shape_fn((3, 2, 2), |(c, _, _)| mean[c]);
        let out = normalize.apply(at_mean, &mut rng).unwrap();
        assert!(out.iter().all(|v| v.abs() < 1e-6));

        let one_std = Array3::from_shape_fn((3, 2, 2), |(c, _, _)| mean[c] + std[c]);
        let out = normalize.apply(one_std, &mut rng).unwrap();
        assert!(out.iter().all(|v| (v - 1.0).abs() < 1e-5));
    }

    #[test]
    fn normalize_rejects_other_channel_counts() {
        let mut rng = StdRng::seed_from_u64(0);
        let normalize = Normalize::new([0.5f32; 3], [0.5f32; 3]);

        let err = normalize.apply(Array3::zeros((1, 2, 2)), &mut rng);
        assert!(matches!(err, Err(LoadErr::ShapeMismatch { .. })));
    }

    #[test]
    fn to_float_scales_into_the_unit_range() {
        let mut rng = StdRng::seed_from_u64(0);
        let x = Array3::from_shape_vec((1, 1, 3), vec![0u8, 51, 255]).unwrap();

        let y = ToFloat.apply(x, &mut rng).unwrap();
        assert_eq!(y.as_slice().unwrap(), &[0.0, 0.2, 1.0]);
    }
}
