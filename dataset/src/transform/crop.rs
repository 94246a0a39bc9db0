use std::ops::RangeInclusive;

use ndarray::{Array3, ArrayView3, Axis, s};
use rand::Rng;

use super::Transform;
use crate::LoadErr;

const ATTEMPTS: usize = 10;

/// Crops a random region of random area and aspect ratio, then resizes it to `size`.
///
/// The region covers a fraction of the image drawn uniformly from `scale` and has an aspect
/// ratio drawn log-uniformly from `ratio`. When no valid region is found after ten draws the
/// whole image is center cropped to the closest allowed ratio.
#[derive(Debug, Clone)]
pub struct RandomResizedCrop {
    size: (usize, usize),
    scale: (f32, f32),
    ratio: (f32, f32),
}

impl RandomResizedCrop {
    /// # Arguments
    /// * `size` - The `(height, width)` of the output.
    pub fn new(size: (usize, usize)) -> Self {
        Self {
            size,
            scale: (0.08, 1.0),
            ratio: (3. / 4., 4. / 3.),
        }
    }

    pub fn with_scale(mut self, lo: f32, hi: f32) -> Self {
        self.scale = (lo, hi);
        self
    }

    pub fn with_ratio(mut self, lo: f32, hi: f32) -> Self {
        self.ratio = (lo, hi);
        self
    }

    /// Draws the crop region of an `h` by `w` image.
    ///
    /// # Returns
    /// The `(top, left, height, width)` of the region.
    pub fn region<R: Rng + ?Sized>(
        &self,
        h: usize,
        w: usize,
        rng: &mut R,
    ) -> (usize, usize, usize, usize) {
        let area = (h * w) as f32;
        let log_ratio = self.ratio.0.ln()..=self.ratio.1.ln();
        let scale = self.scale.0..=self.scale.1;

        for _ in 0..ATTEMPTS {
            let target_area = area * draw(rng, scale.clone());
            let aspect = draw(rng, log_ratio.clone()).exp();

            let cw = (target_area * aspect).sqrt().round() as usize;
            let ch = (target_area / aspect).sqrt().round() as usize;

            if 0 < cw && cw <= w && 0 < ch && ch <= h {
                let top = rng.random_range(0..=h - ch);
                let left = rng.random_range(0..=w - cw);
                return (top, left, ch, cw);
            }
        }

        let in_ratio = w as f32 / h as f32;
        let (ch, cw) = if in_ratio < self.ratio.0 {
            (((w as f32) / self.ratio.0).round() as usize, w)
        } else if in_ratio > self.ratio.1 {
            (h, ((h as f32) * self.ratio.1).round() as usize)
        } else {
            (h, w)
        };

        let (ch, cw) = (ch.clamp(1, h), cw.clamp(1, w));
        ((h - ch) / 2, (w - cw) / 2, ch, cw)
    }
}

fn draw<R: Rng + ?Sized>(rng: &mut R, range: RangeInclusive<f32>) -> f32 {
    if range.start() >= range.end() {
        return *range.start();
    }

    rng.random_range(range)
}

impl Transform<Array3<u8>> for RandomResizedCrop {
    type Output = Array3<u8>;

    fn apply<R: Rng + ?Sized>(&self, input: Array3<u8>, rng: &mut R) -> Result<Array3<u8>, LoadErr> {
        let (c, h, w) = input.dim();

        if h == 0 || w == 0 {
            return Err(LoadErr::ShapeMismatch {
                got: vec![c, h, w],
                expected: vec![c, self.size.0, self.size.1],
            });
        }

        let (top, left, ch, cw) = self.region(h, w, rng);
        let crop = input.slice(s![.., top..top + ch, left..left + cw]);
        Ok(resize(crop, self.size))
    }
}

/// Per output pixel: the first input pixel read and the weights of the pixels read.
type Taps = Vec<(usize, Vec<f32>)>;

/// Triangle filter taps for resampling `in_len` pixels into `out_len`.
///
/// When shrinking, the filter support is widened by the shrink factor so every input pixel
/// contributes, which antialiases the output.
fn taps(in_len: usize, out_len: usize) -> Taps {
    let scale = in_len as f32 / out_len as f32;
    let filter_scale = scale.max(1.);
    let support = filter_scale;

    (0..out_len)
        .map(|o| {
            let center = (o as f32 + 0.5) * scale;
            let lo = ((center - support).floor().max(0.)) as usize;
            let hi = ((center + support).ceil() as usize).min(in_len);

            let mut weights: Vec<f32> = (lo..hi)
                .map(|i| {
                    let x = (i as f32 + 0.5 - center) / filter_scale;
                    (1. - x.abs()).max(0.)
                })
                .collect();

            let total: f32 = weights.iter().sum();
            if total > 0. {
                weights.iter_mut().for_each(|w| *w /= total);
            }

            (lo, weights)
        })
        .collect()
}

/// Resamples along `axis` with the given taps.
fn resample(input: ArrayView3<f32>, axis: Axis, taps: &Taps) -> Array3<f32> {
    let mut shape = input.raw_dim();
    shape[axis.index()] = taps.len();
    let mut out = Array3::zeros(shape);

    for (o, (lo, weights)) in taps.iter().enumerate() {
        let mut lane = out.index_axis_mut(axis, o);

        for (k, &weight) in weights.iter().enumerate() {
            lane.scaled_add(weight, &input.index_axis(axis, lo + k));
        }
    }

    out
}

/// Resizes a `[C, H, W]` image to `(height, width)` with an antialiased bilinear filter.
pub fn resize(input: ArrayView3<u8>, size: (usize, usize)) -> Array3<u8> {
    let (_, h, w) = input.dim();
    let x = input.mapv(f32::from);

    let x = resample(x.view(), Axis(2), &taps(w, size.1));
    let x = resample(x.view(), Axis(1), &taps(h, size.0));

    x.mapv(|v| v.round().clamp(0., 255.) as u8)
}
