use ndarray::{Array2, Array3, Array4, Axis, Zip};

use crate::{MlErr, Result};

/// Max pooling over square windows. Padded positions never win.
#[derive(Debug, Clone)]
pub struct MaxPool2d {
    kernel: usize,
    stride: usize,
    padding: usize,

    // Forward metadata
    input_dim: Option<(usize, usize, usize, usize)>,
    argmax: Array4<usize>,
}

impl MaxPool2d {
    pub fn new(kernel: usize, stride: usize, padding: usize) -> Self {
        Self {
            kernel,
            stride: stride.max(1),
            padding,
            input_dim: None,
            argmax: Array4::zeros((0, 0, 0, 0)),
        }
    }

    fn out_len(&self, len: usize) -> Result<usize> {
        let padded = len + 2 * self.padding;

        if padded < self.kernel {
            return Err(MlErr::SizeMismatch {
                what: "max pool input",
                got: len,
                expected: self.kernel,
            });
        }

        Ok((padded - self.kernel) / self.stride + 1)
    }

    /// Input indices covered by the window starting at output coordinate `o`.
    fn window(&self, o: usize, len: usize) -> std::ops::Range<usize> {
        let start = o * self.stride;
        let lo = start.saturating_sub(self.padding);
        let hi = (start + self.kernel).saturating_sub(self.padding).min(len);
        lo..hi
    }

    pub fn forward(&mut self, x: Array4<f32>) -> Result<Array4<f32>> {
        let (n, c, h, w) = x.dim();
        let (oh, ow) = (self.out_len(h)?, self.out_len(w)?);

        let mut y = Array4::zeros((n, c, oh, ow));
        let mut argmax = Array4::zeros((n, c, oh, ow));

        Zip::from(y.outer_iter_mut())
            .and(argmax.outer_iter_mut())
            .and(x.outer_iter())
            .par_for_each(|mut y_i, mut arg_i, x_i| {
                for ((ch, oy, ox), out) in y_i.indexed_iter_mut() {
                    let mut best: Option<(f32, usize)> = None;

                    for iy in self.window(oy, h) {
                        for ix in self.window(ox, w) {
                            let v = x_i[[ch, iy, ix]];
                            if best.is_none_or(|(b, _)| v > b) {
                                best = Some((v, iy * w + ix));
                            }
                        }
                    }

                    let (v, at) = best.unwrap_or_default();
                    *out = v;
                    arg_i[[ch, oy, ox]] = at;
                }
            });

        self.input_dim = Some((n, c, h, w));
        self.argmax = argmax;
        Ok(y)
    }

    pub fn backward(&mut self, d: Array4<f32>) -> Result<Array4<f32>> {
        let (n, c, h, w) = self
            .input_dim
            .take()
            .ok_or(MlErr::NotForwarded { layer: "max pool" })?;

        if d.shape() != self.argmax.shape() {
            return Err(MlErr::ShapeMismatch {
                what: "max pool delta",
                got: d.shape().to_vec(),
                expected: self.argmax.shape().to_vec(),
            });
        }

        let mut dx = Array3::zeros((n, c, h * w));

        Zip::from(dx.outer_iter_mut())
            .and(d.outer_iter())
            .and(self.argmax.outer_iter())
            .par_for_each(|mut dx_i, d_i, arg_i| {
                Zip::indexed(&d_i).and(&arg_i).for_each(|(ch, _, _), &d, &at| {
                    dx_i[[ch, at]] += d;
                });
            });

        Ok(dx.into_shape_with_order((n, c, h, w))?)
    }
}

/// Averages every channel down to a single value, producing a `[N, C, 1, 1]` output.
#[derive(Debug, Clone, Default)]
pub struct GlobalAvgPool {
    input_dim: Option<(usize, usize, usize, usize)>,
}

impl GlobalAvgPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn forward(&mut self, x: Array4<f32>) -> Result<Array4<f32>> {
        let (n, c, h, w) = x.dim();
        let flat = x.to_shape((n, c, h * w))?;
        let mean: Array2<f32> = flat.sum_axis(Axis(2)) / (h * w).max(1) as f32;

        self.input_dim = Some((n, c, h, w));
        Ok(mean.into_shape_clone((n, c, 1, 1))?)
    }

    pub fn backward(&mut self, d: Array4<f32>) -> Result<Array4<f32>> {
        let (n, c, h, w) = self
            .input_dim
            .take()
            .ok_or(MlErr::NotForwarded { layer: "global average pool" })?;

        if d.shape() != [n, c, 1, 1] {
            return Err(MlErr::ShapeMismatch {
                what: "global average pool delta",
                got: d.shape().to_vec(),
                expected: vec![n, c, 1, 1],
            });
        }

        let scale = 1.0 / (h * w).max(1) as f32;
        let d = d.into_shape_clone((n, c))?;
        Ok(Array4::from_shape_fn((n, c, h, w), |(i, ch, _, _)| {
            d[[i, ch]] * scale
        }))
    }
}
