use ndarray::{Array2, Array3, Array4, ArrayView2, ArrayView3, ArrayViewMut2, ArrayViewMut3, Zip};

use crate::{MlErr, Result, arch::Init};

/// A 2D convolution without bias, lowered to a matrix multiplication through im2col.
///
/// Weights are laid out as `[out_channels, in_channels, kernel, kernel]`.
#[derive(Debug, Clone)]
pub struct Conv2d {
    in_channels: usize,
    out_channels: usize,
    kernel: usize,
    stride: usize,
    padding: usize,

    // Forward metadata
    x: Option<Array4<f32>>,
}

impl Conv2d {
    /// Creates a new `Conv2d` with a square kernel.
    ///
    /// # Arguments
    /// * `in_channels` - The amount of channels of the input.
    /// * `out_channels` - The amount of channels of the output.
    /// * `kernel` - The side of the kernel.
    /// * `stride` - The step between two kernel applications.
    /// * `padding` - The amount of zeros added on every border of the input.
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel: usize,
        stride: usize,
        padding: usize,
    ) -> Self {
        Self {
            in_channels,
            out_channels,
            kernel,
            stride: stride.max(1),
            padding,
            x: None,
        }
    }

    /// Returns the amount of parameters this layer has.
    pub fn size(&self) -> usize {
        self.out_channels * self.patch_len()
    }

    pub fn out_channels(&self) -> usize {
        self.out_channels
    }

    /// Draws the weights using Kaiming normal initialization in fan-out mode.
    pub fn init_params(&self) -> Init {
        Init::kaiming_normal(self.out_channels * self.kernel * self.kernel)
    }

    pub fn forward(&mut self, params: &[f32], x: Array4<f32>) -> Result<Array4<f32>> {
        let (n, c, h, w) = x.dim();
        self.check_channels(c)?;

        let (oh, ow) = self.out_dim(h, w)?;
        let weights = self.view_params(params)?;
        let mut out = Array3::zeros((n, self.out_channels, oh * ow));

        Zip::from(out.outer_iter_mut())
            .and(x.outer_iter())
            .par_for_each(|mut out_i, x_i| {
                let cols = self.im2col(x_i, oh, ow);
                ndarray::linalg::general_mat_mul(1.0, &weights, &cols, 0.0, &mut out_i);
            });

        self.x = Some(x);
        Ok(out.into_shape_with_order((n, self.out_channels, oh, ow))?)
    }

    pub fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        d: Array4<f32>,
    ) -> Result<Array4<f32>> {
        let x = self.x.take().ok_or(MlErr::NotForwarded { layer: "conv2d" })?;
        let (n, c, h, w) = x.dim();
        let (oh, ow) = self.out_dim(h, w)?;

        let expected = [n, self.out_channels, oh, ow];
        if d.shape() != expected {
            return Err(MlErr::ShapeMismatch {
                what: "conv2d delta",
                got: d.shape().to_vec(),
                expected: expected.to_vec(),
            });
        }

        let d = d.to_shape((n, self.out_channels, oh * ow))?;
        let weights = self.view_params(params)?;
        let mut dx = Array4::zeros((n, c, h, w));

        let dws = Zip::from(dx.outer_iter_mut())
            .and(x.outer_iter())
            .and(d.outer_iter())
            .par_map_collect(|mut dx_i, x_i, d_i| {
                let cols = self.im2col(x_i, oh, ow);
                let dcols = weights.t().dot(&d_i);
                self.col2im(dcols.view(), &mut dx_i, oh, ow);
                d_i.dot(&cols.t())
            });

        let mut dw = self.view_grad(grad)?;
        for dw_i in dws.iter() {
            dw += dw_i;
        }

        Ok(dx)
    }

    fn patch_len(&self) -> usize {
        self.in_channels * self.kernel * self.kernel
    }

    fn check_channels(&self, c: usize) -> Result<()> {
        if c != self.in_channels {
            return Err(MlErr::SizeMismatch {
                what: "conv2d input channels",
                got: c,
                expected: self.in_channels,
            });
        }

        Ok(())
    }

    /// Returns the spatial size of the output for an input of `h` by `w`.
    fn out_dim(&self, h: usize, w: usize) -> Result<(usize, usize)> {
        let (ph, pw) = (h + 2 * self.padding, w + 2 * self.padding);

        if ph < self.kernel || pw < self.kernel {
            return Err(MlErr::ShapeMismatch {
                what: "conv2d input",
                got: vec![h, w],
                expected: vec![self.kernel, self.kernel],
            });
        }

        let oh = (ph - self.kernel) / self.stride + 1;
        let ow = (pw - self.kernel) / self.stride + 1;
        Ok((oh, ow))
    }

    /// Input coordinate read by the kernel offset `k` at output coordinate `o`, if it isn't
    /// padding.
    fn source(&self, o: usize, k: usize, len: usize) -> Option<usize> {
        (o * self.stride + k)
            .checked_sub(self.padding)
            .filter(|&i| i < len)
    }

    /// Unfolds every receptive field of `x` into a column.
    ///
    /// # Returns
    /// A `[in_channels * kernel * kernel, oh * ow]` matrix.
    fn im2col(&self, x: ArrayView3<f32>, oh: usize, ow: usize) -> Array2<f32> {
        let (c, h, w) = x.dim();
        let k = self.kernel;
        let mut cols = Array2::zeros((c * k * k, oh * ow));

        for ci in 0..c {
            for ki in 0..k {
                for kj in 0..k {
                    let mut row = cols.row_mut((ci * k + ki) * k + kj);

                    for oy in 0..oh {
                        let Some(iy) = self.source(oy, ki, h) else {
                            continue;
                        };

                        for ox in 0..ow {
                            if let Some(ix) = self.source(ox, kj, w) {
                                row[oy * ow + ox] = x[[ci, iy, ix]];
                            }
                        }
                    }
                }
            }
        }

        cols
    }

    /// Folds the columns back onto the input, accumulating overlapping receptive fields.
    fn col2im(&self, cols: ArrayView2<f32>, dx: &mut ArrayViewMut3<f32>, oh: usize, ow: usize) {
        let (c, h, w) = dx.dim();
        let k = self.kernel;

        for ci in 0..c {
            for ki in 0..k {
                for kj in 0..k {
                    let row = cols.row((ci * k + ki) * k + kj);

                    for oy in 0..oh {
                        let Some(iy) = self.source(oy, ki, h) else {
                            continue;
                        };

                        for ox in 0..ow {
                            if let Some(ix) = self.source(ox, kj, w) {
                                dx[[ci, iy, ix]] += row[oy * ow + ox];
                            }
                        }
                    }
                }
            }
        }
    }

    fn view_params<'a>(&self, params: &'a [f32]) -> Result<ArrayView2<'a, f32>> {
        self.check_len(params.len())?;
        Ok(ArrayView2::from_shape(
            (self.out_channels, self.patch_len()),
            params,
        )?)
    }

    fn view_grad<'a>(&self, grad: &'a mut [f32]) -> Result<ArrayViewMut2<'a, f32>> {
        self.check_len(grad.len())?;
        Ok(ArrayViewMut2::from_shape(
            (self.out_channels, self.patch_len()),
            grad,
        )?)
    }

    fn check_len(&self, len: usize) -> Result<()> {
        if len != self.size() {
            return Err(MlErr::SizeMismatch {
                what: "conv2d params",
                got: len,
                expected: self.size(),
            });
        }

        Ok(())
    }
}
