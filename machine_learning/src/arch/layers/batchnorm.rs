use ndarray::{Array1, Array4, Axis, Zip};

use crate::{MlErr, Result};

const EPSILON: f32 = 1e-5;
const MOMENTUM: f32 = 0.1;

/// Batch normalization over the `[N, H, W]` axes of a `[N, C, H, W]` input, in training mode.
///
/// The parameters are the per channel scales followed by the per channel shifts. Running
/// statistics are kept for inference but never used while training.
#[derive(Debug, Clone)]
pub struct BatchNorm2d {
    channels: usize,
    running_mean: Array1<f32>,
    running_var: Array1<f32>,

    // Forward metadata
    xhat: Option<Array4<f32>>,
    inv_std: Array1<f32>,
}

impl BatchNorm2d {
    pub fn new(channels: usize) -> Self {
        Self {
            channels,
            running_mean: Array1::zeros(channels),
            running_var: Array1::ones(channels),
            xhat: None,
            inv_std: Array1::zeros(channels),
        }
    }

    /// Returns the amount of parameters this layer has.
    pub fn size(&self) -> usize {
        2 * self.channels
    }

    pub fn running_mean(&self) -> &Array1<f32> {
        &self.running_mean
    }

    pub fn running_var(&self) -> &Array1<f32> {
        &self.running_var
    }

    /// Scales start at one and shifts at zero.
    pub fn init_params(&self, params: &mut [f32]) -> Result<()> {
        self.check_len(params.len())?;

        let (gamma, beta) = params.split_at_mut(self.channels);
        gamma.fill(1.0);
        beta.fill(0.0);
        Ok(())
    }

    pub fn forward(&mut self, params: &[f32], x: Array4<f32>) -> Result<Array4<f32>> {
        self.check_len(params.len())?;
        let (n, c, h, w) = x.dim();

        if c != self.channels {
            return Err(MlErr::SizeMismatch {
                what: "batch norm channels",
                got: c,
                expected: self.channels,
            });
        }

        let count = n * h * w;
        let (gamma, beta) = params.split_at(self.channels);
        let mut xhat = x;
        let mut y = Array4::zeros(xhat.raw_dim());

        for (ch, (mut plane, mut out)) in xhat
            .axis_iter_mut(Axis(1))
            .zip(y.axis_iter_mut(Axis(1)))
            .enumerate()
        {
            let mean = plane.mean().unwrap_or_default();
            let var = plane.mapv(|v| (v - mean).powi(2)).mean().unwrap_or_default();
            let inv_std = 1. / (var + EPSILON).sqrt();

            plane.mapv_inplace(|v| (v - mean) * inv_std);
            Zip::from(&mut out)
                .and(&plane)
                .for_each(|o, &v| *o = gamma[ch] * v + beta[ch]);

            let unbiased = if count > 1 {
                var * count as f32 / (count - 1) as f32
            } else {
                var
            };

            self.running_mean[ch] = (1. - MOMENTUM) * self.running_mean[ch] + MOMENTUM * mean;
            self.running_var[ch] = (1. - MOMENTUM) * self.running_var[ch] + MOMENTUM * unbiased;
            self.inv_std[ch] = inv_std;
        }

        self.xhat = Some(xhat);
        Ok(y)
    }

    pub fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        mut d: Array4<f32>,
    ) -> Result<Array4<f32>> {
        self.check_len(params.len())?;
        self.check_len(grad.len())?;

        let xhat = self.xhat.take().ok_or(MlErr::NotForwarded {
            layer: "batch norm",
        })?;

        if d.shape() != xhat.shape() {
            return Err(MlErr::ShapeMismatch {
                what: "batch norm delta",
                got: d.shape().to_vec(),
                expected: xhat.shape().to_vec(),
            });
        }

        let (n, _, h, w) = xhat.dim();
        let count = (n * h * w) as f32;
        let gamma = &params[..self.channels];
        let (dgamma, dbeta) = grad.split_at_mut(self.channels);

        for (ch, (mut d_plane, x_plane)) in d
            .axis_iter_mut(Axis(1))
            .zip(xhat.axis_iter(Axis(1)))
            .enumerate()
        {
            let sum_d = d_plane.sum();
            let sum_dx = Zip::from(&d_plane)
                .and(&x_plane)
                .fold(0., |acc, &d, &x| acc + d * x);

            dgamma[ch] += sum_dx;
            dbeta[ch] += sum_d;

            let scale = gamma[ch] * self.inv_std[ch] / count;
            Zip::from(&mut d_plane)
                .and(&x_plane)
                .for_each(|d, &x| *d = scale * (count * *d - sum_d - x * sum_dx));
        }

        Ok(d)
    }

    fn check_len(&self, len: usize) -> Result<()> {
        if len != self.size() {
            return Err(MlErr::SizeMismatch {
                what: "batch norm params",
                got: len,
                expected: self.size(),
            });
        }

        Ok(())
    }
}
