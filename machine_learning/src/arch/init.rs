use rand::Rng;
use rand_distr::{Distribution, Normal, Uniform};

use crate::{MlErr, Result};

/// How a layer's parameters are drawn before training starts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Init {
    Constant(f32),
    Uniform { bound: f32 },
    Normal { std_dev: f32 },
}

impl Init {
    /// Kaiming normal initialization in fan-out mode for ReLU networks.
    ///
    /// # Arguments
    /// * `fan_out` - The number of output units fed by each weight.
    pub fn kaiming_normal(fan_out: usize) -> Self {
        Self::Normal {
            std_dev: (2. / fan_out as f32).sqrt(),
        }
    }

    /// Uniform initialization in `[-1/sqrt(fan_in), 1/sqrt(fan_in)]`, the default for dense
    /// layers.
    ///
    /// # Arguments
    /// * `fan_in` - The number of input units of the layer.
    pub fn lecun_uniform(fan_in: usize) -> Self {
        Self::Uniform {
            bound: 1. / (fan_in as f32).sqrt(),
        }
    }

    /// Fills `params` with values drawn from this initializer.
    ///
    /// # Arguments
    /// * `params` - The parameters to overwrite.
    /// * `rng` - A random number generator.
    ///
    /// # Returns
    /// An error if the distribution parameters are invalid.
    pub fn fill<R: Rng + ?Sized>(&self, params: &mut [f32], rng: &mut R) -> Result<()> {
        match *self {
            Init::Constant(value) => params.fill(value),
            Init::Uniform { bound } => {
                let distribution =
                    Uniform::new_inclusive(-bound, bound).map_err(|e| MlErr::Init(e.to_string()))?;
                params
                    .iter_mut()
                    .for_each(|p| *p = distribution.sample(rng));
            }
            Init::Normal { std_dev } => {
                let distribution =
                    Normal::new(0., std_dev).map_err(|e| MlErr::Init(e.to_string()))?;
                params
                    .iter_mut()
                    .for_each(|p| *p = distribution.sample(rng));
            }
        }

        Ok(())
    }
}
