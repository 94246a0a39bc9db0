use ndarray::{Array2, Array4};
use rand::Rng;

use super::{
    Model,
    layers::Layer,
    params::{BackIter, FrontIter, FrontIterMut},
};
use crate::{MlErr, Result};

/// A sequential model: information flows forward when computing an output and backward when
/// computing the *deltas* of its layers.
#[derive(Debug, Clone)]
pub struct Sequential {
    layers: Vec<Layer>,
}

impl Sequential {
    /// Creates a new `Sequential`.
    ///
    /// # Arguments
    /// * `layers` - The layers the sequential is composed of.
    ///
    /// # Returns
    /// A new `Sequential` instance.
    pub fn new<I>(layers: I) -> Self
    where
        I: IntoIterator<Item = Layer>,
    {
        Self {
            layers: layers.into_iter().collect(),
        }
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn size(&self) -> usize {
        self.layers.iter().map(Layer::size).sum()
    }

    pub fn init_params<R: Rng + ?Sized>(&self, params: &mut [f32], rng: &mut R) -> Result<()> {
        let mut front = FrontIterMut::new(params);
        let nlayers = self.layers.len();

        for (i, layer) in self.layers.iter().enumerate() {
            let params = front.take(layer.size()).ok_or(MlErr::SizeMismatch {
                what: "layers",
                got: i,
                expected: nlayers,
            })?;

            layer.init(params, rng)?;
        }

        Ok(())
    }

    /// Makes a forward pass through every layer, keeping the 4D layout of the activations.
    ///
    /// # Arguments
    /// * `params` - The parameters of every layer, back to back.
    /// * `x` - The input data.
    ///
    /// # Returns
    /// The output of the last layer or an error if occurred.
    pub fn forward_maps(&mut self, params: &[f32], mut x: Array4<f32>) -> Result<Array4<f32>> {
        self.check_len(params.len())?;
        let mut front = FrontIter::new(params);
        let nlayers = self.layers.len();

        for (i, layer) in self.layers.iter_mut().enumerate() {
            let params = front.take(layer.size()).ok_or(MlErr::SizeMismatch {
                what: "layers",
                got: i,
                expected: nlayers,
            })?;

            x = layer.forward(params, x)?;
        }

        Ok(x)
    }

    /// Makes a backward pass through every layer in reverse order.
    ///
    /// # Returns
    /// The delta with respect to the input of the first layer.
    pub fn backward_maps(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        mut d: Array4<f32>,
    ) -> Result<Array4<f32>> {
        self.check_len(params.len())?;
        self.check_len(grad.len())?;

        let mut back = BackIter::new(params, grad);
        let nlayers = self.layers.len();

        for (i, layer) in self.layers.iter_mut().rev().enumerate() {
            let (params, grad) = back.take(layer.size()).ok_or(MlErr::SizeMismatch {
                what: "layers",
                got: i,
                expected: nlayers,
            })?;

            d = layer.backward(params, grad, d)?;
        }

        Ok(d)
    }

    fn check_len(&self, len: usize) -> Result<()> {
        let size = self.size();
        if len != size {
            return Err(MlErr::SizeMismatch {
                what: "sequential params",
                got: len,
                expected: size,
            });
        }

        Ok(())
    }
}

impl Model for Sequential {
    fn size(&self) -> usize {
        Sequential::size(self)
    }

    fn init<R: Rng + ?Sized>(&self, params: &mut [f32], rng: &mut R) -> Result<()> {
        self.check_len(params.len())?;
        self.init_params(params, rng)
    }

    fn forward(&mut self, params: &[f32], x: Array4<f32>) -> Result<Array2<f32>> {
        let y = self.forward_maps(params, x)?;
        let (n, k) = (y.shape()[0], y.len() / y.shape()[0].max(1));
        Ok(y.into_shape_clone((n, k))?)
    }

    fn backward(&mut self, params: &[f32], grad: &mut [f32], d: Array2<f32>) -> Result<()> {
        let (n, k) = d.dim();
        let d = d.into_shape_clone((n, k, 1, 1))?;
        self.backward_maps(params, grad, d)?;
        Ok(())
    }
}
