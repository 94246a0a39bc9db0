use ndarray::{Array2, Array4};
use rand::Rng;

use crate::error::Result;

/// A differentiable function of a flat parameter buffer.
///
/// The model never owns its parameters: every pass borrows them, so the same model can be driven
/// by a `Network` or by any other owner of the buffers.
pub trait Model: Send {
    /// Returns the amount of parameters in the model.
    fn size(&self) -> usize;

    /// Writes the initial parameters of the model into `params`.
    fn init<R: Rng + ?Sized>(&self, params: &mut [f32], rng: &mut R) -> Result<()>;

    /// Makes a forward pass, caching what the backward pass will need.
    ///
    /// # Arguments
    /// * `params` - The model's parameters.
    /// * `x` - A `[N, C, H, W]` batch of inputs.
    ///
    /// # Returns
    /// The `[N, K]` logits or an error if occurred.
    fn forward(&mut self, params: &[f32], x: Array4<f32>) -> Result<Array2<f32>>;

    /// Propagates the loss delta back through the last forward pass, **accumulating** the
    /// gradient of every parameter into `grad`.
    ///
    /// # Arguments
    /// * `params` - The model's parameters.
    /// * `grad` - The gradient buffer, of the same length as `params`.
    /// * `d` - The `[N, K]` derivative of the loss with respect to the logits.
    fn backward(&mut self, params: &[f32], grad: &mut [f32], d: Array2<f32>) -> Result<()>;
}
