use ndarray::{Array2, Array4, ArrayView1, ArrayView2, ArrayViewMut1, ArrayViewMut2, Axis, linalg};

use crate::{MlErr, Result, arch::Init};

/// A fully connected layer. The input is flattened to `[N, in]` and the output is laid out as
/// `[N, out, 1, 1]` so it can keep flowing through the 4D pipeline.
///
/// Optimizations:
///   1. Find a way to not copy `x` in each `Dense::forward` call.
#[derive(Debug, Clone)]
pub struct Dense {
    dim: (usize, usize),
    size: usize,

    // Forward metadata
    x: Option<Array2<f32>>,
    input_dim: (usize, usize, usize, usize),
}

impl Dense {
    /// Creates a new `Dense` layer.
    ///
    /// # Arguments
    /// * `dim` - The amount of input and output features.
    pub fn new(dim: (usize, usize)) -> Self {
        Self {
            dim,
            size: (dim.0 + 1) * dim.1,
            x: None,
            input_dim: (0, 0, 0, 0),
        }
    }

    /// Returns the size of this layer.
    ///
    /// # Returns
    /// The amount of parameters this layer has.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn init_params(&self) -> Init {
        Init::lecun_uniform(self.dim.0)
    }

    pub fn forward(&mut self, params: &[f32], x: Array4<f32>) -> Result<Array4<f32>> {
        let (n, c, h, w) = x.dim();
        if c * h * w != self.dim.0 {
            return Err(MlErr::SizeMismatch {
                what: "dense input features",
                got: c * h * w,
                expected: self.dim.0,
            });
        }

        let (weights, biases) = self.view_params(params)?;
        let x = x.into_shape_clone((n, self.dim.0))?;

        let mut z = Array2::zeros((n, self.dim.1));
        linalg::general_mat_mul(1.0, &x, &weights, 0.0, &mut z);
        z += &biases;

        self.x = Some(x);
        self.input_dim = (n, c, h, w);
        Ok(z.into_shape_with_order((n, self.dim.1, 1, 1))?)
    }

    pub fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        d: Array4<f32>,
    ) -> Result<Array4<f32>> {
        let x = self.x.take().ok_or(MlErr::NotForwarded { layer: "dense" })?;
        let n = x.nrows();

        if d.len() != n * self.dim.1 {
            return Err(MlErr::ShapeMismatch {
                what: "dense delta",
                got: d.shape().to_vec(),
                expected: vec![n, self.dim.1, 1, 1],
            });
        }

        let d = d.into_shape_clone((n, self.dim.1))?;

        let (mut dw, mut db) = self.view_grad(grad)?;
        linalg::general_mat_mul(1.0, &x.t(), &d, 1.0, &mut dw);
        db += &d.sum_axis(Axis(0));

        let (weights, _) = self.view_params(params)?;
        let dx = d.dot(&weights.t());
        Ok(dx.into_shape_clone(self.input_dim)?)
    }

    fn split(&self, len: usize) -> Result<usize> {
        if len != self.size {
            return Err(MlErr::SizeMismatch {
                what: "dense params",
                got: len,
                expected: self.size,
            });
        }

        Ok(self.size - self.dim.1)
    }

    /// Gives a view of the raw gradient slice as the delta weights and delta biases of this layer.
    ///
    /// # Arguments
    /// * `grad` - A gradient slice.
    ///
    /// # Returns
    /// A tuple containing the delta weights and delta biases.
    fn view_grad<'a>(
        &self,
        grad: &'a mut [f32],
    ) -> Result<(ArrayViewMut2<'a, f32>, ArrayViewMut1<'a, f32>)> {
        let w_size = self.split(grad.len())?;
        let (dw_raw, db_raw) = grad.split_at_mut(w_size);
        let dw = ArrayViewMut2::from_shape(self.dim, dw_raw)?;
        let db = ArrayViewMut1::from_shape(self.dim.1, db_raw)?;
        Ok((dw, db))
    }

    /// Gives a view of the raw parameter slice as the weights and biases of this layer.
    ///
    /// # Arguments
    /// * `params` - A slice of parameters.
    ///
    /// # Returns
    /// A tuple containing the weights and biases.
    fn view_params<'a>(
        &self,
        params: &'a [f32],
    ) -> Result<(ArrayView2<'a, f32>, ArrayView1<'a, f32>)> {
        let w_size = self.split(params.len())?;
        let weights = ArrayView2::from_shape(self.dim, &params[..w_size])?;
        let biases = ArrayView1::from_shape(self.dim.1, &params[w_size..])?;
        Ok((weights, biases))
    }
}
