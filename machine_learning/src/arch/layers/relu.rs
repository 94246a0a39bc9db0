use ndarray::{Array4, Zip};

use crate::{MlErr, Result};

/// The rectified linear unit, `max(x, 0)`.
#[derive(Debug, Clone, Default)]
pub struct Relu {
    // Forward metadata
    y: Option<Array4<f32>>,
}

impl Relu {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn forward(&mut self, mut x: Array4<f32>) -> Array4<f32> {
        x.par_mapv_inplace(|v| v.max(0.0));
        self.y = Some(x.clone());
        x
    }

    pub fn backward(&mut self, mut d: Array4<f32>) -> Result<Array4<f32>> {
        let y = self.y.take().ok_or(MlErr::NotForwarded { layer: "relu" })?;

        if d.shape() != y.shape() {
            return Err(MlErr::ShapeMismatch {
                what: "relu delta",
                got: d.shape().to_vec(),
                expected: y.shape().to_vec(),
            });
        }

        Zip::from(&mut d).and(&y).par_for_each(|d, &y| {
            if y <= 0.0 {
                *d = 0.0;
            }
        });

        Ok(d)
    }
}

#[cfg(test)]
mod tests {
    use ndarray::Array;

    use super::*;

    #[test]
    fn clamps_negatives_and_masks_their_delta() {
        let mut relu = Relu::new();
        let x = Array::from_shape_vec((1, 1, 2, 2), vec![-1.0, 2.0, 0.0, 3.5]).unwrap();

        let y = relu.forward(x);
        assert_eq!(y.as_slice().unwrap(), &[0.0, 2.0, 0.0, 3.5]);

        let dx = relu.backward(Array4::ones((1, 1, 2, 2))).unwrap();
        assert_eq!(dx.as_slice().unwrap(), &[0.0, 1.0, 0.0, 1.0]);
    }
}
