use ndarray::{Array2, ArrayView1, ArrayView2, Axis, Zip};

use crate::{MlErr, Result};

/// A loss function over `[N, K]` logits and `N` class labels.
pub trait LossFn {
    /// Computes the mean loss of the batch.
    fn loss(&self, logits: ArrayView2<f32>, labels: ArrayView1<usize>) -> Result<f32>;

    /// Computes the derivative of the mean loss with respect to the logits.
    fn loss_prime(&self, logits: ArrayView2<f32>, labels: ArrayView1<usize>) -> Result<Array2<f32>>;
}

/// Softmax cross entropy, averaged over the batch.
#[derive(Debug, Default, Clone, Copy)]
pub struct CrossEntropy;

impl CrossEntropy {
    pub fn new() -> Self {
        Self
    }

    fn check(logits: ArrayView2<f32>, labels: ArrayView1<usize>) -> Result<()> {
        let (n, k) = logits.dim();

        if labels.len() != n {
            return Err(MlErr::SizeMismatch {
                what: "labels",
                got: labels.len(),
                expected: n,
            });
        }

        if let Some(&label) = labels.iter().find(|&&label| label >= k) {
            return Err(MlErr::LabelOutOfRange { label, classes: k });
        }

        Ok(())
    }

    /// Numerically stable softmax over every row.
    fn softmax(logits: ArrayView2<f32>) -> Array2<f32> {
        let mut probs = logits.to_owned();

        for mut row in probs.axis_iter_mut(Axis(0)) {
            let max = row.fold(f32::NEG_INFINITY, |acc, &v| acc.max(v));
            row.mapv_inplace(|v| (v - max).exp());
            let sum = row.sum();
            row /= sum;
        }

        probs
    }
}

impl LossFn for CrossEntropy {
    fn loss(&self, logits: ArrayView2<f32>, labels: ArrayView1<usize>) -> Result<f32> {
        Self::check(logits, labels)?;
        let n = logits.nrows();

        let total: f32 = Zip::from(logits.rows())
            .and(&labels)
            .fold(0.0, |acc, row, &label| {
                let max = row.fold(f32::NEG_INFINITY, |acc, &v| acc.max(v));
                let log_sum = row.mapv(|v| (v - max).exp()).sum().ln() + max;
                acc + log_sum - row[label]
            });

        Ok(total / n.max(1) as f32)
    }

    fn loss_prime(&self, logits: ArrayView2<f32>, labels: ArrayView1<usize>) -> Result<Array2<f32>> {
        Self::check(logits, labels)?;
        let n = logits.nrows().max(1) as f32;

        let mut d = Self::softmax(logits);
        for (mut row, &label) in d.axis_iter_mut(Axis(0)).zip(labels) {
            row[label] -= 1.0;
            row /= n;
        }

        Ok(d)
    }
}
