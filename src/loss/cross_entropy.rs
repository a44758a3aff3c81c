use crate::error::{Error, Result};
use crate::math::tensor::Tensor;

/// Softmax cross-entropy computed directly from raw logits and integer
/// class targets.
pub struct CrossEntropyLoss;

impl CrossEntropyLoss {
    /// Per-sample losses `-log softmax(logits)[target]`, shape `[B]`.
    ///
    /// Uses the log-sum-exp trick so large logits do not overflow.
    pub fn per_sample(logits: &Tensor, targets: &[usize]) -> Result<Vec<f32>> {
        let classes = Self::check(logits, targets)?;
        Ok(logits.data.chunks(classes).zip(targets)
            .map(|(row, &t)| log_sum_exp(row) - row[t])
            .collect())
    }

    /// Batch-mean loss and its gradient w.r.t. the logits.
    ///
    /// The gradient is `(softmax(logits) - one_hot(target)) / B`, i.e. it
    /// already includes the `1/B` of the mean.
    pub fn forward(logits: &Tensor, targets: &[usize]) -> Result<(f32, Tensor)> {
        let classes = Self::check(logits, targets)?;
        let batch = targets.len();
        let inv_batch = 1.0 / batch as f32;

        let mut total = 0.0f32;
        let mut grad = Tensor::zeros(&logits.shape);
        for ((row, g), &t) in logits.data.chunks(classes)
            .zip(grad.data.chunks_mut(classes))
            .zip(targets)
        {
            let lse = log_sum_exp(row);
            total += lse - row[t];
            for (gi, &z) in g.iter_mut().zip(row) {
                *gi = (z - lse).exp() * inv_batch;
            }
            g[t] -= inv_batch;
        }

        Ok((total * inv_batch, grad))
    }

    fn check(logits: &Tensor, targets: &[usize]) -> Result<usize> {
        if logits.shape.len() != 2 || logits.shape[0] != targets.len() || targets.is_empty() {
            return Err(Error::Shape(format!(
                "cross entropy: logits {:?} do not match {} targets",
                logits.shape, targets.len()
            )));
        }
        let classes = logits.shape[1];
        if let Some(&bad) = targets.iter().find(|&&t| t >= classes) {
            return Err(Error::Shape(format!(
                "cross entropy: target {} out of range for {} classes",
                bad, classes
            )));
        }
        Ok(classes)
    }
}

fn log_sum_exp(row: &[f32]) -> f32 {
    let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    max + row.iter().map(|&z| (z - max).exp()).sum::<f32>().ln()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_logits_give_log_num_classes() {
        let logits = Tensor::zeros(&[2, 10]);
        let (loss, _) = CrossEntropyLoss::forward(&logits, &[3, 7]).unwrap();
        assert!((loss - (10.0f32).ln()).abs() < 1e-5);
    }

    #[test]
    fn stable_for_large_logits() {
        let logits = Tensor::from_vec(&[1, 3], vec![1000.0, 0.0, -1000.0]).unwrap();
        let losses = CrossEntropyLoss::per_sample(&logits, &[0]).unwrap();
        assert!(losses[0].is_finite() && losses[0] < 1e-5);
    }

    #[test]
    fn gradient_matches_finite_differences() {
        let logits = Tensor::from_vec(&[2, 4], vec![0.3, -1.2, 2.0, 0.1, 1.5, 0.2, -0.7, 0.0]).unwrap();
        let targets = [2, 0];
        let (_, grad) = CrossEntropyLoss::forward(&logits, &targets).unwrap();
        let eps = 1e-3;
        for i in 0..logits.numel() {
            let mut p = logits.clone();
            p.data[i] += eps;
            let mut m = logits.clone();
            m.data[i] -= eps;
            let numeric = (CrossEntropyLoss::forward(&p, &targets).unwrap().0
                - CrossEntropyLoss::forward(&m, &targets).unwrap().0) / (2.0 * eps);
            assert!((numeric - grad.data[i]).abs() < 1e-3, "{}: {} vs {}", i, numeric, grad.data[i]);
        }
    }

    #[test]
    fn rejects_out_of_range_targets() {
        let logits = Tensor::zeros(&[1, 10]);
        assert!(CrossEntropyLoss::forward(&logits, &[10]).is_err());
        assert!(CrossEntropyLoss::forward(&logits, &[1, 2]).is_err());
    }
}
