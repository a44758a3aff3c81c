use serde::{Serialize, Deserialize};

/// Aggregate loss and accuracy over a held-out set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvalReport {
    /// Mean per-sample cross-entropy.
    pub loss: f64,
    /// Number of samples whose arg-max matched the label; always `<= total`.
    pub correct: usize,
    pub total: usize,
}

impl EvalReport {
    /// `correct / total` as a fraction in [0, 1]; 0 for an empty set.
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.correct as f64 / self.total as f64
        }
    }
}

/// Per-epoch training statistics returned by `fit`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochStats {
    /// 1-based epoch number.
    pub epoch: usize,
    pub total_epochs: usize,
    /// Mean of the per-batch training losses.
    pub train_loss: f64,
    pub eval: EvalReport,
    /// Learning rate used during this epoch.
    pub learning_rate: f32,
    /// Wall-clock duration of training plus evaluation, in milliseconds.
    pub elapsed_ms: u64,
}
