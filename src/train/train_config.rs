use std::path::Path;

use serde::{Serialize, Deserialize};

use crate::error::{Error, Result};

/// Hyperparameters for a `fit` run.
///
/// Can be loaded from JSON; missing fields take the defaults below.
///
/// ```json
/// { "epochs": 3, "batch_size": 64, "learning_rate": 1.0, "gamma": 0.7 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    /// Full passes over the training data.
    pub epochs: usize,
    pub batch_size: usize,
    /// Initial Adadelta learning rate.
    pub learning_rate: f32,
    /// Per-epoch multiplicative learning-rate decay.
    pub gamma: f32,
    /// Log a progress line every this many batches.
    pub log_interval: usize,
    /// Seeds parameter init, shuffling and dropout.
    pub seed: u64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        TrainConfig {
            epochs: 10,
            batch_size: 32,
            learning_rate: 2e-3,
            gamma: 0.7,
            log_interval: 10,
            seed: 42,
        }
    }
}

impl TrainConfig {
    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(Error::Config("epochs must be at least 1".into()));
        }
        if self.batch_size == 0 {
            return Err(Error::Config("batch_size must be at least 1".into()));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(Error::Config(format!("learning_rate must be positive, got {}", self.learning_rate)));
        }
        if !(self.gamma > 0.0 && self.gamma <= 1.0) {
            return Err(Error::Config(format!("gamma must be in (0, 1], got {}", self.gamma)));
        }
        if self.log_interval == 0 {
            return Err(Error::Config("log_interval must be at least 1".into()));
        }
        Ok(())
    }

    /// Reads and validates a JSON config file.
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<TrainConfig> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let config: TrainConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }
}
