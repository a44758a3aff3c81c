pub mod error;
pub mod math;
pub mod layers;
pub mod loss;
pub mod optim;
pub mod network;
pub mod data;
pub mod vision;
pub mod inference;
pub mod train;

// Convenience re-exports
pub use error::{Error, Result};
pub use math::tensor::Tensor;
pub use layers::{Layer, Mode};
pub use network::{LayerSpec, Network, NetworkSpec, StateDict};
pub use loss::CrossEntropyLoss;
pub use optim::{Adadelta, StepLr};
pub use data::{DataLoader, MnistDataset};
pub use vision::preprocess;
pub use inference::{infer, postprocess, predict, Prediction};
pub use train::{evaluate, fit, EpochStats, EvalReport, TrainConfig};
