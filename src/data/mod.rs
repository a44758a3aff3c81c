pub mod dataset;
pub mod idx;
pub mod loader;

pub use dataset::{MnistDataset, MnistItem, NUM_CLASSES};
pub use loader::{Batch, DataLoader};
