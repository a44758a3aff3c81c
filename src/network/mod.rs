pub mod network;
pub mod spec;

pub use network::{Network, StateDict};
pub use spec::{NetworkSpec, LayerSpec};
