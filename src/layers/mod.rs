pub mod layer;
pub mod activation;
pub mod conv2d;
pub mod dropout;
pub mod flatten;
pub mod linear;
pub mod pool;

pub use layer::{Layer, Mode, Param};
pub use activation::Relu;
pub use conv2d::Conv2d;
pub use dropout::Dropout;
pub use flatten::Flatten;
pub use linear::Linear;
pub use pool::MaxPool2d;
