pub mod preprocess;

pub use preprocess::{preprocess, preprocess_bytes, preprocess_image};
