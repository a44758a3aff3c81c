pub mod ops;
pub mod tensor;
