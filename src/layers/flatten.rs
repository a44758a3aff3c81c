use crate::error::{Error, Result};
use crate::layers::layer::{Layer, Mode};
use crate::math::tensor::Tensor;

/// Collapses every dimension after the batch into one: `[B, ...] -> [B, N]`.
#[derive(Debug)]
pub struct Flatten {
    name: String,
    input_shape: Vec<usize>,
}

impl Flatten {
    pub fn new(name: &str) -> Flatten {
        Flatten { name: name.to_owned(), input_shape: Vec::new() }
    }
}

impl Layer for Flatten {
    fn name(&self) -> &str {
        &self.name
    }

    fn forward(&mut self, input: &Tensor, _mode: Mode) -> Result<Tensor> {
        self.input_shape = input.shape.clone();
        input.clone().reshape(&[input.batch(), input.sample_len()])
    }

    fn backward(&mut self, grad_output: &Tensor) -> Result<Tensor> {
        if self.input_shape.is_empty() {
            return Err(Error::Shape(format!("{}: backward called before forward", self.name)));
        }
        grad_output.clone().reshape(&self.input_shape)
    }

    fn output_shape(&self, input: &[usize]) -> Result<Vec<usize>> {
        Ok(vec![input.iter().product()])
    }
}
