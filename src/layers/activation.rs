use crate::error::{Error, Result};
use crate::layers::layer::{Layer, Mode};
use crate::math::tensor::Tensor;

/// Element-wise rectified linear unit.
#[derive(Debug)]
pub struct Relu {
    name: String,
    // pre-activation input, needed for the derivative
    input: Option<Tensor>,
}

impl Relu {
    pub fn new(name: &str) -> Relu {
        Relu { name: name.to_owned(), input: None }
    }

    pub fn function(x: f32) -> f32 {
        if x > 0.0 { x } else { 0.0 }
    }

    pub fn derivative(x: f32) -> f32 {
        if x > 0.0 { 1.0 } else { 0.0 }
    }
}

impl Layer for Relu {
    fn name(&self) -> &str {
        &self.name
    }

    fn forward(&mut self, input: &Tensor, _mode: Mode) -> Result<Tensor> {
        let out = input.map(Relu::function);
        self.input = Some(input.clone());
        Ok(out)
    }

    fn backward(&mut self, grad_output: &Tensor) -> Result<Tensor> {
        let input = self.input.take().ok_or_else(|| {
            Error::Shape(format!("{}: backward called before forward", self.name))
        })?;
        if input.shape != grad_output.shape {
            return Err(Error::Shape(format!(
                "{}: gradient shape {:?} does not match {:?}",
                self.name, grad_output.shape, input.shape
            )));
        }
        let data = grad_output.data.iter().zip(&input.data)
            .map(|(g, &x)| g * Relu::derivative(x))
            .collect();
        Tensor::from_vec(&input.shape, data)
    }

    fn output_shape(&self, input: &[usize]) -> Result<Vec<usize>> {
        Ok(input.to_vec())
    }
}
