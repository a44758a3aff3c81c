use crate::error::{Error, Result};
use crate::layers::layer::{Layer, Mode};
use crate::math::tensor::Tensor;

/// Non-overlapping max pooling (window = stride = `size`).
///
/// Trailing rows/columns that do not fill a whole window are dropped, so an
/// 11×11 map pools to 5×5 with `size = 2`.
#[derive(Debug)]
pub struct MaxPool2d {
    name: String,
    pub size: usize,
    input_shape: Vec<usize>,
    // flat input index of the winner for every output element
    argmax: Vec<usize>,
}

impl MaxPool2d {
    pub fn new(name: &str, size: usize) -> MaxPool2d {
        MaxPool2d {
            name: name.to_owned(),
            size: size.max(1),
            input_shape: Vec::new(),
            argmax: Vec::new(),
        }
    }
}

impl Layer for MaxPool2d {
    fn name(&self) -> &str {
        &self.name
    }

    fn forward(&mut self, input: &Tensor, _mode: Mode) -> Result<Tensor> {
        if input.shape.len() != 4 {
            return Err(Error::Shape(format!(
                "{}: expected [B, C, H, W], got {:?}",
                self.name, input.shape
            )));
        }
        let (batch, channels, h, w) = (input.shape[0], input.shape[1], input.shape[2], input.shape[3]);
        let out_shape = self.output_shape(&[channels, h, w])?;
        let (oh, ow) = (out_shape[1], out_shape[2]);

        let mut output = Tensor::zeros(&[batch, channels, oh, ow]);
        self.argmax = vec![0; output.numel()];

        for plane in 0..batch * channels {
            let in_base = plane * h * w;
            let out_base = plane * oh * ow;
            for oy in 0..oh {
                for ox in 0..ow {
                    let mut best = f32::NEG_INFINITY;
                    let mut best_idx = in_base + oy * self.size * w + ox * self.size;
                    for dy in 0..self.size {
                        for dx in 0..self.size {
                            let idx = in_base + (oy * self.size + dy) * w + ox * self.size + dx;
                            if input.data[idx] > best {
                                best = input.data[idx];
                                best_idx = idx;
                            }
                        }
                    }
                    output.data[out_base + oy * ow + ox] = input.data[best_idx];
                    self.argmax[out_base + oy * ow + ox] = best_idx;
                }
            }
        }

        self.input_shape = input.shape.clone();
        Ok(output)
    }

    fn backward(&mut self, grad_output: &Tensor) -> Result<Tensor> {
        if grad_output.numel() != self.argmax.len() || self.input_shape.is_empty() {
            return Err(Error::Shape(format!(
                "{}: gradient shape {:?} does not match last forward pass",
                self.name, grad_output.shape
            )));
        }
        let mut grad_input = Tensor::zeros(&self.input_shape);
        for (&idx, &g) in self.argmax.iter().zip(&grad_output.data) {
            grad_input.data[idx] += g;
        }
        Ok(grad_input)
    }

    fn output_shape(&self, input: &[usize]) -> Result<Vec<usize>> {
        if input.len() != 3 || input[1] < self.size || input[2] < self.size {
            return Err(Error::Shape(format!(
                "{}: cannot pool {:?} with window {}",
                self.name, input, self.size
            )));
        }
        Ok(vec![input[0], input[1] / self.size, input[2] / self.size])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pools_and_routes_gradient_to_winner() {
        let mut pool = MaxPool2d::new("pool", 2);
        let x = Tensor::from_vec(&[1, 1, 3, 4], vec![
            1.0, 5.0, 2.0, 0.0,
            3.0, 4.0, 7.0, 6.0,
            9.0, 9.0, 9.0, 9.0,
        ]).unwrap();
        let y = pool.forward(&x, Mode::Eval).unwrap();
        assert_eq!(y.shape, vec![1, 1, 1, 2]);
        assert_eq!(y.data, vec![5.0, 7.0]);

        let g = pool.backward(&Tensor::from_vec(&[1, 1, 1, 2], vec![1.0, 2.0]).unwrap()).unwrap();
        assert_eq!(g.data, vec![
            0.0, 1.0, 0.0, 0.0,
            0.0, 0.0, 2.0, 0.0,
            0.0, 0.0, 0.0, 0.0,
        ]);
    }

    #[test]
    fn odd_sizes_floor() {
        let pool = MaxPool2d::new("pool", 2);
        assert_eq!(pool.output_shape(&[128, 22, 22]).unwrap(), vec![128, 11, 11]);
        assert_eq!(pool.output_shape(&[4, 11, 11]).unwrap(), vec![4, 5, 5]);
    }
}
