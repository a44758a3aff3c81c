use rand::Rng;

use crate::error::{Error, Result};
use crate::layers::layer::{Layer, Mode, Param};
use crate::math::ops::{matmul_acc, matmul_a_bt_acc, matmul_at_b_acc};
use crate::math::tensor::Tensor;

/// Fully-connected layer: `y = x · Wᵀ + b`.
///
/// `weight` is `[out_features, in_features]`, `bias` is `[out_features]`.
#[derive(Debug)]
pub struct Linear {
    name: String,
    pub in_features: usize,
    pub out_features: usize,
    pub weight: Param,
    pub bias: Param,
    input: Option<Tensor>,
}

impl Linear {
    pub fn new<R: Rng + ?Sized>(name: &str, in_features: usize, out_features: usize, rng: &mut R) -> Linear {
        let bound = 1.0 / (in_features as f32).sqrt();
        let weight = Tensor::uniform(&[out_features, in_features], bound, rng);
        let bias = Tensor::uniform(&[out_features], bound, rng);
        Linear {
            name: name.to_owned(),
            in_features,
            out_features,
            weight: Param::new(weight),
            bias: Param::new(bias),
            input: None,
        }
    }

    fn check_input(&self, input: &Tensor) -> Result<usize> {
        if input.shape.len() != 2 || input.shape[1] != self.in_features {
            return Err(Error::Shape(format!(
                "{}: expected [B, {}], got {:?}",
                self.name, self.in_features, input.shape
            )));
        }
        Ok(input.shape[0])
    }
}

impl Layer for Linear {
    fn name(&self) -> &str {
        &self.name
    }

    fn forward(&mut self, input: &Tensor, _mode: Mode) -> Result<Tensor> {
        let batch = self.check_input(input)?;
        let mut output = Tensor::zeros(&[batch, self.out_features]);
        for row in output.data.chunks_mut(self.out_features) {
            row.copy_from_slice(&self.bias.value.data);
        }
        matmul_a_bt_acc(
            &input.data,
            &self.weight.value.data,
            &mut output.data,
            batch,
            self.in_features,
            self.out_features,
        );
        self.input = Some(input.clone());
        Ok(output)
    }

    fn backward(&mut self, grad_output: &Tensor) -> Result<Tensor> {
        let input = self.input.take().ok_or_else(|| {
            Error::Shape(format!("{}: backward called before forward", self.name))
        })?;
        let batch = input.shape[0];
        if grad_output.shape != [batch, self.out_features] {
            return Err(Error::Shape(format!(
                "{}: gradient shape {:?} does not match output [{}, {}]",
                self.name, grad_output.shape, batch, self.out_features
            )));
        }

        // dW += dYᵀ · X
        matmul_at_b_acc(
            &grad_output.data,
            &input.data,
            &mut self.weight.grad.data,
            self.out_features,
            batch,
            self.in_features,
        );
        for row in grad_output.data.chunks(self.out_features) {
            for (g, &d) in self.bias.grad.data.iter_mut().zip(row) {
                *g += d;
            }
        }

        // dX = dY · W
        let mut grad_input = Tensor::zeros(&[batch, self.in_features]);
        matmul_acc(
            &grad_output.data,
            &self.weight.value.data,
            &mut grad_input.data,
            batch,
            self.out_features,
            self.in_features,
        );
        Ok(grad_input)
    }

    fn params_mut(&mut self) -> Vec<(&'static str, &mut Param)> {
        vec![("weight", &mut self.weight), ("bias", &mut self.bias)]
    }

    fn params(&self) -> Vec<(&'static str, &Param)> {
        vec![("weight", &self.weight), ("bias", &self.bias)]
    }

    fn output_shape(&self, input: &[usize]) -> Result<Vec<usize>> {
        if input != &[self.in_features][..] {
            return Err(Error::Shape(format!(
                "{}: expected [{}], got {:?}",
                self.name, self.in_features, input
            )));
        }
        Ok(vec![self.out_features])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn forward_is_affine() {
        let mut fc = Linear::new("fc", 3, 2, &mut StdRng::seed_from_u64(0));
        fc.weight.value.data = vec![1.0, 2.0, 3.0, -1.0, 0.0, 1.0];
        fc.bias.value.data = vec![0.5, -0.5];
        let x = Tensor::from_vec(&[1, 3], vec![1.0, 1.0, 2.0]).unwrap();
        let y = fc.forward(&x, Mode::Eval).unwrap();
        assert_eq!(y.data, vec![9.5, 0.5]);
    }

    #[test]
    fn init_bound_is_inverse_sqrt_fan_in() {
        let fc = Linear::new("fc", 100, 50, &mut StdRng::seed_from_u64(1));
        assert!(fc.weight.value.data.iter().all(|w| w.abs() <= 0.1));
        assert_eq!(fc.parameter_count(), 100 * 50 + 50);
    }

    #[test]
    fn gradients_match_finite_differences() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut fc = Linear::new("fc", 6, 4, &mut rng);
        let x = Tensor::uniform(&[3, 6], 1.0, &mut rng);

        let loss = |fc: &mut Linear, x: &Tensor| -> f32 {
            fc.forward(x, Mode::Eval).unwrap().data.iter().map(|v| v * v).sum()
        };

        let y = fc.forward(&x, Mode::Eval).unwrap();
        let grad_x = fc.backward(&y.map(|v| 2.0 * v)).unwrap();
        let eps = 1e-2;

        for i in 0..x.numel() {
            let mut xp = x.clone();
            xp.data[i] += eps;
            let mut xm = x.clone();
            xm.data[i] -= eps;
            let numeric = (loss(&mut fc, &xp) - loss(&mut fc, &xm)) / (2.0 * eps);
            assert!((numeric - grad_x.data[i]).abs() < 1e-2 * numeric.abs().max(1.0));
        }

        let analytic_b = fc.bias.grad.clone();
        for i in 0..4 {
            let orig = fc.bias.value.data[i];
            fc.bias.value.data[i] = orig + eps;
            let lp = loss(&mut fc, &x);
            fc.bias.value.data[i] = orig - eps;
            let lm = loss(&mut fc, &x);
            fc.bias.value.data[i] = orig;
            let numeric = (lp - lm) / (2.0 * eps);
            assert!((numeric - analytic_b.data[i]).abs() < 1e-2 * numeric.abs().max(1.0));
        }
    }
}
