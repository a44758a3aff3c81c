use std::collections::HashMap;

use crate::layers::layer::Param;

/// Adadelta optimizer.
///
/// Per parameter element, with gradient `g`:
/// ```text
/// v  = ρ·v  + (1-ρ)·g²
/// Δ  = sqrt(u + ε) / sqrt(v + ε) · g
/// u  = ρ·u  + (1-ρ)·Δ²
/// θ -= lr·Δ
/// ```
/// `v` (square average) and `u` (accumulated delta) are created lazily per
/// parameter name on the first step.
pub struct Adadelta {
    pub learning_rate: f32,
    pub rho: f32,
    pub eps: f32,
    state: HashMap<String, (Vec<f32>, Vec<f32>)>,
}

impl Adadelta {
    pub fn new(learning_rate: f32) -> Adadelta {
        Adadelta::with_params(learning_rate, 0.9, 1e-6)
    }

    pub fn with_params(learning_rate: f32, rho: f32, eps: f32) -> Adadelta {
        Adadelta { learning_rate, rho, eps, state: HashMap::new() }
    }

    /// Applies one update to every `(name, param)` pair using its accumulated
    /// gradient. Gradients are left untouched; zero them before the next batch.
    pub fn step<'a, I>(&mut self, params: I)
    where
        I: IntoIterator<Item = (String, &'a mut Param)>,
    {
        let (rho, eps, lr) = (self.rho, self.eps, self.learning_rate);
        for (name, param) in params {
            let n = param.value.numel();
            let (square_avg, acc_delta) = self.state
                .entry(name)
                .or_insert_with(|| (vec![0.0; n], vec![0.0; n]));

            for i in 0..n {
                let g = param.grad.data[i];
                square_avg[i] = rho * square_avg[i] + (1.0 - rho) * g * g;
                let delta = (acc_delta[i] + eps).sqrt() / (square_avg[i] + eps).sqrt() * g;
                acc_delta[i] = rho * acc_delta[i] + (1.0 - rho) * delta * delta;
                param.value.data[i] -= lr * delta;
            }
        }
    }

    pub fn set_learning_rate(&mut self, lr: f32) {
        self.learning_rate = lr;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::tensor::Tensor;

    #[test]
    fn first_step_matches_closed_form() {
        let mut p = Param::new(Tensor::from_vec(&[2], vec![1.0, -1.0]).unwrap());
        p.grad.data = vec![0.5, -2.0];
        let mut opt = Adadelta::new(1.0);
        opt.step(vec![("w".to_owned(), &mut p)]);

        for (i, &g) in [0.5f32, -2.0].iter().enumerate() {
            let v = 0.1 * g * g;
            let delta = (1e-6f32).sqrt() / (v + 1e-6).sqrt() * g;
            let start = [1.0f32, -1.0][i];
            assert!((p.value.data[i] - (start - delta)).abs() < 1e-6);
        }
    }

    #[test]
    fn descends_a_quadratic() {
        // minimise (θ - 3)²
        let mut p = Param::new(Tensor::from_vec(&[1], vec![0.0]).unwrap());
        let mut opt = Adadelta::new(1.0);
        let mut prev = p.value.data[0];
        for _ in 0..200 {
            p.grad.data[0] = 2.0 * (p.value.data[0] - 3.0);
            opt.step(vec![("theta".to_owned(), &mut p)]);
            assert!(p.value.data[0] > prev, "θ must move towards the minimum");
            prev = p.value.data[0];
        }
        assert!(prev < 3.0, "θ = {}", prev);
    }
}
