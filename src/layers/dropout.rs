//! Inverted dropout.
//!
//! In `Mode::Train` every unit is zeroed with probability `p` and survivors are
//! scaled by `1 / (1 - p)`, so the expected activation is unchanged and
//! `Mode::Eval` can pass inputs straight through.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{Error, Result};
use crate::layers::layer::{Layer, Mode};
use crate::math::tensor::Tensor;

#[derive(Debug)]
pub struct Dropout {
    name: String,
    pub p: f32,
    rng: StdRng,
    // per-element multiplier from the last training forward; None after eval
    mask: Option<Vec<f32>>,
}

impl Dropout {
    /// `p` must be in `[0, 1)`.
    pub fn new(name: &str, p: f32, seed: u64) -> Result<Dropout> {
        if !(0.0..1.0).contains(&p) {
            return Err(Error::Config(format!("{}: dropout rate {} is not in [0, 1)", name, p)));
        }
        Ok(Dropout {
            name: name.to_owned(),
            p,
            rng: StdRng::seed_from_u64(seed),
            mask: None,
        })
    }
}

impl Layer for Dropout {
    fn name(&self) -> &str {
        &self.name
    }

    fn forward(&mut self, input: &Tensor, mode: Mode) -> Result<Tensor> {
        if mode == Mode::Eval || self.p == 0.0 {
            self.mask = None;
            return Ok(input.clone());
        }

        let scale = 1.0 / (1.0 - self.p);
        let p = self.p;
        let rng = &mut self.rng;
        let mask: Vec<f32> = (0..input.numel())
            .map(|_| if rng.gen::<f32>() < p { 0.0 } else { scale })
            .collect();
        let data = input.data.iter().zip(&mask).map(|(x, m)| x * m).collect();
        self.mask = Some(mask);
        Tensor::from_vec(&input.shape, data)
    }

    fn backward(&mut self, grad_output: &Tensor) -> Result<Tensor> {
        match self.mask.take() {
            None => Ok(grad_output.clone()),
            Some(mask) => {
                if mask.len() != grad_output.numel() {
                    return Err(Error::Shape(format!(
                        "{}: gradient shape {:?} does not match last forward pass",
                        self.name, grad_output.shape
                    )));
                }
                let data = grad_output.data.iter().zip(&mask).map(|(g, m)| g * m).collect();
                Tensor::from_vec(&grad_output.shape, data)
            }
        }
    }

    fn output_shape(&self, input: &[usize]) -> Result<Vec<usize>> {
        Ok(input.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_rate() {
        assert!(Dropout::new("d", 1.0, 0).is_err());
        assert!(Dropout::new("d", -0.1, 0).is_err());
        assert!(Dropout::new("d", 0.75, 0).is_ok());
    }

    #[test]
    fn eval_mode_is_identity() {
        let mut d = Dropout::new("d", 0.5, 1).unwrap();
        let x = Tensor::from_vec(&[2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        assert_eq!(d.forward(&x, Mode::Eval).unwrap(), x);
    }

    #[test]
    fn train_mode_drops_at_configured_rate_and_rescales() {
        let mut d = Dropout::new("d", 0.75, 42).unwrap();
        let x = Tensor::from_vec(&[100, 100], vec![1.0; 10_000]).unwrap();
        let y = d.forward(&x, Mode::Train).unwrap();

        let dropped = y.data.iter().filter(|&&v| v == 0.0).count() as f32 / 10_000.0;
        assert!((dropped - 0.75).abs() < 0.03, "drop rate {}", dropped);
        assert!(y.data.iter().all(|&v| v == 0.0 || (v - 4.0).abs() < 1e-6));

        // gradient follows the same mask
        let g = d.backward(&x).unwrap();
        assert_eq!(g, y);
    }
}
