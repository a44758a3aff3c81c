use serde::Serialize;

use crate::error::{Error, Result};
use crate::math::ops::argmax;
use crate::math::tensor::Tensor;
use crate::network::Network;

/// Result of classifying one preprocessed image.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub digit: usize,
    pub logits: Vec<f32>,
}

/// Runs `input` through the network in eval mode and returns the raw logits.
pub fn infer(network: &mut Network, input: &Tensor) -> Result<Tensor> {
    network.eval();
    network.forward(input)
}

/// Reduces a logits vector to the predicted class (arg-max, first index wins
/// ties).
pub fn postprocess(logits: &[f32]) -> usize {
    argmax(logits)
}

pub fn predict(network: &mut Network, input: &Tensor) -> Result<Prediction> {
    let logits = infer(network, input)?;
    if logits.batch() == 0 {
        return Err(Error::Shape("cannot predict on an empty batch".into()));
    }
    let row = logits.sample(0).to_vec();
    Ok(Prediction { digit: postprocess(&row), logits: row })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn postprocess_always_in_class_range() {
        let mut rng = StdRng::seed_from_u64(0);
        for _ in 0..500 {
            let logits: Vec<f32> = (0..10).map(|_| rng.gen_range(-1e3..1e3)).collect();
            assert!(postprocess(&logits) <= 9);
        }
        assert_eq!(postprocess(&[f32::NAN; 10]), 0);
        assert_eq!(postprocess(&[0.0; 10]), 0);
        let mut one_hot = [0.0f32; 10];
        one_hot[7] = 1.0;
        assert_eq!(postprocess(&one_hot), 7);
    }
}
