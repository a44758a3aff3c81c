use serde::{Serialize, Deserialize};

use crate::error::Result;
use crate::math::tensor::Tensor;

/// Whether the network is being trained or evaluated.
///
/// Only `Dropout` behaves differently between the two; every other layer
/// ignores the mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    Train,
    Eval,
}

/// A learnable tensor and the gradient accumulated for it.
#[derive(Debug, Clone)]
pub struct Param {
    pub value: Tensor,
    pub grad: Tensor,
}

impl Param {
    pub fn new(value: Tensor) -> Param {
        let grad = Tensor::zeros(&value.shape);
        Param { value, grad }
    }

    pub fn zero_grad(&mut self) {
        self.grad.fill(0.0);
    }
}

/// Common interface of every layer in a `Network`.
///
/// `forward` caches whatever the matching `backward` call needs, so calls must
/// alternate forward → backward for the same batch. `backward` *accumulates*
/// into the parameter gradients; call `zero_grad` on the network between
/// optimizer steps.
pub trait Layer {
    /// Short name used as the state-dict prefix (e.g. `conv1`).
    fn name(&self) -> &str;

    fn forward(&mut self, input: &Tensor, mode: Mode) -> Result<Tensor>;

    /// Takes ∂L/∂output and returns ∂L/∂input.
    fn backward(&mut self, grad_output: &Tensor) -> Result<Tensor>;

    /// Named parameters (`"weight"`, `"bias"`). Empty for stateless layers.
    fn params_mut(&mut self) -> Vec<(&'static str, &mut Param)> {
        Vec::new()
    }

    fn params(&self) -> Vec<(&'static str, &Param)> {
        Vec::new()
    }

    /// Per-sample output shape for a per-sample input shape (no batch dim).
    fn output_shape(&self, input: &[usize]) -> Result<Vec<usize>>;

    fn parameter_count(&self) -> usize {
        self.params().iter().map(|(_, p)| p.value.numel()).sum()
    }
}
