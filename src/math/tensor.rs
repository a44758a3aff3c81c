use rand::prelude::*;
use serde::{Serialize, Deserialize};

use crate::error::{Error, Result};

/// Dense row-major `f32` tensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl Tensor {
    pub fn zeros(shape: &[usize]) -> Tensor {
        Tensor {
            shape: shape.to_vec(),
            data: vec![0.0; shape.iter().product()],
        }
    }

    pub fn from_vec(shape: &[usize], data: Vec<f32>) -> Result<Tensor> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(Error::Shape(format!(
                "shape {:?} needs {} elements, got {}",
                shape, expected, data.len()
            )));
        }
        Ok(Tensor { shape: shape.to_vec(), data })
    }

    /// Samples every element from U(-bound, bound).
    ///
    /// With `bound = 1/sqrt(fan_in)` this is the default initialization of
    /// convolution and linear layers.
    pub fn uniform<R: Rng + ?Sized>(shape: &[usize], bound: f32, rng: &mut R) -> Tensor {
        let mut res = Tensor::zeros(shape);
        if bound > 0.0 {
            for v in &mut res.data {
                *v = rng.gen_range(-bound..bound);
            }
        }
        res
    }

    pub fn numel(&self) -> usize {
        self.data.len()
    }

    /// Size of the leading (batch) dimension.
    pub fn batch(&self) -> usize {
        self.shape.first().copied().unwrap_or(0)
    }

    /// Number of elements per sample (product of all but the first dim).
    pub fn sample_len(&self) -> usize {
        self.shape.iter().skip(1).product()
    }

    pub fn reshape(mut self, shape: &[usize]) -> Result<Tensor> {
        let expected: usize = shape.iter().product();
        if expected != self.data.len() {
            return Err(Error::Shape(format!(
                "cannot reshape {:?} into {:?}",
                self.shape, shape
            )));
        }
        self.shape = shape.to_vec();
        Ok(self)
    }

    /// Inserts a singleton dimension at the front.
    pub fn unsqueeze(mut self) -> Tensor {
        self.shape.insert(0, 1);
        self
    }

    /// The `index`-th sample along the leading dimension.
    pub fn sample(&self, index: usize) -> &[f32] {
        let n = self.sample_len();
        &self.data[index * n..(index + 1) * n]
    }

    pub fn map<F>(&self, functor: F) -> Tensor
    where
        F: Fn(f32) -> f32,
    {
        Tensor {
            shape: self.shape.clone(),
            data: self.data.iter().map(|&x| functor(x)).collect(),
        }
    }

    pub fn fill(&mut self, value: f32) {
        self.data.iter_mut().for_each(|x| *x = value);
    }

    pub fn min(&self) -> f32 {
        self.data.iter().copied().fold(f32::INFINITY, f32::min)
    }

    pub fn max(&self) -> f32 {
        self.data.iter().copied().fold(f32::NEG_INFINITY, f32::max)
    }
}

impl Default for Tensor {
    fn default() -> Self {
        Tensor { shape: vec![0], data: vec![] }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;

    #[test]
    fn from_vec_rejects_wrong_length() {
        assert!(Tensor::from_vec(&[2, 3], vec![0.0; 5]).is_err());
        let t = Tensor::from_vec(&[2, 3], vec![1.0; 6]).unwrap();
        assert_eq!(t.batch(), 2);
        assert_eq!(t.sample_len(), 3);
    }

    #[test]
    fn uniform_respects_bound_and_seed() {
        let a = Tensor::uniform(&[4, 25], 0.2, &mut StdRng::seed_from_u64(7));
        let b = Tensor::uniform(&[4, 25], 0.2, &mut StdRng::seed_from_u64(7));
        assert_eq!(a, b);
        assert!(a.data.iter().all(|v| (-0.2..0.2).contains(v)));
    }

    #[test]
    fn reshape_and_unsqueeze() {
        let t = Tensor::zeros(&[28, 28]).unsqueeze().unsqueeze();
        assert_eq!(t.shape, vec![1, 1, 28, 28]);
        let flat = t.reshape(&[1, 784]).unwrap();
        assert_eq!(flat.sample(0).len(), 784);
        assert!(flat.reshape(&[5, 5]).is_err());
    }
}
