use rand::seq::SliceRandom;
use rand::Rng;

use crate::data::dataset::{MnistDataset, HEIGHT, WIDTH};
use crate::error::Result;
use crate::math::tensor::Tensor;

/// A mini-batch ready for the network.
#[derive(Debug, Clone)]
pub struct Batch {
    /// `[B, 1, 28, 28]`, intensities scaled to `[0, 1]`.
    pub images: Tensor,
    pub targets: Vec<usize>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Splits a dataset into batches of `batch_size`; the last one may be
/// smaller.
#[derive(Debug, Clone)]
pub struct DataLoader {
    pub batch_size: usize,
    pub shuffle: bool,
}

impl DataLoader {
    pub fn new(batch_size: usize, shuffle: bool) -> DataLoader {
        DataLoader { batch_size: batch_size.max(1), shuffle }
    }

    pub fn num_batches(&self, dataset: &MnistDataset) -> usize {
        (dataset.len() + self.batch_size - 1) / self.batch_size
    }

    /// One epoch worth of batches. With `shuffle` the sample order is drawn
    /// fresh from `rng` on every call.
    pub fn batches<'a, R: Rng + ?Sized>(
        &self,
        dataset: &'a MnistDataset,
        rng: &mut R,
    ) -> impl Iterator<Item = Result<Batch>> + 'a {
        let mut indices: Vec<usize> = (0..dataset.len()).collect();
        if self.shuffle {
            indices.shuffle(rng);
        }
        let batch_size = self.batch_size;
        let chunks: Vec<Vec<usize>> = indices.chunks(batch_size).map(|c| c.to_vec()).collect();
        chunks.into_iter().map(move |chunk| collate(dataset, &chunk))
    }
}

fn collate(dataset: &MnistDataset, indices: &[usize]) -> Result<Batch> {
    let mut data = Vec::with_capacity(indices.len() * WIDTH * HEIGHT);
    let mut targets = Vec::with_capacity(indices.len());
    for item in indices.iter().filter_map(|&i| dataset.get(i)) {
        data.extend(item.image.iter().map(|&px| px as f32 / 255.0));
        targets.push(item.label as usize);
    }
    let images = Tensor::from_vec(&[targets.len(), 1, HEIGHT, WIDTH], data)?;
    Ok(Batch { images, targets })
}
