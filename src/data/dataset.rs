use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tracing::{debug, info};

use crate::data::idx::{parse_images, parse_labels};
use crate::error::{Error, Result};

const TRAIN_IMAGES: &str = "train-images-idx3-ubyte";
const TRAIN_LABELS: &str = "train-labels-idx1-ubyte";
const TEST_IMAGES: &str = "t10k-images-idx3-ubyte";
const TEST_LABELS: &str = "t10k-labels-idx1-ubyte";

pub const WIDTH: usize = 28;
pub const HEIGHT: usize = 28;
pub const NUM_CLASSES: usize = 10;

/// One labeled digit image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MnistItem<'a> {
    /// `HEIGHT * WIDTH` raw intensities, row-major.
    pub image: &'a [u8],
    pub label: u8,
}

/// An in-memory MNIST split (60 000 train or 10 000 test images).
///
/// MNIST is small enough to hold raw: 28·28·60000 bytes ≈ 47 MB.
#[derive(Debug, Clone)]
pub struct MnistDataset {
    pixels: Vec<u8>,
    labels: Vec<u8>,
}

impl MnistDataset {
    /// Loads the training split from `dir`.
    pub fn train<P: AsRef<Path>>(dir: P) -> Result<MnistDataset> {
        MnistDataset::from_dir(dir.as_ref(), TRAIN_IMAGES, TRAIN_LABELS)
    }

    /// Loads the test split from `dir`.
    pub fn test<P: AsRef<Path>>(dir: P) -> Result<MnistDataset> {
        MnistDataset::from_dir(dir.as_ref(), TEST_IMAGES, TEST_LABELS)
    }

    /// Builds a dataset from the contents of an IDX3 image file and an IDX1
    /// label file. Images must be 28×28 and counts must agree.
    pub fn from_idx_bytes(image_bytes: &[u8], label_bytes: &[u8]) -> Result<MnistDataset> {
        let images = parse_images(image_bytes)?;
        if images.rows != HEIGHT || images.cols != WIDTH {
            return Err(Error::Idx(format!(
                "expected {}x{} images, got {}x{}",
                HEIGHT, WIDTH, images.rows, images.cols
            )));
        }
        let labels = parse_labels(label_bytes, NUM_CLASSES)?;
        if labels.len() != images.count {
            return Err(Error::Idx(format!(
                "image file declares {} items but label file declares {}",
                images.count, labels.len()
            )));
        }
        Ok(MnistDataset { pixels: images.pixels, labels })
    }

    fn from_dir(dir: &Path, images: &str, labels: &str) -> Result<MnistDataset> {
        let image_bytes = read_maybe_gz(dir, images)?;
        let label_bytes = read_maybe_gz(dir, labels)?;
        let dataset = MnistDataset::from_idx_bytes(&image_bytes, &label_bytes)?;
        info!(dir = %dir.display(), file = images, items = dataset.len(), "loaded MNIST split");
        Ok(dataset)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<MnistItem<'_>> {
        let label = *self.labels.get(index)?;
        let n = WIDTH * HEIGHT;
        Some(MnistItem { image: &self.pixels[index * n..(index + 1) * n], label })
    }
}

/// Reads `dir/name`, falling back to `dir/name.gz` (gunzipped on the fly).
fn read_maybe_gz(dir: &Path, name: &str) -> Result<Vec<u8>> {
    let plain = dir.join(name);
    if plain.exists() {
        debug!(path = %plain.display(), "reading IDX file");
        return std::fs::read(&plain).map_err(|e| Error::io(&plain, e));
    }

    let gz: PathBuf = dir.join(format!("{}.gz", name));
    debug!(path = %gz.display(), "reading gzip-compressed IDX file");
    let file = File::open(&gz).map_err(|e| Error::io(&gz, e))?;
    let mut bytes = Vec::new();
    GzDecoder::new(file).read_to_end(&mut bytes).map_err(|e| Error::io(&gz, e))?;
    Ok(bytes)
}
