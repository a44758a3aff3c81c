//! Turns a photograph of a dark digit on a light background into the
//! `[1, 1, 28, 28]` tensor the classifier was trained on.
//!
//! Pipeline: grayscale → invert → 2px zero border → bilinear resize to
//! 28×28 → scale to `[0, 1]` → add batch and channel dims.

use std::path::Path;

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Luma};
use tracing::debug;

use crate::error::{Error, Result};
use crate::math::tensor::Tensor;

pub const TARGET_SIZE: u32 = 28;
pub const BORDER: u32 = 2;

/// Loads the image at `path` and preprocesses it.
pub fn preprocess<P: AsRef<Path>>(path: P) -> Result<Tensor> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(Error::io(
            path,
            std::io::Error::new(std::io::ErrorKind::NotFound, "image file not found"),
        ));
    }
    let img = image::open(path)?;
    debug!(path = %path.display(), width = img.width(), height = img.height(), "loaded image");
    preprocess_image(img)
}

/// Decodes image bytes (PNG/JPEG/BMP/GIF) and preprocesses them.
pub fn preprocess_bytes(bytes: &[u8]) -> Result<Tensor> {
    let img = image::load_from_memory(bytes)?;
    preprocess_image(img)
}

/// Runs the pipeline on an already decoded image. Color images are converted
/// to luma first.
pub fn preprocess_image(img: DynamicImage) -> Result<Tensor> {
    let mut gray = img.into_luma8();
    debug!(shape = ?(gray.height(), gray.width()), "grayscale");

    imageops::invert(&mut gray);

    let padded = pad_constant(&gray, BORDER, 0);
    debug!(shape = ?(padded.height(), padded.width()), "padded");

    let resized = imageops::resize(&padded, TARGET_SIZE, TARGET_SIZE, FilterType::Triangle);

    let data: Vec<f32> = resized.pixels().map(|p| p.0[0] as f32 / 255.0).collect();
    let tensor = Tensor::from_vec(&[TARGET_SIZE as usize, TARGET_SIZE as usize], data)?;
    debug!(shape = ?tensor.shape, "normalized");

    let tensor = tensor.unsqueeze();
    debug!(shape = ?tensor.shape, "added channel dim");
    let tensor = tensor.unsqueeze();
    debug!(shape = ?tensor.shape, "added batch dim (batch, channel, height, width)");
    Ok(tensor)
}

/// Surrounds `img` with a `border`-pixel frame of constant `value`.
fn pad_constant(img: &GrayImage, border: u32, value: u8) -> GrayImage {
    let mut out = GrayImage::from_pixel(img.width() + 2 * border, img.height() + 2 * border, Luma([value]));
    for (x, y, px) in img.enumerate_pixels() {
        out.put_pixel(x + border, y + border, *px);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn white_with_black_square(w: u32, h: u32) -> DynamicImage {
        let mut img = GrayImage::from_pixel(w, h, Luma([255]));
        for y in h / 4..3 * h / 4 {
            for x in w / 4..3 * w / 4 {
                img.put_pixel(x, y, Luma([0]));
            }
        }
        DynamicImage::ImageLuma8(img)
    }

    #[test]
    fn output_shape_is_fixed_for_any_input_size() {
        for &(w, h) in &[(1, 1), (5, 3), (28, 28), (100, 37), (640, 480)] {
            let t = preprocess_image(white_with_black_square(w, h)).unwrap();
            assert_eq!(t.shape, vec![1, 1, 28, 28], "input {}x{}", w, h);
        }
    }

    #[test]
    fn values_are_normalized_and_inverted() {
        let t = preprocess_image(white_with_black_square(200, 200)).unwrap();
        assert!(t.min() >= 0.0 && t.max() <= 1.0);
        // border is background (white → 0 after inversion), centre is the digit
        assert_eq!(t.data[0], 0.0);
        assert!(t.data[14 * 28 + 14] > 0.9);
    }

    #[test]
    fn pads_with_constant_border() {
        let img = GrayImage::from_pixel(3, 2, Luma([9]));
        let padded = pad_constant(&img, 2, 0);
        assert_eq!(padded.dimensions(), (7, 6));
        assert_eq!(padded.get_pixel(0, 0).0[0], 0);
        assert_eq!(padded.get_pixel(2, 2).0[0], 9);
        assert_eq!(padded.get_pixel(4, 3).0[0], 9);
        assert_eq!(padded.get_pixel(5, 3).0[0], 0);
    }

    #[test]
    fn decodes_from_memory_and_reports_missing_files() {
        let mut bytes = std::io::Cursor::new(Vec::new());
        white_with_black_square(40, 40)
            .write_to(&mut bytes, image::ImageOutputFormat::Png)
            .unwrap();
        let t = preprocess_bytes(bytes.get_ref()).unwrap();
        assert_eq!(t.shape, vec![1, 1, 28, 28]);

        assert!(preprocess_bytes(b"not an image").is_err());
        let err = preprocess("/definitely/not/here.png").unwrap_err();
        assert!(err.is_not_found());
    }
}
