//! Parsers for the IDX binary files MNIST is distributed in.
//!
//! # IDX3 image file layout
//! ```text
//! bytes  0-1:   0x00 0x00   (reserved, must be zero)
//! byte   2:     0x08        (dtype = uint8)
//! byte   3:     0x03        (number of dimensions = 3)
//! bytes  4-7:   N           (number of images, big-endian u32)
//! bytes  8-11:  rows        (image height in pixels, big-endian u32)
//! bytes 12-15:  cols        (image width in pixels, big-endian u32)
//! bytes 16..:   N * rows * cols bytes, row-major, uint8
//! ```
//!
//! # IDX1 label file layout
//! ```text
//! bytes  0-1:   0x00 0x00   (reserved, must be zero)
//! byte   2:     0x08        (dtype = uint8)
//! byte   3:     0x01        (number of dimensions = 1)
//! bytes  4-7:   N           (number of labels, big-endian u32)
//! bytes  8..:   N bytes, each a class index
//! ```

use crate::error::{Error, Result};

/// Raw pixels of an IDX3 file.
#[derive(Debug, Clone)]
pub struct IdxImages {
    pub count: usize,
    pub rows: usize,
    pub cols: usize,
    /// `count * rows * cols` bytes, image after image.
    pub pixels: Vec<u8>,
}

fn be_u32(bytes: &[u8], offset: usize) -> usize {
    u32::from_be_bytes([bytes[offset], bytes[offset + 1], bytes[offset + 2], bytes[offset + 3]]) as usize
}

fn check_header(bytes: &[u8], what: &str, header_len: usize, dims: u8) -> Result<()> {
    if bytes.len() < header_len {
        return Err(Error::Idx(format!(
            "{} file too short: expected at least {} header bytes, got {}",
            what, header_len, bytes.len()
        )));
    }
    if bytes[0] != 0x00 || bytes[1] != 0x00 {
        return Err(Error::Idx(format!(
            "{} file: bytes 0-1 must be 0x00 0x00 (reserved), got 0x{:02X} 0x{:02X}",
            what, bytes[0], bytes[1]
        )));
    }
    if bytes[2] != 0x08 {
        return Err(Error::Idx(format!(
            "{} file: byte 2 (dtype) must be 0x08 (uint8), got 0x{:02X}",
            what, bytes[2]
        )));
    }
    if bytes[3] != dims {
        return Err(Error::Idx(format!(
            "{} file: byte 3 (dimensions) must be {}, got {}",
            what, dims, bytes[3]
        )));
    }
    Ok(())
}

pub fn parse_images(bytes: &[u8]) -> Result<IdxImages> {
    check_header(bytes, "IDX image", 16, 0x03)?;

    let count = be_u32(bytes, 4);
    let rows = be_u32(bytes, 8);
    let cols = be_u32(bytes, 12);

    let needed = rows.checked_mul(cols)
        .and_then(|px| px.checked_mul(count))
        .ok_or_else(|| Error::Idx(format!(
            "IDX image file: {} x {} x {} overflows usize", count, rows, cols
        )))?;

    if bytes.len() - 16 < needed {
        return Err(Error::Idx(format!(
            "IDX image file too short: header declares {} images of {}x{} pixels \
             ({} data bytes), but only {} bytes follow the header",
            count, rows, cols, needed, bytes.len() - 16
        )));
    }

    Ok(IdxImages { count, rows, cols, pixels: bytes[16..16 + needed].to_vec() })
}

/// Parses an IDX1 label file; every label must be `< n_classes`.
pub fn parse_labels(bytes: &[u8], n_classes: usize) -> Result<Vec<u8>> {
    check_header(bytes, "IDX label", 8, 0x01)?;

    let count = be_u32(bytes, 4);
    if bytes.len() - 8 < count {
        return Err(Error::Idx(format!(
            "IDX label file too short: header declares {} labels but only {} bytes follow the header",
            count, bytes.len() - 8
        )));
    }

    let labels = bytes[8..8 + count].to_vec();
    if let Some((i, &bad)) = labels.iter().enumerate().find(|(_, l)| **l as usize >= n_classes) {
        return Err(Error::Idx(format!(
            "IDX label at index {}: class {} is out of range for {} classes",
            i, bad, n_classes
        )));
    }
    Ok(labels)
}
