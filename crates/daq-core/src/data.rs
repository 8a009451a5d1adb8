//! Image frame type shared by camera drivers and the acquisition pipeline.

use anyhow::{bail, Result};
use ndarray::Array2;

/// Represents a single image frame.
///
/// Pixels are held as a 2-D array indexed `[row, column]`, i.e. `[y, x]`.
/// Cameras with 8-bit or 12-bit output are widened to `u16`; `bit_depth` records the
/// significant bits.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Pixel data, `rows x columns`
    pub pixels: Array2<u16>,

    /// Bits per pixel (e.g., 8, 12, 16)
    pub bit_depth: u32,
}

impl Frame {
    /// Wrap an existing pixel array.
    pub fn new(pixels: Array2<u16>, bit_depth: u32) -> Self {
        Self { pixels, bit_depth }
    }

    /// Create a new frame from row-major 16-bit pixel data.
    pub fn from_u16(width: u32, height: u32, pixels: &[u16]) -> Result<Self> {
        let shape = (height as usize, width as usize);
        if pixels.len() != shape.0 * shape.1 {
            bail!(
                "pixel buffer holds {} values, expected {}x{}",
                pixels.len(),
                width,
                height
            );
        }
        let pixels = Array2::from_shape_vec(shape, pixels.to_vec())?;
        Ok(Self {
            pixels,
            bit_depth: 16,
        })
    }

    /// Create a frame from raw little-endian bytes with explicit bit depth.
    ///
    /// 8-bit data uses one byte per pixel, anything wider uses two. `row_bytes` allows
    /// for padded rows as delivered by DMA buffers; pass `0` for tightly packed data.
    pub fn from_bytes(
        width: u32,
        height: u32,
        bit_depth: u32,
        row_bytes: usize,
        data: &[u8],
    ) -> Result<Self> {
        let bytes_per_pixel = if bit_depth <= 8 { 1 } else { 2 };
        let packed = width as usize * bytes_per_pixel;
        let stride = if row_bytes == 0 { packed } else { row_bytes };
        if stride < packed {
            bail!("row stride {} is shorter than a packed row ({})", stride, packed);
        }
        let needed = stride * height as usize;
        if data.len() < needed {
            bail!("frame buffer holds {} bytes, expected {}", data.len(), needed);
        }

        let mut pixels = Array2::<u16>::zeros((height as usize, width as usize));
        for (y, mut row) in pixels.rows_mut().into_iter().enumerate() {
            let line = &data[y * stride..y * stride + packed];
            if bytes_per_pixel == 1 {
                for (dst, &src) in row.iter_mut().zip(line) {
                    *dst = src as u16;
                }
            } else {
                for (dst, chunk) in row.iter_mut().zip(line.chunks_exact(2)) {
                    *dst = u16::from_le_bytes([chunk[0], chunk[1]]);
                }
            }
        }

        Ok(Self { pixels, bit_depth })
    }

    /// Width in pixels (number of columns).
    pub fn width(&self) -> u32 {
        self.pixels.ncols() as u32
    }

    /// Height in pixels (number of rows).
    pub fn height(&self) -> u32 {
        self.pixels.nrows() as u32
    }

    /// Get pixel value at (x, y).
    pub fn get(&self, x: u32, y: u32) -> Option<u16> {
        self.pixels.get((y as usize, x as usize)).copied()
    }

    /// Calculate mean pixel value.
    pub fn mean(&self) -> f64 {
        if self.pixels.is_empty() {
            return 0.0;
        }
        let sum: u64 = self.pixels.iter().map(|&v| v as u64).sum();
        sum as f64 / self.pixels.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_u16_is_row_major() {
        let frame = Frame::from_u16(3, 2, &[0, 1, 2, 10, 11, 12]).unwrap();
        assert_eq!(frame.width(), 3);
        assert_eq!(frame.height(), 2);
        assert_eq!(frame.get(2, 0), Some(2));
        assert_eq!(frame.get(0, 1), Some(10));
        assert_eq!(frame.get(3, 0), None);
    }

    #[test]
    fn from_u16_rejects_wrong_length() {
        assert!(Frame::from_u16(4, 4, &[0; 15]).is_err());
    }

    #[test]
    fn from_bytes_skips_row_padding() {
        // 2x2 16-bit frame, rows padded to 6 bytes
        let data = [1, 0, 2, 0, 0xFF, 0xFF, 3, 0, 4, 1, 0xFF, 0xFF];
        let frame = Frame::from_bytes(2, 2, 16, 6, &data).unwrap();
        assert_eq!(frame.get(0, 0), Some(1));
        assert_eq!(frame.get(1, 0), Some(2));
        assert_eq!(frame.get(0, 1), Some(3));
        assert_eq!(frame.get(1, 1), Some(260));
    }

    #[test]
    fn from_bytes_eight_bit() {
        let frame = Frame::from_bytes(2, 1, 8, 0, &[7, 200]).unwrap();
        assert_eq!(frame.bit_depth, 8);
        assert_eq!(frame.get(1, 0), Some(200));
    }

    #[test]
    fn from_bytes_rejects_short_buffer() {
        assert!(Frame::from_bytes(4, 4, 16, 0, &[0; 31]).is_err());
    }

    #[test]
    fn mean_of_pixels() {
        let frame = Frame::from_u16(2, 2, &[0, 2, 4, 6]).unwrap();
        assert!((frame.mean() - 3.0).abs() < f64::EPSILON);
    }
}
