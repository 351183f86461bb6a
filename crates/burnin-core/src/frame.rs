//! Frame buffers moved between the decoder, the compositor and the encoder.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Pixel layout of a [`FrameBuffer`].
///
/// The pipeline moves exactly three layouts: 8-bit RGBA for SDR frames and
/// the overlay canvas, packed 16-bit 4:4:4 YCbCr for decoded HDR frames
/// (converted to RGB in the shader), and 16-bit RGBA for composited HDR
/// output handed to the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    /// 8 bits per channel RGBA, 4 bytes per pixel.
    Rgba8,
    /// Packed 16-bit per channel AYCbCr (alpha ignored), 8 bytes per pixel.
    Yuv16,
    /// 16 bits per channel RGBA, 8 bytes per pixel.
    Rgba16,
}

impl PixelFormat {
    /// Bytes per pixel for this layout.
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgba8 => 4,
            PixelFormat::Yuv16 | PixelFormat::Rgba16 => 8,
        }
    }
}

/// A single tightly packed image plane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBuffer {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Vec<u8>,
}

impl FrameBuffer {
    /// Create a zero-filled (black / transparent) buffer.
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        let size = width as usize * height as usize * format.bytes_per_pixel();
        Self {
            width,
            height,
            format,
            data: vec![0u8; size],
        }
    }

    /// Wrap existing pixel data, validating its length.
    pub fn from_data(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * format.bytes_per_pixel();
        if data.len() != expected {
            return Err(Error::Configuration(format!(
                "frame data is {} bytes, expected {} for {}x{} {:?}",
                data.len(),
                expected,
                width,
                height,
                format
            )));
        }
        Ok(Self {
            width,
            height,
            format,
            data,
        })
    }

    /// Bytes in one row.
    pub fn row_bytes(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel()
    }

    /// Fill every pixel with the same value. RGBA8 only.
    pub fn fill_rgba8(&mut self, rgba: [u8; 4]) {
        debug_assert_eq!(self.format, PixelFormat::Rgba8);
        for px in self.data.chunks_exact_mut(4) {
            px.copy_from_slice(&rgba);
        }
    }

    /// Solid-color RGBA8 frame, used by tests and the scripted backends.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let mut buf = Self::new(width, height, PixelFormat::Rgba8);
        buf.fill_rgba8(rgba);
        buf
    }
}
