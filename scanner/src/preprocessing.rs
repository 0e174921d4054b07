//! Frame preprocessing: center crop and captured-image conversion

use crate::error::{Result, ScanError};
use crate::types::{ImageData, ImageFormat};
use image::RgbImage;
use std::path::Path;

/// Crops camera frames to the square region the classifier looks at
#[derive(Debug, Clone)]
pub struct FramePreprocessor {
    /// Side of the square crop in pixels
    crop_size: u32,
}

impl FramePreprocessor {
    /// Create new frame preprocessor
    pub fn new(crop_size: u32) -> Self {
        Self { crop_size }
    }

    /// Get crop size
    pub fn crop_size(&self) -> u32 {
        self.crop_size
    }

    /// Top-left source offset of the centered crop
    pub fn crop_origin(&self, width: u32, height: u32) -> (u32, u32) {
        (
            width.saturating_sub(self.crop_size) / 2,
            height.saturating_sub(self.crop_size) / 2,
        )
    }

    /// Copy the centered `crop_size` square out of `frame`, row by row.
    ///
    /// Output keeps the source pixel format and is tightly packed. Frames
    /// smaller than the crop in either dimension are rejected.
    pub fn crop_center(&self, frame: &ImageData) -> Result<ImageData> {
        if !frame.validate() {
            return Err(ScanError::preprocessing(format!(
                "Invalid frame buffer: {} bytes for {}x{} with {} bytes per row",
                frame.data.len(),
                frame.width,
                frame.height,
                frame.bytes_per_row
            )));
        }

        if frame.width < self.crop_size || frame.height < self.crop_size {
            return Err(ScanError::InvalidDimensions {
                expected: (self.crop_size, self.crop_size),
                actual: (frame.width, frame.height),
            });
        }

        let bpp = frame.channels() as usize;
        let (crop_x, crop_y) = self.crop_origin(frame.width, frame.height);
        let row_len = self.crop_size as usize * bpp;
        let mut data = Vec::with_capacity(row_len * self.crop_size as usize);

        for row in 0..self.crop_size as usize {
            let src_offset = (row + crop_y as usize) * frame.bytes_per_row + crop_x as usize * bpp;
            data.extend_from_slice(&frame.data[src_offset..src_offset + row_len]);
        }

        Ok(ImageData::new(
            data,
            self.crop_size,
            self.crop_size,
            frame.format,
        ))
    }

    /// Convert a frame to an RGB image for display
    pub fn to_rgb_image(&self, frame: &ImageData) -> Result<RgbImage> {
        if !frame.validate() {
            return Err(ScanError::preprocessing(
                "Invalid image data: size mismatch".to_string(),
            ));
        }

        let rgb_data = convert_to_rgb(frame);
        RgbImage::from_raw(frame.width, frame.height, rgb_data)
            .ok_or_else(|| ScanError::preprocessing("Failed to create image buffer".to_string()))
    }
}

/// Convert image rows to packed RGB, skipping any row padding
fn convert_to_rgb(image: &ImageData) -> Vec<u8> {
    let bpp = image.channels() as usize;
    let row_len = image.width as usize * bpp;
    let mut rgb_data = Vec::with_capacity(image.width as usize * image.height as usize * 3);

    for row in image
        .data
        .chunks(image.bytes_per_row)
        .take(image.height as usize)
    {
        let pixels = row[..row_len].chunks_exact(bpp);
        match image.format {
            ImageFormat::RGB => rgb_data.extend_from_slice(&row[..row_len]),
            ImageFormat::BGR | ImageFormat::BGRA => {
                // Swap R and B, drop alpha
                for chunk in pixels {
                    rgb_data.extend_from_slice(&[chunk[2], chunk[1], chunk[0]]);
                }
            }
            ImageFormat::RGBA => {
                for chunk in pixels {
                    rgb_data.extend_from_slice(&chunk[..3]);
                }
            }
            ImageFormat::Grayscale => {
                for chunk in pixels {
                    rgb_data.extend_from_slice(&[chunk[0], chunk[0], chunk[0]]);
                }
            }
        }
    }

    rgb_data
}

/// Utility functions for frame I/O
pub mod utils {
    use super::*;

    /// Load an encoded image file as an RGB frame
    pub fn load_frame<P: AsRef<Path>>(path: P) -> Result<ImageData> {
        let img = image::open(path)?;
        let rgb_img = img.to_rgb8();
        let (width, height) = rgb_img.dimensions();

        Ok(ImageData::new(
            rgb_img.into_raw(),
            width,
            height,
            ImageFormat::RGB,
        ))
    }
}
