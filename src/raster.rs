//! Single-channel raster container
//!
//! A thin wrapper over a 16-bit grayscale [`ImageBuffer`] that remembers the
//! sample bit depth it was filled with. Pixels are stored row-major, so a
//! linear index is `y * width + x`.

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, ImageBuffer, Luma};

use crate::{DecodeError, Result};

/// 16-bit grayscale image buffer backing a [`Raster`].
pub type Gray16Image = ImageBuffer<Luma<u16>, Vec<u16>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Raster {
    bit_depth: u8,
    image: Gray16Image,
}

impl Raster {
    /// Allocate a zero-filled raster.
    ///
    /// Fails when a dimension does not fit the image buffer's `u32` sizes.
    pub fn new(bit_depth: u8, width: usize, height: usize) -> Result<Self> {
        let (Ok(w), Ok(h)) = (u32::try_from(width), u32::try_from(height)) else {
            return Err(DecodeError::Raster { details: format!("{width}x{height} raster is too large") });
        };
        Ok(Self { bit_depth, image: ImageBuffer::new(w, h) })
    }

    pub fn bit_depth(&self) -> u8 {
        self.bit_depth
    }

    pub fn width(&self) -> usize {
        self.image.width() as usize
    }

    pub fn height(&self) -> usize {
        self.image.height() as usize
    }

    pub fn len(&self) -> usize {
        self.image.as_raw().len()
    }

    pub fn is_empty(&self) -> bool {
        self.image.as_raw().is_empty()
    }

    pub fn as_slice(&self) -> &[u16] {
        self.image.as_raw()
    }

    /// Underlying image, for encoding and further processing.
    pub fn image(&self) -> &Gray16Image {
        &self.image
    }

    fn samples_mut(&mut self) -> &mut [u16] {
        &mut self.image
    }

    /// Set every sample to `value`.
    pub fn fill(&mut self, value: u16) {
        self.samples_mut().fill(value);
    }

    /// Set the sample at a linear index. Out-of-range indices are ignored.
    pub fn set(&mut self, index: usize, value: u16) {
        if let Some(sample) = self.samples_mut().get_mut(index) {
            *sample = value;
        }
    }

    pub fn get(&self, index: usize) -> Option<u16> {
        self.as_slice().get(index).copied()
    }

    /// Sample at column `x`, row `y`.
    pub fn pixel(&self, x: usize, y: usize) -> Option<u16> {
        let (x, y) = (u32::try_from(x).ok()?, u32::try_from(y).ok()?);
        self.image.get_pixel_checked(x, y).map(|Luma([sample])| *sample)
    }

    pub fn row(&self, y: usize) -> Option<&[u16]> {
        if y >= self.height() {
            return None;
        }
        let width = self.width();
        self.as_slice().get(y * width..(y + 1) * width)
    }

    pub fn row_mut(&mut self, y: usize) -> Option<&mut [u16]> {
        if y >= self.height() {
            return None;
        }
        let width = self.width();
        self.samples_mut().get_mut(y * width..(y + 1) * width)
    }

    /// Mirror horizontally and/or vertically in place.
    pub fn mirror(&mut self, horizontal: bool, vertical: bool) {
        if horizontal {
            imageops::flip_horizontal_in_place(&mut self.image);
        }
        if vertical {
            imageops::flip_vertical_in_place(&mut self.image);
        }
    }

    /// 8-bit copy, keeping the high byte of left-aligned samples.
    pub fn to_8bits(&self) -> GrayImage {
        DynamicImage::ImageLuma16(self.image.clone()).into_luma8()
    }

    /// Nearest-neighbour resize.
    pub fn resize(&self, width: usize, height: usize) -> Result<Raster> {
        let dims = (u32::try_from(width), u32::try_from(height));
        let (Ok(w @ 1..), Ok(h @ 1..)) = dims else {
            return Err(self.resize_error(width, height));
        };
        if self.is_empty() {
            return Err(self.resize_error(width, height));
        }
        let image = imageops::resize(&self.image, w, h, FilterType::Nearest);
        Ok(Self { bit_depth: self.bit_depth, image })
    }

    /// Downscaled 8-bit copy for display.
    pub fn preview(&self, width: usize, height: usize) -> Result<GrayImage> {
        Ok(self.resize(width, height)?.to_8bits())
    }

    fn resize_error(&self, width: usize, height: usize) -> DecodeError {
        DecodeError::Raster {
            details: format!("Cannot resize {}x{} raster to {width}x{height}", self.width(), self.height()),
        }
    }
}
