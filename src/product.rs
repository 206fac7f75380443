//! Finished products and their persistence
//!
//! A flush turns the framebuffers into an [`ImageProduct`] and hands it to a
//! [`ProductSink`] under a key derived from the capture timestamp.
//! [`DirectorySink`] writes one directory per product; [`MemorySink`] keeps
//! products in memory for tests and embedding applications.

use crate::raster::Raster;
use crate::types::TOTAL_CHANNELS;
use crate::{DecodeError, Result};
use chrono::DateTime;
use image::{ImageError, ImageFormat};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Instrument name recorded on every product.
pub const INSTRUMENT_NAME: &str = "seviri";

/// Declared bit depth of product images.
pub const PRODUCT_BIT_DEPTH: u8 = 10;

/// Manifest file written next to the channel images.
pub const MANIFEST_FILE: &str = "product.yaml";

/// Extension of the per-channel image files.
pub const IMAGE_EXTENSION: &str = "png";

const KEY_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Human-readable persistence key for a capture timestamp, in UTC.
///
/// Timestamps outside the calendar range fall back to whole seconds.
pub fn product_key(timestamp: f64) -> String {
    let seconds = timestamp.floor() as i64;
    match DateTime::from_timestamp(seconds, 0) {
        Some(time) => time.format(KEY_FORMAT).to_string(),
        None => seconds.to_string(),
    }
}

/// One channel image of a product.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductImage {
    pub name: String,
    pub short_id: String,
    #[serde(skip)]
    pub raster: Raster,
    pub calibration_table: Vec<f64>,
    /// Unused, always -1
    pub ifov_x: i32,
    /// Unused, always -1
    pub ifov_y: i32,
    /// Column offset of this channel relative to the reference channel
    pub offset_x: i32,
}

/// A finished multi-channel segment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageProduct {
    /// Majority-voted spacecraft name, absent when nothing was observed
    pub source: Option<String>,
    pub instrument_name: String,
    pub bit_depth: u8,
    pub has_timestamps: bool,
    /// Capture time in Unix seconds
    pub timestamp: f64,
    pub images: Vec<ProductImage>,
}

impl ImageProduct {
    /// Assemble a product from rasters in channel order.
    ///
    /// Channel `i` is named `SEVIRI-{i+1}` and takes `channel_offsets[i]`,
    /// or 0 when the table is short.
    pub fn from_channels(
        source: Option<&str>,
        timestamp: f64,
        rasters: Vec<Raster>,
        channel_offsets: &[i32],
    ) -> Self {
        let images = rasters
            .into_iter()
            .enumerate()
            .map(|(index, raster)| ProductImage {
                name: format!("SEVIRI-{}", index + 1),
                short_id: (index + 1).to_string(),
                raster,
                calibration_table: Vec::new(),
                ifov_x: -1,
                ifov_y: -1,
                offset_x: channel_offsets.get(index).copied().unwrap_or(0),
            })
            .collect();

        Self {
            source: source.map(str::to_owned),
            instrument_name: INSTRUMENT_NAME.to_owned(),
            bit_depth: PRODUCT_BIT_DEPTH,
            has_timestamps: false,
            timestamp,
            images,
        }
    }

    /// Persistence key for this product.
    pub fn key(&self) -> String {
        product_key(self.timestamp)
    }

    pub fn image(&self, name: &str) -> Option<&ProductImage> {
        self.images.iter().find(|image| image.name == name)
    }

    /// Whether the product carries the full channel set.
    pub fn is_complete(&self) -> bool {
        self.images.len() == TOTAL_CHANNELS
    }
}

/// Persistence collaborator for finished products.
///
/// Called from the decode path; a slow sink delays the next packet.
pub trait ProductSink: Send {
    fn persist(&mut self, key: &str, product: &ImageProduct) -> Result<()>;
}

impl<S: ProductSink + ?Sized> ProductSink for Box<S> {
    fn persist(&mut self, key: &str, product: &ImageProduct) -> Result<()> {
        (**self).persist(key, product)
    }
}

/// Writes each product into `<root>/<key>/`.
///
/// Every image becomes a 16-bit grayscale PNG named after the channel, and
/// the product metadata goes to [`MANIFEST_FILE`].
#[derive(Debug, Clone)]
pub struct DirectorySink {
    root: PathBuf,
}

impl DirectorySink {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory a product with this key is written to.
    pub fn product_dir(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    fn write_image(dir: &Path, image: &ProductImage) -> Result<PathBuf, ImageError> {
        let path = dir.join(image_file(&image.name));
        image.raster.image().save_with_format(&path, ImageFormat::Png)?;
        Ok(path)
    }

    fn write_manifest(dir: &Path, product: &ImageProduct) -> std::io::Result<()> {
        let manifest = Manifest::from(product);
        let yaml = serde_yaml_ng::to_string(&manifest).map_err(std::io::Error::other)?;
        fs::write(dir.join(MANIFEST_FILE), yaml)
    }
}

impl ProductSink for DirectorySink {
    fn persist(&mut self, key: &str, product: &ImageProduct) -> Result<()> {
        let dir = self.product_dir(key);
        fs::create_dir_all(&dir).map_err(|e| DecodeError::persistence_error(key, e))?;

        for image in &product.images {
            let path = Self::write_image(&dir, image).map_err(|e| image_persistence_error(key, e))?;
            debug!(path = %path.display(), "Wrote channel image");
        }

        Self::write_manifest(&dir, product).map_err(|e| DecodeError::persistence_error(key, e))?;
        info!(key, images = product.images.len(), dir = %dir.display(), "Product written");
        Ok(())
    }
}

/// File name of a channel image inside a product directory.
pub fn image_file(name: &str) -> String {
    format!("{name}.{IMAGE_EXTENSION}")
}

fn image_persistence_error(key: &str, error: ImageError) -> DecodeError {
    let source = match error {
        ImageError::IoError(e) => e,
        other => std::io::Error::other(other),
    };
    DecodeError::persistence_error(key, source)
}

#[derive(Serialize)]
struct Manifest<'a> {
    source: Option<&'a str>,
    instrument: &'a str,
    bit_depth: u8,
    has_timestamps: bool,
    timestamp: f64,
    images: Vec<ManifestImage<'a>>,
}

#[derive(Serialize)]
struct ManifestImage<'a> {
    name: &'a str,
    short_id: &'a str,
    file: String,
    width: usize,
    height: usize,
    offset_x: i32,
    ifov_x: i32,
    ifov_y: i32,
    calibration_table: &'a [f64],
}

impl<'a> From<&'a ImageProduct> for Manifest<'a> {
    fn from(product: &'a ImageProduct) -> Self {
        let images = product
            .images
            .iter()
            .map(|image| ManifestImage {
                name: &image.name,
                short_id: &image.short_id,
                file: image_file(&image.name),
                width: image.raster.width(),
                height: image.raster.height(),
                offset_x: image.offset_x,
                ifov_x: image.ifov_x,
                ifov_y: image.ifov_y,
                calibration_table: &image.calibration_table,
            })
            .collect();

        Self {
            source: product.source.as_deref(),
            instrument: &product.instrument_name,
            bit_depth: product.bit_depth,
            has_timestamps: product.has_timestamps,
            timestamp: product.timestamp,
            images,
        }
    }
}

/// Keeps every persisted product in memory.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    products: Vec<(String, ImageProduct)>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn products(&self) -> &[(String, ImageProduct)] {
        &self.products
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    pub fn into_products(self) -> Vec<(String, ImageProduct)> {
        self.products
    }
}

impl ProductSink for MemorySink {
    fn persist(&mut self, key: &str, product: &ImageProduct) -> Result<()> {
        self.products.push((key.to_owned(), product.clone()));
        Ok(())
    }
}
