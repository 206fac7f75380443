//! Decoder configuration
//!
//! Configuration is plain data with serde defaults, so an empty YAML document
//! yields the reference behaviour:
//!
//! ```rust
//! use seviri::{DecoderConfig, ScanMode};
//!
//! let config = DecoderConfig::from_yaml_str("mode: rapid_scan\n").unwrap();
//! assert_eq!(config.mode, ScanMode::RapidScan);
//! assert_eq!(config.channel_offsets[1], -18);
//! ```

use crate::types::{STANDARD_CHANNELS, ScanMode, TOTAL_CHANNELS};
use crate::{DecodeError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Reference per-channel column offsets. Entries past the third are
/// uncalibrated placeholders.
pub const DEFAULT_CHANNEL_OFFSETS: [i32; TOTAL_CHANNELS] = [0, -18, 18, 0, 0, 0, 0, 0, 0, 0, 0, 0];

/// Decoder settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Operating mode, fixed for the decoder's lifetime
    pub mode: ScanMode,

    /// Column offset recorded for each product channel (11 standard, then high resolution)
    pub channel_offsets: Vec<i32>,

    /// Report the fixed payload trim for two-line high-resolution packets
    pub trim_hrv_payload: bool,

    /// Keep a product whose persistence failed so it can be retried
    pub preserve_on_persist_failure: bool,

    /// Advisory live preview; disabled when absent
    pub preview: Option<PreviewConfig>,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            mode: ScanMode::default(),
            channel_offsets: DEFAULT_CHANNEL_OFFSETS.to_vec(),
            trim_hrv_payload: true,
            preserve_on_persist_failure: true,
            preview: None,
        }
    }
}

impl DecoderConfig {
    /// Default configuration for a scan mode.
    pub fn for_mode(mode: ScanMode) -> Self {
        Self { mode, ..Self::default() }
    }

    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        debug!(mode = ?config.mode, preview = config.preview.is_some(), "Loaded decoder config");
        Ok(config)
    }

    /// Read, parse and validate a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| DecodeError::file_error(path.to_path_buf(), e))?;
        Self::from_yaml_str(&yaml)
    }

    pub fn validate(&self) -> Result<()> {
        if self.channel_offsets.len() != TOTAL_CHANNELS {
            return Err(DecodeError::config_error(format!(
                "expected {} channel offsets, found {}",
                TOTAL_CHANNELS,
                self.channel_offsets.len()
            )));
        }

        if let Some(preview) = &self.preview {
            preview.validate()?;
        }

        Ok(())
    }
}

/// Live preview of one standard channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    /// Standard channel shown in the preview
    pub channel: u8,
    pub width: usize,
    pub height: usize,
    /// Refresh when the line counter reaches a multiple of this
    pub every_lines: usize,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self { channel: 3, width: 1000, height: 1000, every_lines: 40 }
    }
}

impl PreviewConfig {
    pub fn validate(&self) -> Result<()> {
        if self.channel as usize >= STANDARD_CHANNELS {
            return Err(DecodeError::config_error(format!(
                "preview channel {} is not a standard channel",
                self.channel
            )));
        }
        if self.width == 0 || self.height == 0 || self.every_lines == 0 {
            return Err(DecodeError::config_error(
                "preview width, height and every_lines must be non-zero",
            ));
        }
        Ok(())
    }
}
