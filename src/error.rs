//! Error types for segment reconstruction.
//!
//! The hot decode path never fails: unknown spacecraft, short
//! payloads and out-of-range lines are dropped silently and only show up in
//! [`DecoderStats`](crate::DecoderStats) and trace logs. Errors surface from
//! the edges of the crate instead:
//!
//! - **Persistence Errors**: the product sink failed while a segment was flushed
//! - **File Errors**: replay files or configuration files could not be read
//! - **Parse Errors**: malformed space-packet streams or configuration documents
//! - **Config Errors**: configuration values outside their valid range
//! - **Source Errors**: a packet source failed while the driver was reading from it
//!
//! ```rust
//! use seviri::DecodeError;
//!
//! let error = DecodeError::source_failed("ground station link dropped");
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for decoder operations.
pub type Result<T, E = DecodeError> = std::result::Result<T, E>;

/// Main error type for decoder operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum DecodeError {
    #[error("Failed to read {path}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to persist product '{key}'")]
    Persistence {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error in {context}: {details}")]
    Parse { context: String, details: String },

    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    #[error("Raster operation failed: {details}")]
    Raster { details: String },

    #[error("Packet source failed: {reason}")]
    Source {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl DecodeError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            DecodeError::Source { .. } => true,
            DecodeError::Persistence { .. } => true,
            DecodeError::File { .. } => false,
            DecodeError::Parse { .. } => false,
            DecodeError::Config { .. } => false,
            DecodeError::Raster { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            DecodeError::File { .. } => vec![
                "Check file exists and is readable",
                "Verify the path points at a packet dump or YAML config",
            ],
            DecodeError::Persistence { .. } => vec![
                "Check the output directory is writable",
                "Ensure sufficient disk space",
                "Retry with the product kept by take_unpersisted()",
            ],
            DecodeError::Parse { .. } => vec![
                "Verify the input is a stream of CCSDS space packets",
                "Check the YAML document against DecoderConfig",
            ],
            DecodeError::Config { .. } => vec![
                "Provide one channel offset per channel (12 entries)",
                "Pick a preview channel between 0 and 10",
            ],
            DecodeError::Raster { .. } => vec![
                "Check raster dimensions are non-zero",
                "Verify channel counts match between rasters",
            ],
            DecodeError::Source { .. } => vec![
                "Check the upstream demodulator is still running",
                "Reconnect the packet source",
            ],
        }
    }

    /// Helper constructor for file errors with path context.
    pub fn file_error(path: PathBuf, source: std::io::Error) -> Self {
        DecodeError::File { path, source }
    }

    /// Helper constructor for persistence errors.
    pub fn persistence_error(key: impl Into<String>, source: std::io::Error) -> Self {
        DecodeError::Persistence { key: key.into(), source }
    }

    /// Helper constructor for configuration errors.
    pub fn config_error(reason: impl Into<String>) -> Self {
        DecodeError::Config { reason: reason.into() }
    }

    /// Helper constructor for packet source failures.
    pub fn source_failed(reason: impl Into<String>) -> Self {
        DecodeError::Source { reason: reason.into(), source: None }
    }

    /// Helper constructor for packet source failures with an underlying cause.
    pub fn source_failed_with(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        DecodeError::Source { reason: reason.into(), source: Some(source) }
    }
}

impl From<std::io::Error> for DecodeError {
    fn from(err: std::io::Error) -> Self {
        DecodeError::File { path: PathBuf::from("<unknown>"), source: err }
    }
}

impl From<serde_yaml_ng::Error> for DecodeError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        DecodeError::Parse { context: "YAML document".to_string(), details: err.to_string() }
    }
}
