//! Segment reconstruction for SEVIRI scanning-imager telemetry.
//!
//! Turns the space-packet stream of a Meteosat Second Generation imager into
//! finished multi-channel image products: eleven standard-resolution channels
//! and one high-resolution channel per scan segment.
//!
//! # Features
//!
//! - **Packet demultiplexing**: channel and line placement from the sequence
//!   counter and the embedded timecode alone
//! - **Segment detection**: debounced trigger-minute boundary, no end marker needed
//! - **Pluggable persistence**: [`ProductSink`] with directory (16-bit PNG) and in-memory sinks
//! - **Async ingestion**: replay files or in-process channels through one decode task
//!
//! ## Example (packet replay)
//!
//! ```rust,no_run
//! use seviri::{DecoderConfig, ScanMode, Seviri};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DecoderConfig::for_mode(ScanMode::FullDisk);
//!     let mut session = Seviri::replay("/data/msg3.ccsds", 323, config, "/data/products")?;
//!
//!     while let Some(report) = session.next_report().await {
//!         println!("Segment {} from {:?}", report.key, report.source);
//!     }
//!     Ok(())
//! }
//! ```

// Core types and error handling
mod error;
#[cfg_attr(any(test, feature = "benchmark"), path = "test_utils.rs")]
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Decoding
pub mod config;
pub mod framebuffer;
pub mod product;
pub mod raster;
pub mod reconstructor;
pub mod repack;
pub mod timecode;

// Stream-based ingestion
pub mod ccsds;
pub mod driver;
pub mod session;
pub mod source;
pub mod sources;

// Image crate used by preview and raster types
pub use image;

// Core exports
pub use error::*;
pub use types::*;

pub use config::{DecoderConfig, PreviewConfig};
pub use framebuffer::{Channel, ChannelFramebuffers};
pub use product::{DirectorySink, ImageProduct, MemorySink, ProductImage, ProductSink};
pub use raster::{Gray16Image, Raster};
pub use reconstructor::{FlushReport, PacketOutcome, SegmentReconstructor, SkipReason};
pub use repack::{SampleWidth, repack_bytes_to_10bits, repack_bytes_to_12bits, repack_bytes_to_16bits};
pub use timecode::{CdsTimecode, TimecodeCalibration, decode_timecode};

// Ingestion exports
pub use ccsds::{PacketReader, SpacePacketHeader};
pub use driver::{Driver, DriverExit, StopReason};
pub use session::DecodeSession;
pub use source::PacketSource;
pub use sources::{ChannelSource, ReplaySource};

/// Unified entry point for decoding sessions.
///
/// ## Replay into a product directory
/// ```rust,no_run
/// use seviri::{DecoderConfig, Seviri};
///
/// #[tokio::main]
/// async fn main() -> seviri::Result<()> {
///     let session = Seviri::replay("pass.ccsds", 324, DecoderConfig::default(), "products")?;
///     let exit = session.finish().await?;
///     println!("{:?}", exit.stats());
///     Ok(())
/// }
/// ```
pub struct Seviri;

impl Seviri {
    /// Replay a recorded packet file, writing products under `output`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The packet file does not exist or is not readable
    /// - The configuration is invalid
    pub fn replay<P, O>(
        path: P,
        scid: u16,
        config: DecoderConfig,
        output: O,
    ) -> Result<DecodeSession<DirectorySink>>
    where
        P: AsRef<std::path::Path>,
        O: Into<std::path::PathBuf>,
    {
        DecodeSession::replay(path, scid, config, DirectorySink::new(output))
    }

    /// Decode packets pushed through the returned sender.
    ///
    /// The session ends once every sender clone has been dropped.
    pub fn channel<S>(
        config: DecoderConfig,
        sink: S,
        capacity: usize,
    ) -> Result<(tokio::sync::mpsc::Sender<Packet>, DecodeSession<S>)>
    where
        S: ProductSink + 'static,
    {
        let reconstructor = SegmentReconstructor::new(config, sink)?;
        let (tx, source) = ChannelSource::new(capacity);
        Ok((tx, DecodeSession::start(source, reconstructor)))
    }
}
