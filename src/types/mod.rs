//! Core types for imager packet reconstruction.
//!
//! ## Architecture
//!
//! - [`Packet`] is one space packet as delivered by a packet source
//! - [`ScanChunk`] classifies a packet by `sequence_count % 16`
//! - [`ScanMode`] fixes segment period and framebuffer heights
//! - [`Spacecraft`] carries the static per-spacecraft tables
//! - [`DecoderStats`] counts what the reconstructor did with its input
//!
//! ## Usage Example
//!
//! ```rust
//! use seviri::types::{Packet, ScanChunk, Spacecraft};
//!
//! let packet = Packet::new(323, 16 * 40 + 3, vec![0; 8]);
//! assert_eq!(ScanChunk::from_sequence(packet.sequence_count), ScanChunk::Standard { channel: 3 });
//! assert!(ScanChunk::from_sequence(packet.sequence_count).is_focal_plane_swapped());
//! assert_eq!(Spacecraft::from_scid(packet.scid), Some(Spacecraft::Msg3));
//! ```

mod chunk;
mod mode;
mod packet;
mod spacecraft;
mod stats;

pub use chunk::{
    CHUNKS_PER_CYCLE, HRV_PAIR_SUBLINES, STANDARD_CHANNELS, STANDARD_SUBLINES, ScanChunk,
    TOTAL_CHANNELS,
};
pub use mode::{
    HRV_LINE_DURATION, HRV_WIDTH, STANDARD_LINE_DURATION, STANDARD_LINE_SLOTS, STANDARD_WIDTH,
    ScanGeometry, ScanMode,
};
pub use packet::Packet;
pub use spacecraft::{Spacecraft, SpacecraftVotes, majority_vote};
pub use stats::DecoderStats;
