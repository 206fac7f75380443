//! Running decoder counters

use serde::{Deserialize, Serialize};

/// Counters accumulated over the lifetime of a reconstructor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoderStats {
    /// Packets that were placed into a framebuffer
    pub packets_accepted: u64,

    /// Packets ignored (unknown spacecraft or no timecode)
    pub packets_skipped: u64,

    /// Segments handed to the product sink
    pub segments_flushed: u64,

    /// Lines that fell outside their framebuffer
    pub dropped_lines: u64,

    /// High-resolution packets that did not continue the previous line
    pub hrv_discontinuities: u64,
}
