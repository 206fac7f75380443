//! Scan-chunk classification
//!
//! The downlink multiplexes exactly 16 packet roles per scan cycle. The role
//! of a packet is its sequence counter modulo 16; the absolute counter carries
//! no other meaning for reconstruction.

use serde::{Deserialize, Serialize};

/// Number of packet roles in one scan cycle.
pub const CHUNKS_PER_CYCLE: u16 = 16;

/// Number of standard-resolution channels.
pub const STANDARD_CHANNELS: usize = 11;

/// Total product channels: the standard ones plus high resolution.
pub const TOTAL_CHANNELS: usize = STANDARD_CHANNELS + 1;

/// Sub-lines carried by one standard-resolution packet.
pub const STANDARD_SUBLINES: usize = 3;

/// Sub-lines carried by one two-line high-resolution packet.
pub const HRV_PAIR_SUBLINES: usize = 2;

/// Role of one packet within the 16-slot scan cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScanChunk {
    /// Chunks 0-10, one per standard channel
    Standard { channel: u8 },

    /// Chunks 11-14, two high-resolution lines each
    HighResPair { group: u8 },

    /// Chunk 15, the closing high-resolution line of the cycle
    HighResSingle,
}

impl ScanChunk {
    /// Classify a packet by its (possibly wrapped) sequence counter.
    pub const fn from_sequence(sequence_count: u16) -> Self {
        Self::from_index((sequence_count % CHUNKS_PER_CYCLE) as u8)
    }

    /// Classify a chunk index in `0..16`. Larger values wrap.
    pub const fn from_index(index: u8) -> Self {
        match index % CHUNKS_PER_CYCLE as u8 {
            channel @ 0..=10 => ScanChunk::Standard { channel },
            index @ 11..=14 => ScanChunk::HighResPair { group: index - 11 },
            _ => ScanChunk::HighResSingle,
        }
    }

    /// The chunk index this role occupies in the cycle.
    pub const fn index(self) -> u8 {
        match self {
            ScanChunk::Standard { channel } => channel,
            ScanChunk::HighResPair { group } => 11 + group,
            ScanChunk::HighResSingle => 15,
        }
    }

    /// Lines written by one packet of this role.
    pub const fn sublines(self) -> usize {
        match self {
            ScanChunk::Standard { .. } => STANDARD_SUBLINES,
            ScanChunk::HighResPair { .. } => HRV_PAIR_SUBLINES,
            ScanChunk::HighResSingle => 1,
        }
    }

    /// Offset of this chunk's first line from the high-resolution base line.
    ///
    /// The four pair chunks cover lines 0..8 of the group and the single
    /// chunk closes it with line 8.
    pub const fn hrv_line_offset(self) -> i64 {
        match self {
            ScanChunk::Standard { .. } => 0,
            ScanChunk::HighResPair { group } => group as i64 * HRV_PAIR_SUBLINES as i64,
            ScanChunk::HighResSingle => 8,
        }
    }

    /// Whether the sub-lines of this chunk arrive in reverse order.
    ///
    /// Channels 4, 5, 9, 10 and 11 (chunks 3, 4, 8, 9, 10) are mounted
    /// mirrored on the focal plane.
    pub const fn is_focal_plane_swapped(self) -> bool {
        matches!(self, ScanChunk::Standard { channel: 3 | 4 | 8 | 9 | 10 })
    }

    /// Whether this chunk starts a scan cycle and drives the boundary heuristic.
    pub const fn starts_cycle(self) -> bool {
        matches!(self, ScanChunk::Standard { channel: 0 })
    }
}
