//! Packet type handed to the reconstructor

/// One space packet as delivered by the packet source.
///
/// The reconstructor borrows a packet for a single processing step and never
/// keeps it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Spacecraft id from the transfer frame that carried this packet
    pub scid: u16,

    /// Wrapping 14-bit sequence counter from the primary header
    pub sequence_count: u16,

    /// Packet data field, starting with the embedded timecode
    pub payload: Vec<u8>,
}

impl Packet {
    /// Create a new packet
    pub fn new(scid: u16, sequence_count: u16, payload: Vec<u8>) -> Self {
        Self { scid, sequence_count, payload }
    }

    /// Apply the payload trim reported for two-line high-resolution packets.
    ///
    /// Downstream framing bookkeeping expects those payloads cut to a fixed
    /// length; `None` leaves the payload untouched.
    pub fn apply_framing_trim(&mut self, trimmed_len: Option<usize>) {
        if let Some(len) = trimmed_len {
            self.payload.resize(len, 0);
        }
    }
}
