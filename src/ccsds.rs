//! Space packet framing
//!
//! Reads CCSDS space packets from a contiguous byte stream, such as a
//! recorded demultiplexer output. Only the 6-byte primary header is
//! interpreted; the data field is handed on untouched as the packet payload.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use seviri::ccsds::PacketReader;
//!
//! fn count_packets() -> seviri::Result<usize> {
//!     let mut reader = PacketReader::open("seviri.ccsds", 323)?;
//!     let mut count = 0;
//!     while let Some(packet) = reader.next_packet()? {
//!         count += 1;
//!         println!("seq={} len={}", packet.sequence_count, packet.payload.len());
//!     }
//!     Ok(count)
//! }
//! ```

use crate::types::Packet;
use crate::{DecodeError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

/// Length of the primary header.
pub const PRIMARY_HEADER_LEN: usize = 6;

/// APID reserved for idle packets.
pub const IDLE_APID: u16 = 0x7FF;

/// Largest data field a primary header can describe.
pub const MAX_DATA_FIELD_LEN: usize = 1 << 16;

const SEQUENCE_COUNT_MASK: u16 = 0x3FFF;

/// Decoded primary header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpacePacketHeader {
    pub version: u8,
    /// 0 for telemetry, 1 for telecommand
    pub packet_type: u8,
    pub secondary_header: bool,
    pub apid: u16,
    pub sequence_flags: u8,
    /// 14-bit wrapping counter
    pub sequence_count: u16,
    /// Raw length field: data field length minus one
    pub data_length: u16,
}

impl SpacePacketHeader {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let Some(header) = bytes.get(..PRIMARY_HEADER_LEN) else {
            return Err(DecodeError::Parse {
                context: "Space packet header".to_string(),
                details: format!("need {} bytes, got {}", PRIMARY_HEADER_LEN, bytes.len()),
            });
        };

        let id = u16::from_be_bytes([header[0], header[1]]);
        let sequence = u16::from_be_bytes([header[2], header[3]]);
        let data_length = u16::from_be_bytes([header[4], header[5]]);

        Ok(Self {
            version: (id >> 13) as u8,
            packet_type: ((id >> 12) & 1) as u8,
            secondary_header: (id >> 11) & 1 == 1,
            apid: id & IDLE_APID,
            sequence_flags: (sequence >> 14) as u8,
            sequence_count: sequence & SEQUENCE_COUNT_MASK,
            data_length,
        })
    }

    /// Unsegmented telemetry header for a data field of `payload_len` bytes.
    pub fn telemetry(apid: u16, sequence_count: u16, payload_len: usize) -> Result<Self> {
        if payload_len == 0 || payload_len > MAX_DATA_FIELD_LEN {
            return Err(DecodeError::Parse {
                context: "Space packet header".to_string(),
                details: format!("data field of {} bytes cannot be framed", payload_len),
            });
        }

        Ok(Self {
            version: 0,
            packet_type: 0,
            secondary_header: false,
            apid: apid & IDLE_APID,
            sequence_flags: 0b11,
            sequence_count: sequence_count & SEQUENCE_COUNT_MASK,
            data_length: (payload_len - 1) as u16,
        })
    }

    /// Length of the data field that follows the header.
    pub fn payload_len(&self) -> usize {
        self.data_length as usize + 1
    }

    pub fn is_idle(&self) -> bool {
        self.apid == IDLE_APID
    }

    pub fn to_bytes(&self) -> [u8; PRIMARY_HEADER_LEN] {
        let id = (self.version as u16 & 0b111) << 13
            | (self.packet_type as u16 & 1) << 12
            | (self.secondary_header as u16) << 11
            | (self.apid & IDLE_APID);
        let sequence = (self.sequence_flags as u16 & 0b11) << 14 | (self.sequence_count & SEQUENCE_COUNT_MASK);

        let mut bytes = [0u8; PRIMARY_HEADER_LEN];
        bytes[0..2].copy_from_slice(&id.to_be_bytes());
        bytes[2..4].copy_from_slice(&sequence.to_be_bytes());
        bytes[4..6].copy_from_slice(&self.data_length.to_be_bytes());
        bytes
    }
}

/// Append one framed packet to `out`.
pub fn write_packet(out: &mut Vec<u8>, apid: u16, packet: &Packet) -> Result<()> {
    let header = SpacePacketHeader::telemetry(apid, packet.sequence_count, packet.payload.len())?;
    out.extend_from_slice(&header.to_bytes());
    out.extend_from_slice(&packet.payload);
    Ok(())
}

/// Sequential reader over concatenated space packets.
///
/// The spacecraft id is not part of the space packet; it comes from the
/// transfer frames the stream was demultiplexed from and is supplied here.
/// Idle packets are skipped. A truncated final packet ends the stream.
#[derive(Debug)]
pub struct PacketReader {
    data: Vec<u8>,
    position: usize,
    path: PathBuf,
    scid: u16,
    packets_read: usize,
}

impl PacketReader {
    /// Load a packet file into memory.
    pub fn open<P: AsRef<Path>>(path: P, scid: u16) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|e| DecodeError::file_error(path.to_path_buf(), e))?;
        debug!(path = %path.display(), bytes = data.len(), scid, "Opened packet file");
        Ok(Self::with_path(data, path.to_path_buf(), scid))
    }

    /// Read packets from memory.
    pub fn from_bytes(data: Vec<u8>, scid: u16) -> Self {
        Self::with_path(data, PathBuf::from("<memory>"), scid)
    }

    fn with_path(data: Vec<u8>, path: PathBuf, scid: u16) -> Self {
        Self { data, position: 0, path, scid, packets_read: 0 }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn scid(&self) -> u16 {
        self.scid
    }

    pub fn packets_read(&self) -> usize {
        self.packets_read
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    /// Return to the start of the stream.
    pub fn rewind(&mut self) {
        self.position = 0;
        self.packets_read = 0;
    }

    /// Next non-idle packet, or `None` at end of stream.
    pub fn next_packet(&mut self) -> Result<Option<Packet>> {
        loop {
            let Some((header, payload)) = self.read_raw()? else {
                return Ok(None);
            };
            if header.is_idle() {
                trace!(sequence = header.sequence_count, "Skipping idle packet");
                continue;
            }

            self.packets_read += 1;
            return Ok(Some(Packet::new(self.scid, header.sequence_count, payload)));
        }
    }

    fn read_raw(&mut self) -> Result<Option<(SpacePacketHeader, Vec<u8>)>> {
        let rest = &self.data[self.position..];
        if rest.is_empty() {
            return Ok(None);
        }
        if rest.len() < PRIMARY_HEADER_LEN {
            warn!(path = %self.path.display(), trailing = rest.len(), "Ignoring truncated packet header");
            self.position = self.data.len();
            return Ok(None);
        }

        let header = SpacePacketHeader::parse(rest)?;
        let end = PRIMARY_HEADER_LEN + header.payload_len();
        let Some(payload) = rest.get(PRIMARY_HEADER_LEN..end) else {
            warn!(
                path = %self.path.display(),
                expected = header.payload_len(),
                available = rest.len() - PRIMARY_HEADER_LEN,
                "Ignoring truncated packet"
            );
            self.position = self.data.len();
            return Ok(None);
        };

        let payload = payload.to_vec();
        self.position += end;
        Ok(Some((header, payload)))
    }
}

impl Iterator for PacketReader {
    type Item = Result<Packet>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_packet().transpose()
    }
}
