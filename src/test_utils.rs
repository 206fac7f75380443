//! Synthetic packet streams for tests and benchmarks
//!
//! [`ScanSimulator`] builds packets the way the downlink lays them out:
//! a timecode stamped with a spacecraft's calibration, then 10-bit samples
//! for every sub-line the chunk carries, with sequence counters that land on
//! the requested chunk role.

#![cfg(any(test, feature = "benchmark"))]

use crate::product::{ImageProduct, MemorySink, ProductSink};
use crate::repack::{SampleWidth, pack_samples};
use crate::timecode::{CdsTimecode, TIMECODE_LEN, TimecodeCalibration};
use crate::types::{CHUNKS_PER_CYCLE, Packet, STANDARD_LINE_DURATION, ScanChunk, ScanGeometry, Spacecraft};
use crate::{DecodeError, Result};

/// 2024-01-01T00:00:00Z, aligned to every segment period and trigger minute.
pub const SEGMENT_START: f64 = 1_704_067_200.0;

/// Sequence counters wrap at 14 bits.
const SEQUENCE_MODULUS: u16 = 1 << 14;

/// Timestamp of scan cycle `cycle` after `start`.
///
/// Lands a sixth of a line slot into standard line `3 * cycle` and half a
/// slot into high-resolution line `9 * cycle`, clear of rounding at either
/// resolution.
pub fn cycle_timestamp(start: f64, cycle: usize) -> f64 {
    start + (3.0 * cycle as f64 + 1.0 / 6.0) * STANDARD_LINE_DURATION
}

/// Deterministic non-zero 10-bit test pattern.
pub fn pattern_sample(chunk: ScanChunk, subline: usize, column: usize) -> u16 {
    1 + ((chunk.index() as usize * 97 + subline * 31 + column * 7) % 1022) as u16
}

/// Builds packets for one spacecraft and geometry.
#[derive(Debug, Clone)]
pub struct ScanSimulator {
    geometry: ScanGeometry,
    spacecraft: Spacecraft,
    calibration: TimecodeCalibration,
    sequence: u16,
}

impl ScanSimulator {
    /// Returns `None` for a spacecraft without timecode calibration.
    pub fn new(geometry: ScanGeometry, spacecraft: Spacecraft) -> Option<Self> {
        let calibration = spacecraft.timecode_calibration()?;
        Some(Self { geometry, spacecraft, calibration, sequence: 0 })
    }

    pub fn geometry(&self) -> ScanGeometry {
        self.geometry
    }

    /// Raw timecode bytes for `timestamp`. Instants before the spacecraft
    /// epoch encode as zero.
    pub fn timecode(&self, timestamp: f64) -> [u8; TIMECODE_LEN] {
        CdsTimecode::from_seconds(timestamp, &self.calibration)
            .map(CdsTimecode::to_bytes)
            .unwrap_or([0; TIMECODE_LEN])
    }

    /// Samples per sub-line for a chunk role.
    pub fn line_width(&self, chunk: ScanChunk) -> usize {
        match chunk {
            ScanChunk::Standard { .. } => self.geometry.standard_width,
            _ => self.geometry.hrv_width,
        }
    }

    /// Next sequence counter congruent to the chunk role.
    fn next_sequence(&mut self, chunk: ScanChunk) -> u16 {
        let index = chunk.index() as u16;
        let offset = (index + CHUNKS_PER_CYCLE - self.sequence % CHUNKS_PER_CYCLE) % CHUNKS_PER_CYCLE;
        let sequence = (self.sequence + offset) % SEQUENCE_MODULUS;
        self.sequence = (sequence + 1) % SEQUENCE_MODULUS;
        sequence
    }

    /// One packet with `sample(subline, column)` for every sub-line in payload order.
    pub fn packet<F>(&mut self, chunk: ScanChunk, timestamp: f64, sample: F) -> Packet
    where
        F: Fn(usize, usize) -> u16,
    {
        let width = self.line_width(chunk);
        let samples: Vec<u16> = (0..chunk.sublines())
            .flat_map(|subline| (0..width).map(move |column| (subline, column)))
            .map(|(subline, column)| sample(subline, column))
            .collect();

        let mut payload = self.timecode(timestamp).to_vec();
        payload.extend(pack_samples(&samples, SampleWidth::Bits10));

        Packet::new(self.spacecraft.scid(), self.next_sequence(chunk), payload)
    }

    /// One packet filled with [`pattern_sample`].
    pub fn pattern_packet(&mut self, chunk: ScanChunk, timestamp: f64) -> Packet {
        self.packet(chunk, timestamp, |subline, column| pattern_sample(chunk, subline, column))
    }

    /// All 16 chunk roles of one cycle at the same timestamp.
    pub fn cycle(&mut self, timestamp: f64) -> Vec<Packet> {
        (0..CHUNKS_PER_CYCLE as u8)
            .map(|index| self.pattern_packet(ScanChunk::from_index(index), timestamp))
            .collect()
    }
}

/// Sink that fails a set number of times before storing in memory.
#[derive(Debug, Default)]
pub struct FailingSink {
    pub failures_remaining: usize,
    pub attempts: usize,
    pub inner: MemorySink,
}

impl FailingSink {
    pub fn new(failures: usize) -> Self {
        Self { failures_remaining: failures, ..Self::default() }
    }
}

impl ProductSink for FailingSink {
    fn persist(&mut self, key: &str, product: &ImageProduct) -> Result<()> {
        self.attempts += 1;
        if self.failures_remaining > 0 {
            self.failures_remaining -= 1;
            return Err(DecodeError::persistence_error(
                key,
                std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only archive"),
            ));
        }
        self.inner.persist(key, product)
    }
}

/// Install a test-friendly tracing subscriber driven by `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
