//! Segment reconstruction
//!
//! [`SegmentReconstructor`] is the single owner of everything that belongs to
//! the segment being accumulated: the framebuffers, the spacecraft votes, the
//! last decoded timestamp and the two line counters. Packets are fed in
//! arrival order through [`SegmentReconstructor::process`]; each call
//! completes (including any flush it triggers) before the next packet can be
//! presented, which `&mut self` enforces.
//!
//! ## Per-packet flow
//!
//! 1. Packets from unknown or uncalibrated spacecraft are skipped.
//! 2. The embedded timecode becomes the segment's last timestamp and the
//!    spacecraft gets a vote.
//! 3. `sequence_count % 16` selects the role: standard channel, two-line
//!    high-resolution, or the closing high-resolution line.
//! 4. Chunk 0 runs the boundary check and may flush before its own lines are
//!    written into the fresh segment.
//!
//! ```rust
//! use seviri::{DecoderConfig, MemorySink, Packet, PacketOutcome, ScanGeometry, ScanMode, SegmentReconstructor};
//!
//! let config = DecoderConfig::for_mode(ScanMode::RapidScan);
//! let geometry = ScanGeometry::narrow(ScanMode::RapidScan, 16, 24);
//! let mut decoder = SegmentReconstructor::with_geometry(config, geometry, MemorySink::new())?;
//! let outcome = decoder.process(&Packet::new(999, 0, vec![0; 16]))?;
//! assert!(matches!(outcome, PacketOutcome::Skipped(_)));
//! # Ok::<(), seviri::DecodeError>(())
//! ```

use crate::config::DecoderConfig;
use crate::framebuffer::{Channel, ChannelFramebuffers};
use crate::product::{ImageProduct, ProductSink, product_key};
use crate::repack::repack_bytes_to_10bits;
use crate::timecode::{CdsTimecode, TIMECODE_LEN};
use crate::types::{
    DecoderStats, HRV_PAIR_SUBLINES, Packet, STANDARD_SUBLINES, ScanChunk, ScanGeometry, ScanMode,
    Spacecraft, SpacecraftVotes,
};
use crate::Result;
use chrono::{DateTime, Timelike};
use image::GrayImage;
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

/// Payload bytes ahead of the packed samples.
pub const PAYLOAD_HEADER_LEN: usize = TIMECODE_LEN;

/// Length two-line high-resolution payloads are cut to for downstream framing.
pub const HRV_FRAMING_LEN: usize = 14392 - 6;

/// Chunk-0 packets that must pass after a flush before another can fire.
pub const BOUNDARY_DEBOUNCE: u32 = 500;

/// Why a packet was not placed into the framebuffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    UnknownSpacecraft { scid: u16 },
    /// Known spacecraft without a timecode calibration
    Uncalibrated { spacecraft: Spacecraft },
    /// Payload too short to hold the timecode
    MissingTimecode { len: usize },
}

/// Summary of one flushed segment.
#[derive(Debug, Clone, PartialEq)]
pub struct FlushReport {
    /// Key the product was persisted under
    pub key: String,
    /// Majority-voted spacecraft
    pub source: Option<Spacecraft>,
    /// Capture timestamp of the product
    pub timestamp: f64,
}

/// What `process` did with a packet.
#[derive(Debug, Clone, PartialEq)]
pub enum PacketOutcome {
    Skipped(SkipReason),
    Accepted {
        chunk: ScanChunk,
        /// Line the first sub-line was aimed at
        first_line: i64,
        /// Segment flushed before this packet was written
        flushed: Option<FlushReport>,
        /// Payload length downstream framing should apply, see [`Packet::apply_framing_trim`]
        trimmed_payload_len: Option<usize>,
    },
}

impl PacketOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, PacketOutcome::Accepted { .. })
    }

    pub fn flushed(&self) -> Option<&FlushReport> {
        match self {
            PacketOutcome::Accepted { flushed, .. } => flushed.as_ref(),
            PacketOutcome::Skipped(_) => None,
        }
    }
}

/// Stateful packet-to-framebuffer demultiplexer for one scan mode.
pub struct SegmentReconstructor<S> {
    config: DecoderConfig,
    framebuffers: ChannelFramebuffers,
    sink: S,
    votes: SpacecraftVotes,
    last_timestamp: Option<f64>,
    /// Chunk-0 packets since the last flush
    lines_since_flush: u32,
    /// Line the next two-line high-resolution packet should start at.
    /// Carries over flushes.
    hrv_next_line: i64,
    scratch: Vec<u16>,
    stats: DecoderStats,
    preview: Option<Arc<GrayImage>>,
    unpersisted: Option<ImageProduct>,
}

impl<S> SegmentReconstructor<S> {
    /// Create a reconstructor with native framebuffer sizes for the configured mode.
    pub fn new(config: DecoderConfig, sink: S) -> Result<Self> {
        let geometry = ScanGeometry::for_mode(config.mode);
        Self::with_geometry(config, geometry, sink)
    }

    /// Create a reconstructor with explicit framebuffer dimensions.
    pub fn with_geometry(config: DecoderConfig, geometry: ScanGeometry, sink: S) -> Result<Self> {
        config.validate()?;
        let scratch_len = (geometry.standard_width * STANDARD_SUBLINES)
            .max(geometry.hrv_width * HRV_PAIR_SUBLINES);

        info!(mode = ?config.mode, ?geometry, "Allocating segment framebuffers");

        Ok(Self {
            framebuffers: ChannelFramebuffers::new(geometry)?,
            config,
            sink,
            votes: SpacecraftVotes::new(),
            last_timestamp: None,
            lines_since_flush: 0,
            hrv_next_line: 0,
            scratch: vec![0; scratch_len],
            stats: DecoderStats::default(),
            preview: None,
            unpersisted: None,
        })
    }

    pub fn mode(&self) -> ScanMode {
        self.config.mode
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    pub fn framebuffers(&self) -> &ChannelFramebuffers {
        &self.framebuffers
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    /// Timestamp of the most recently accepted packet in this segment.
    pub fn last_timestamp(&self) -> Option<f64> {
        self.last_timestamp
    }

    /// Spacecraft observed since the last flush.
    pub fn votes(&self) -> &SpacecraftVotes {
        &self.votes
    }

    /// Latest preview image, if previews are enabled and one has been rendered.
    pub fn preview(&self) -> Option<Arc<GrayImage>> {
        self.preview.clone()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Take the last product whose persistence failed, if it was kept.
    pub fn take_unpersisted(&mut self) -> Option<ImageProduct> {
        self.unpersisted.take()
    }
}

impl<S: ProductSink> SegmentReconstructor<S> {
    /// Place one packet into the current segment.
    ///
    /// The only error is a failed flush. In that case the packet has still
    /// been written into the new segment and the framebuffers were cleared.
    pub fn process(&mut self, packet: &Packet) -> Result<PacketOutcome> {
        let Some(spacecraft) = Spacecraft::from_scid(packet.scid) else {
            return Ok(self.skip(SkipReason::UnknownSpacecraft { scid: packet.scid }));
        };
        let Some(calibration) = spacecraft.timecode_calibration() else {
            return Ok(self.skip(SkipReason::Uncalibrated { spacecraft }));
        };
        let Some(timecode) = CdsTimecode::from_payload(&packet.payload) else {
            return Ok(self.skip(SkipReason::MissingTimecode { len: packet.payload.len() }));
        };

        let timestamp = timecode.to_seconds(&calibration);
        self.last_timestamp = Some(timestamp);
        self.votes.record(spacecraft);
        self.stats.packets_accepted += 1;

        let samples = &packet.payload[PAYLOAD_HEADER_LEN..];
        let chunk = ScanChunk::from_sequence(packet.sequence_count);

        let mut flush_result = Ok(None);
        if chunk.starts_cycle() && self.at_boundary(timestamp) {
            flush_result = self.flush().map(Some);
        }

        let first_line = match chunk {
            ScanChunk::Standard { channel } => {
                self.write_standard(chunk, channel, timestamp, samples)
            }
            ScanChunk::HighResPair { .. } => self.write_hrv_pair(chunk, timestamp, samples),
            ScanChunk::HighResSingle => self.write_hrv_single(chunk, timestamp, samples),
        };

        let trimmed_payload_len = match chunk {
            ScanChunk::HighResPair { .. } if self.config.trim_hrv_payload => Some(HRV_FRAMING_LEN),
            _ => None,
        };

        trace!(
            sequence = packet.sequence_count,
            chunk = chunk.index(),
            first_line,
            timestamp,
            "Packet placed"
        );

        Ok(PacketOutcome::Accepted { chunk, first_line, flushed: flush_result?, trimmed_payload_len })
    }

    /// Whether processing `packet` next would flush the current segment.
    ///
    /// Lets callers move the flush, and with it the sink's I/O, somewhere
    /// blocking is allowed.
    pub fn flush_pending(&self, packet: &Packet) -> bool {
        if !ScanChunk::from_sequence(packet.sequence_count).starts_cycle() {
            return false;
        }
        let calibration = Spacecraft::from_scid(packet.scid).and_then(Spacecraft::timecode_calibration);
        let (Some(calibration), Some(timecode)) = (calibration, CdsTimecode::from_payload(&packet.payload))
        else {
            return false;
        };
        self.boundary_due(timecode.to_seconds(&calibration))
    }

    fn skip(&mut self, reason: SkipReason) -> PacketOutcome {
        trace!(?reason, "Skipping packet");
        self.stats.packets_skipped += 1;
        PacketOutcome::Skipped(reason)
    }

    /// Debounced trigger-minute check, run once per chunk-0 packet.
    fn at_boundary(&mut self, timestamp: f64) -> bool {
        let triggered = self.boundary_due(timestamp);
        if triggered {
            debug!(lines = self.lines_since_flush, timestamp, "Segment boundary reached");
        }
        self.lines_since_flush = self.lines_since_flush.saturating_add(1);
        triggered
    }

    fn boundary_due(&self, timestamp: f64) -> bool {
        self.lines_since_flush > BOUNDARY_DEBOUNCE
            && minute_of_hour(timestamp).is_some_and(|m| self.config.mode.is_trigger_minute(m))
    }

    fn write_standard(&mut self, chunk: ScanChunk, channel: u8, timestamp: f64, samples: &[u8]) -> i64 {
        let first_line = self.config.mode.standard_line(timestamp);
        let target = Channel::Standard(channel);
        let width = self.framebuffers.line_width(target);
        let unpacked = repack_bytes_to_10bits(samples, &mut self.scratch);

        let mut line = first_line;
        for c in 0..STANDARD_SUBLINES {
            let subline = if chunk.is_focal_plane_swapped() { STANDARD_SUBLINES - 1 - c } else { c };
            let row = sub_line(&self.scratch[..unpacked], subline, width);
            if !self.framebuffers.write_line(target, line, row) {
                self.stats.dropped_lines += 1;
            }
            line += 1;
        }

        self.maybe_refresh_preview(line);
        first_line
    }

    fn write_hrv_pair(&mut self, chunk: ScanChunk, timestamp: f64, samples: &[u8]) -> i64 {
        let first_line = self.config.mode.hrv_line(timestamp) + chunk.hrv_line_offset();
        if first_line != self.hrv_next_line {
            trace!(delta = first_line - self.hrv_next_line, line = first_line, "bogus line");
            self.stats.hrv_discontinuities += 1;
        }

        let width = self.framebuffers.line_width(Channel::HighRes);
        let unpacked = repack_bytes_to_10bits(samples, &mut self.scratch);

        let mut line = first_line;
        for c in 0..HRV_PAIR_SUBLINES {
            let row = sub_line(&self.scratch[..unpacked], c, width);
            if !self.framebuffers.write_line(Channel::HighRes, line, row) {
                self.stats.dropped_lines += 1;
            }
            line += 1;
        }

        self.hrv_next_line = line;
        first_line
    }

    fn write_hrv_single(&mut self, chunk: ScanChunk, timestamp: f64, samples: &[u8]) -> i64 {
        let line = self.config.mode.hrv_line(timestamp) + chunk.hrv_line_offset();
        let width = self.framebuffers.line_width(Channel::HighRes);
        let unpacked = repack_bytes_to_10bits(samples, &mut self.scratch);

        let row = sub_line(&self.scratch[..unpacked], 0, width);
        if !self.framebuffers.write_line(Channel::HighRes, line, row) {
            self.stats.dropped_lines += 1;
        }

        self.hrv_next_line = line + 1;
        line
    }

    fn maybe_refresh_preview(&mut self, line: i64) {
        let Some(preview) = self.config.preview else {
            return;
        };
        if line.rem_euclid(preview.every_lines as i64) != 0 {
            return;
        }
        let Some(source) = self.framebuffers.get(Channel::Standard(preview.channel)) else {
            return;
        };

        match source.preview(preview.width, preview.height) {
            Ok(image) => {
                debug!(line, channel = preview.channel, "Preview refreshed");
                self.preview = Some(Arc::new(image));
            }
            Err(e) => warn!(error = %e, "Preview refresh failed"),
        }
    }

    /// Emit the current segment and start a new one.
    ///
    /// The product holds mirrored copies of every framebuffer. Framebuffers,
    /// votes and the boundary counter are reset before the sink is called, so
    /// a sink failure never leaves a half-cleared segment behind. The
    /// high-resolution continuity counter is left alone: lines keep running
    /// across a flush. When
    /// `preserve_on_persist_failure` is set the failed product stays
    /// available through [`take_unpersisted`](Self::take_unpersisted).
    pub fn flush(&mut self) -> Result<FlushReport> {
        let source = self.votes.winner();
        let timestamp = self.last_timestamp.unwrap_or(0.0);
        let product = ImageProduct::from_channels(
            source.map(Spacecraft::product_source),
            timestamp,
            self.framebuffers.mirrored_snapshot(),
            &self.config.channel_offsets,
        );
        self.reset_segment();

        let key = product_key(timestamp);
        match self.sink.persist(&key, &product) {
            Ok(()) => {
                self.stats.segments_flushed += 1;
                info!(key = %key, source = ?source, "Segment flushed");
                Ok(FlushReport { key, source, timestamp })
            }
            Err(e) => {
                error!(key = %key, error = %e, "Failed to persist segment");
                if self.config.preserve_on_persist_failure {
                    self.unpersisted = Some(product);
                }
                Err(e)
            }
        }
    }

    fn reset_segment(&mut self) {
        self.framebuffers.clear();
        self.votes.clear();
        self.lines_since_flush = 0;
    }
}

impl<S> std::fmt::Debug for SegmentReconstructor<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentReconstructor")
            .field("mode", &self.config.mode)
            .field("geometry", &self.framebuffers.geometry())
            .field("last_timestamp", &self.last_timestamp)
            .field("lines_since_flush", &self.lines_since_flush)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

/// Samples of sub-line `index`, clipped to what was unpacked.
fn sub_line(samples: &[u16], index: usize, width: usize) -> &[u16] {
    let start = (index * width).min(samples.len());
    let end = (start + width).min(samples.len());
    &samples[start..end]
}

/// UTC minute-of-hour of a Unix timestamp.
fn minute_of_hour(timestamp: f64) -> Option<u32> {
    DateTime::from_timestamp(timestamp.floor() as i64, 0).map(|time| time.minute())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PreviewConfig;
    use crate::product::MemorySink;
    use crate::test_utils::{
        FailingSink, SEGMENT_START, ScanSimulator, cycle_timestamp,
    };
    use anyhow::Result;

    const STD_WIDTH: usize = 4;
    const HRV_WIDTH: usize = 6;

    fn decoder(mode: ScanMode) -> SegmentReconstructor<MemorySink> {
        decoder_with(DecoderConfig::for_mode(mode), MemorySink::new())
    }

    fn decoder_with<S: ProductSink>(config: DecoderConfig, sink: S) -> SegmentReconstructor<S> {
        let geometry = ScanGeometry::narrow(config.mode, STD_WIDTH, HRV_WIDTH);
        SegmentReconstructor::with_geometry(config, geometry, sink).unwrap()
    }

    fn simulator(mode: ScanMode) -> ScanSimulator {
        ScanSimulator::new(ScanGeometry::narrow(mode, STD_WIDTH, HRV_WIDTH), Spacecraft::Msg3).unwrap()
    }

    fn row(decoder: &SegmentReconstructor<MemorySink>, channel: Channel, line: usize) -> Vec<u16> {
        decoder.framebuffers().get(channel).unwrap().row(line).unwrap().to_vec()
    }

    /// Sub-line `n` of a standard packet carries `100 * (n + 1) + column`.
    fn tagged(subline: usize, column: usize) -> u16 {
        (100 * (subline + 1) + column) as u16
    }

    fn shifted(values: impl IntoIterator<Item = u16>) -> Vec<u16> {
        values.into_iter().map(|v| v << 6).collect()
    }

    #[test]
    fn unknown_and_uncalibrated_spacecraft_are_skipped() -> Result<()> {
        let mut decoder = decoder(ScanMode::RapidScan);

        let unknown = decoder.process(&Packet::new(42, 0, vec![0; 32]))?;
        assert_eq!(unknown, PacketOutcome::Skipped(SkipReason::UnknownSpacecraft { scid: 42 }));

        let msg1 = decoder.process(&Packet::new(321, 0, vec![0; 32]))?;
        assert_eq!(
            msg1,
            PacketOutcome::Skipped(SkipReason::Uncalibrated { spacecraft: Spacecraft::Msg1 })
        );

        let short = decoder.process(&Packet::new(323, 0, vec![0; 5]))?;
        assert_eq!(short, PacketOutcome::Skipped(SkipReason::MissingTimecode { len: 5 }));

        assert_eq!(decoder.stats().packets_skipped, 3);
        assert_eq!(decoder.stats().packets_accepted, 0);
        assert!(decoder.votes().is_empty());
        assert!(decoder.last_timestamp().is_none());
        Ok(())
    }

    #[test]
    fn accepted_packet_records_timestamp_and_vote() -> Result<()> {
        let mut decoder = decoder(ScanMode::RapidScan);
        let mut sim = simulator(ScanMode::RapidScan);
        let ts = cycle_timestamp(SEGMENT_START, 10);

        let outcome = decoder.process(&sim.pattern_packet(ScanChunk::from_index(1), ts))?;
        assert!(outcome.is_accepted());
        assert_eq!(decoder.votes().count(Spacecraft::Msg3), 1);
        assert_eq!(decoder.votes().total(), 1);
        assert!((decoder.last_timestamp().unwrap() - ts).abs() < 1e-3);
        Ok(())
    }

    #[test]
    fn standard_sublines_are_written_in_payload_order() -> Result<()> {
        let mut decoder = decoder(ScanMode::RapidScan);
        let mut sim = simulator(ScanMode::RapidScan);
        let ts = cycle_timestamp(SEGMENT_START, 7);

        let packet = sim.packet(ScanChunk::Standard { channel: 1 }, ts, tagged);
        let outcome = decoder.process(&packet)?;
        assert!(matches!(outcome, PacketOutcome::Accepted { first_line: 21, .. }));

        for n in 0..3 {
            let expected = shifted((0..STD_WIDTH).map(|col| tagged(n, col)));
            assert_eq!(row(&decoder, Channel::Standard(1), 21 + n), expected);
        }
        Ok(())
    }

    #[test]
    fn swapped_channels_reverse_sublines() -> Result<()> {
        for index in [3u8, 4, 8, 9, 10] {
            let mut decoder = decoder(ScanMode::RapidScan);
            let mut sim = simulator(ScanMode::RapidScan);
            let ts = cycle_timestamp(SEGMENT_START, 2);

            decoder.process(&sim.packet(ScanChunk::from_index(index), ts, tagged))?;
            for n in 0..3 {
                let expected = shifted((0..STD_WIDTH).map(|col| tagged(2 - n, col)));
                assert_eq!(row(&decoder, Channel::Standard(index), 6 + n), expected, "chunk {index}");
            }
        }
        Ok(())
    }

    #[test]
    fn hrv_pairs_and_single_tile_the_group() -> Result<()> {
        let mut decoder = decoder(ScanMode::FullDisk);
        let mut sim = simulator(ScanMode::FullDisk);
        let ts = cycle_timestamp(SEGMENT_START, 4);

        let mut first_lines = Vec::new();
        for index in 11u8..16 {
            let chunk = ScanChunk::from_index(index);
            let packet = sim.packet(chunk, ts, |subline, column| (index as usize * 10 + subline * 5 + column) as u16);
            if let PacketOutcome::Accepted { first_line, .. } = decoder.process(&packet)? {
                first_lines.push(first_line);
            }
        }
        assert_eq!(first_lines, vec![36, 38, 40, 42, 44]);

        // Chunk 12 second sub-line lands on line 39
        let expected = shifted((0..HRV_WIDTH).map(|col| (120 + 5 + col) as u16));
        assert_eq!(row(&decoder, Channel::HighRes, 39), expected);
        // Chunk 15 closes the group on line 44
        let expected = shifted((0..HRV_WIDTH).map(|col| (150 + col) as u16));
        assert_eq!(row(&decoder, Channel::HighRes, 44), expected);
        Ok(())
    }

    #[test]
    fn hrv_pair_reports_framing_trim() -> Result<()> {
        let mut decoder = decoder(ScanMode::RapidScan);
        let mut sim = simulator(ScanMode::RapidScan);
        let ts = cycle_timestamp(SEGMENT_START, 1);

        let pair = decoder.process(&sim.pattern_packet(ScanChunk::HighResPair { group: 0 }, ts))?;
        assert!(matches!(
            pair,
            PacketOutcome::Accepted { trimmed_payload_len: Some(HRV_FRAMING_LEN), .. }
        ));

        let single = decoder.process(&sim.pattern_packet(ScanChunk::HighResSingle, ts))?;
        assert!(matches!(single, PacketOutcome::Accepted { trimmed_payload_len: None, .. }));

        let mut config = DecoderConfig::for_mode(ScanMode::RapidScan);
        config.trim_hrv_payload = false;
        let mut untrimmed = decoder_with(config, MemorySink::new());
        let pair = untrimmed.process(&sim.pattern_packet(ScanChunk::HighResPair { group: 0 }, ts))?;
        assert!(matches!(pair, PacketOutcome::Accepted { trimmed_payload_len: None, .. }));
        Ok(())
    }

    #[test]
    fn hrv_discontinuity_is_counted_not_fatal() -> Result<()> {
        let mut decoder = decoder(ScanMode::FullDisk);
        let mut sim = simulator(ScanMode::FullDisk);

        // A continuous first cycle starting at line 0
        for packet in sim.cycle(cycle_timestamp(SEGMENT_START, 0)) {
            decoder.process(&packet)?;
        }
        assert_eq!(decoder.stats().hrv_discontinuities, 0);

        // Next cycle continues at line 9
        for packet in sim.cycle(cycle_timestamp(SEGMENT_START, 1)) {
            decoder.process(&packet)?;
        }
        assert_eq!(decoder.stats().hrv_discontinuities, 0);

        // Skipping a cycle breaks continuity once
        for packet in sim.cycle(cycle_timestamp(SEGMENT_START, 3)) {
            decoder.process(&packet)?;
        }
        assert_eq!(decoder.stats().hrv_discontinuities, 1);
        assert_eq!(decoder.stats().segments_flushed, 0);
        Ok(())
    }

    #[test]
    fn lines_beyond_framebuffer_are_dropped() -> Result<()> {
        let mut decoder = decoder(ScanMode::RapidScan);
        let mut sim = simulator(ScanMode::RapidScan);
        // Last standard slot of the rapid-scan period: lines 1493, 1494, 1495
        let ts = SEGMENT_START + 1493.5 * crate::types::STANDARD_LINE_DURATION;

        decoder.process(&sim.pattern_packet(ScanChunk::from_index(2), ts))?;
        assert_eq!(decoder.stats().dropped_lines, 2);
        assert_ne!(row(&decoder, Channel::Standard(2), 1493), vec![0; STD_WIDTH]);
        Ok(())
    }

    #[test]
    fn short_payload_writes_leading_columns() -> Result<()> {
        let mut decoder = decoder(ScanMode::RapidScan);
        let mut sim = simulator(ScanMode::RapidScan);
        let ts = cycle_timestamp(SEGMENT_START, 0);
        let mut packet = sim.packet(ScanChunk::from_index(0), ts, tagged);
        // Timecode plus 5 bytes: four 10-bit samples of the first sub-line
        packet.payload.truncate(PAYLOAD_HEADER_LEN + 5);

        decoder.process(&packet)?;
        assert_eq!(row(&decoder, Channel::Standard(0), 0), shifted([100, 101, 102, 103]));
        assert_eq!(row(&decoder, Channel::Standard(0), 1), vec![0; STD_WIDTH]);
        Ok(())
    }

    fn chunk0_at(sim: &mut ScanSimulator, ts: f64) -> Packet {
        sim.pattern_packet(ScanChunk::Standard { channel: 0 }, ts)
    }

    #[test]
    fn boundary_is_debounced() -> Result<()> {
        let mut decoder = decoder(ScanMode::RapidScan);
        let mut sim = simulator(ScanMode::RapidScan);
        let quiet = SEGMENT_START + 90.0; // minute 1 is never a trigger

        for _ in 0..600 {
            let outcome = decoder.process(&chunk0_at(&mut sim, quiet))?;
            assert!(outcome.flushed().is_none());
        }

        let trigger = SEGMENT_START + 300.5; // minute 5
        let outcome = decoder.process(&chunk0_at(&mut sim, trigger))?;
        assert!(outcome.flushed().is_some());

        // 501 more packets inside the trigger minute do not flush again
        for _ in 0..501 {
            let outcome = decoder.process(&chunk0_at(&mut sim, trigger + 1.0))?;
            assert!(outcome.flushed().is_none());
        }
        // The next one is past the debounce
        let outcome = decoder.process(&chunk0_at(&mut sim, trigger + 2.0))?;
        assert!(outcome.flushed().is_some());
        assert_eq!(decoder.stats().segments_flushed, 2);
        Ok(())
    }

    #[test]
    fn flush_pending_predicts_the_next_flush() -> Result<()> {
        let mut decoder = decoder(ScanMode::RapidScan);
        let mut sim = simulator(ScanMode::RapidScan);
        let trigger = SEGMENT_START + 300.5;

        for _ in 0..501 {
            decoder.process(&chunk0_at(&mut sim, SEGMENT_START + 90.0))?;
        }
        assert!(!decoder.flush_pending(&chunk0_at(&mut sim, SEGMENT_START + 90.0)));
        assert!(!decoder.flush_pending(&sim.pattern_packet(ScanChunk::from_index(1), trigger)));
        assert!(!decoder.flush_pending(&Packet::new(321, 0, vec![0; 32])));

        let packet = chunk0_at(&mut sim, trigger);
        assert!(decoder.flush_pending(&packet));
        // Asking does not move the debounce counter
        assert!(decoder.flush_pending(&packet));
        assert!(decoder.process(&packet)?.flushed().is_some());
        assert!(!decoder.flush_pending(&chunk0_at(&mut sim, trigger)));
        Ok(())
    }

    #[test]
    fn hrv_continuity_survives_a_flush() -> Result<()> {
        let mut decoder = decoder(ScanMode::FullDisk);
        let mut sim = simulator(ScanMode::FullDisk);

        for k in 0..3 {
            for packet in sim.cycle(cycle_timestamp(SEGMENT_START, k)) {
                decoder.process(&packet)?;
            }
            if k == 1 {
                decoder.flush()?;
            }
        }
        assert_eq!(decoder.stats().segments_flushed, 1);
        assert_eq!(decoder.stats().hrv_discontinuities, 0);
        Ok(())
    }

    #[test]
    fn only_chunk_zero_drives_the_boundary() -> Result<()> {
        let mut decoder = decoder(ScanMode::FullDisk);
        let mut sim = simulator(ScanMode::FullDisk);
        for _ in 0..1000 {
            let packet = sim.pattern_packet(ScanChunk::Standard { channel: 5 }, SEGMENT_START + 900.0);
            assert!(decoder.process(&packet)?.flushed().is_none());
        }
        Ok(())
    }

    #[test]
    fn full_disk_ignores_rapid_scan_minutes() -> Result<()> {
        let mut decoder = decoder(ScanMode::FullDisk);
        let mut sim = simulator(ScanMode::FullDisk);
        for _ in 0..502 {
            decoder.process(&chunk0_at(&mut sim, SEGMENT_START + 300.5))?;
        }
        assert_eq!(decoder.stats().segments_flushed, 0);

        decoder.process(&chunk0_at(&mut sim, SEGMENT_START + 900.5))?;
        assert_eq!(decoder.stats().segments_flushed, 1);
        Ok(())
    }

    #[test]
    fn flush_emits_mirrored_product_and_clears_state() -> Result<()> {
        let mut decoder = decoder(ScanMode::RapidScan);
        let mut sim = simulator(ScanMode::RapidScan);
        let ts = cycle_timestamp(SEGMENT_START, 0);
        decoder.process(&sim.packet(ScanChunk::from_index(0), ts, tagged))?;

        let report = decoder.flush()?;
        assert_eq!(report.key, "2024-01-01_00-00-00");
        assert_eq!(report.source, Some(Spacecraft::Msg3));

        let (key, product) = &decoder.sink().products()[0];
        assert_eq!(key, &report.key);
        assert_eq!(product.source.as_deref(), Some("MSG-3"));
        assert_eq!(product.images.len(), 12);

        // Line 0 moves to the last line, columns reversed
        let raster = &product.images[0].raster;
        let last = raster.row(raster.height() - 1).unwrap();
        assert_eq!(last.to_vec(), shifted([103, 102, 101, 100]));

        for channel in (0..11).map(Channel::Standard).chain([Channel::HighRes]) {
            let buffer = decoder.framebuffers().get(channel).unwrap();
            assert!(buffer.as_slice().iter().all(|s| *s == 0));
        }
        assert!(decoder.votes().is_empty());
        Ok(())
    }

    #[test]
    fn majority_vote_picks_declared_source() -> Result<()> {
        let mut decoder = decoder(ScanMode::RapidScan);
        let geometry = ScanGeometry::narrow(ScanMode::RapidScan, STD_WIDTH, HRV_WIDTH);
        let mut msg3 = ScanSimulator::new(geometry, Spacecraft::Msg3).unwrap();
        let mut msg4 = ScanSimulator::new(geometry, Spacecraft::Msg4).unwrap();
        let ts = cycle_timestamp(SEGMENT_START, 0);

        decoder.process(&msg3.pattern_packet(ScanChunk::from_index(1), ts))?;
        decoder.process(&msg3.pattern_packet(ScanChunk::from_index(2), ts))?;
        decoder.process(&msg4.pattern_packet(ScanChunk::from_index(3), ts))?;
        decoder.process(&msg3.pattern_packet(ScanChunk::from_index(4), ts))?;

        let report = decoder.flush()?;
        assert_eq!(report.source, Some(Spacecraft::Msg3));
        Ok(())
    }

    #[test]
    fn persistence_failure_keeps_product_and_propagates() -> Result<()> {
        let mut decoder = decoder_with(DecoderConfig::for_mode(ScanMode::RapidScan), FailingSink::new(1));
        let mut sim = simulator(ScanMode::RapidScan);
        decoder.process(&sim.pattern_packet(ScanChunk::from_index(0), cycle_timestamp(SEGMENT_START, 0)))?;

        let err = decoder.flush().unwrap_err();
        assert!(matches!(err, crate::DecodeError::Persistence { .. }));
        assert_eq!(decoder.stats().segments_flushed, 0);

        // Framebuffers are clear even though the product was not persisted
        let buffer = decoder.framebuffers().get(Channel::Standard(0)).unwrap();
        assert!(buffer.as_slice().iter().all(|s| *s == 0));

        let kept = decoder.take_unpersisted().expect("product should be preserved");
        assert_eq!(kept.source.as_deref(), Some("MSG-3"));
        assert!(decoder.take_unpersisted().is_none());

        // Retry through the sink succeeds
        decoder.sink_mut().persist(&kept.key(), &kept)?;
        assert_eq!(decoder.sink().inner.len(), 1);
        Ok(())
    }

    #[test]
    fn failed_flush_during_process_still_writes_packet() -> Result<()> {
        let mut config = DecoderConfig::for_mode(ScanMode::RapidScan);
        config.preserve_on_persist_failure = false;
        let mut decoder = decoder_with(config, FailingSink::new(1));
        let mut sim = simulator(ScanMode::RapidScan);

        for _ in 0..501 {
            decoder.process(&chunk0_at(&mut sim, SEGMENT_START + 90.0))?;
        }
        let trigger = chunk0_at(&mut sim, SEGMENT_START + 300.5);
        assert!(decoder.process(&trigger).is_err());
        assert!(decoder.take_unpersisted().is_none());

        // Line 0 of the new segment holds the triggering packet; its vote
        // went to the segment it closed.
        let raster = decoder.framebuffers().get(Channel::Standard(0)).unwrap();
        assert!(raster.row(0).unwrap().iter().all(|s| *s != 0));
        assert!(decoder.votes().is_empty());
        Ok(())
    }

    #[test]
    fn preview_tracks_configured_channel() -> Result<()> {
        let mut config = DecoderConfig::for_mode(ScanMode::RapidScan);
        config.preview = Some(PreviewConfig { channel: 3, width: 2, height: 3, every_lines: 6 });
        let mut decoder = decoder_with(config, MemorySink::new());
        let mut sim = simulator(ScanMode::RapidScan);

        // Cycle 0 ends on line 3: no refresh
        decoder.process(&sim.pattern_packet(ScanChunk::from_index(3), cycle_timestamp(SEGMENT_START, 0)))?;
        assert!(decoder.preview().is_none());

        // Cycle 1 ends on line 6
        decoder.process(&sim.pattern_packet(ScanChunk::from_index(3), cycle_timestamp(SEGMENT_START, 1)))?;
        let preview = decoder.preview().expect("preview after line 6");
        assert_eq!(preview.dimensions(), (2, 3));
        Ok(())
    }

    #[test]
    fn minute_of_hour_is_utc() {
        assert_eq!(minute_of_hour(SEGMENT_START), Some(0));
        assert_eq!(minute_of_hour(SEGMENT_START + 899.9), Some(14));
        assert_eq!(minute_of_hour(SEGMENT_START + 900.0), Some(15));
    }
}
