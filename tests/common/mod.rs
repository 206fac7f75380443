//! Synthetic downlink shared by the integration tests

#![allow(dead_code)]

use seviri::repack::pack_samples;
use seviri::{CdsTimecode, Packet, SampleWidth, ScanChunk, ScanGeometry, ScanMode, Spacecraft};
use seviri::STANDARD_LINE_DURATION;

/// 2024-01-01T00:00:00Z
pub const START: f64 = 1_704_067_200.0;

pub const STD_WIDTH: usize = 4;
pub const HRV_WIDTH: usize = 6;

pub fn geometry(mode: ScanMode) -> ScanGeometry {
    ScanGeometry::narrow(mode, STD_WIDTH, HRV_WIDTH)
}

/// Timestamp of cycle `k`: standard line `3k`, high-resolution line `9k`.
pub fn cycle_timestamp(k: usize) -> f64 {
    START + (3.0 * k as f64 + 1.0 / 6.0) * STANDARD_LINE_DURATION
}

/// Non-zero 10-bit sample value.
pub fn sample(chunk: u8, subline: usize, column: usize) -> u16 {
    1 + ((chunk as usize * 53 + subline * 17 + column * 3) % 1000) as u16
}

/// Packet for the role `sequence % 16` stamped at `timestamp`.
pub fn packet(spacecraft: Spacecraft, sequence: u16, timestamp: f64) -> Packet {
    let chunk = ScanChunk::from_sequence(sequence);
    let width = match chunk {
        ScanChunk::Standard { .. } => STD_WIDTH,
        _ => HRV_WIDTH,
    };
    let samples: Vec<u16> = (0..chunk.sublines())
        .flat_map(|subline| (0..width).map(move |column| sample(chunk.index(), subline, column)))
        .collect();

    let calibration = spacecraft.timecode_calibration().expect("calibrated spacecraft");
    let timecode = CdsTimecode::from_seconds(timestamp, &calibration).expect("after spacecraft epoch");

    let mut payload = timecode.to_bytes().to_vec();
    payload.extend(pack_samples(&samples, SampleWidth::Bits10));
    Packet::new(spacecraft.scid(), sequence, payload)
}

/// All 16 packets of cycle `k`, sequence counters wrapping at 14 bits.
pub fn cycle(spacecraft: Spacecraft, k: usize) -> Vec<Packet> {
    let timestamp = cycle_timestamp(k);
    (0..16)
        .map(|index| packet(spacecraft, ((k * 16 + index) % 16384) as u16, timestamp))
        .collect()
}
