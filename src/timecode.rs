//! Embedded packet timecode
//!
//! Every imager packet opens with an 8-byte timecode:
//!
//! | Bytes | Field |
//! |-------|-------|
//! | 0-1   | day count (big-endian u16) |
//! | 2-5   | millisecond-of-day count (big-endian u32) |
//! | 6-7   | sub-millisecond count (big-endian u16) |
//!
//! The counts are scaled by a per-spacecraft [`TimecodeCalibration`] into
//! Unix-epoch seconds. Decoding never fails: garbage bytes produce a
//! well-defined but meaningless timestamp.

use serde::{Deserialize, Serialize};

/// Length of the embedded timecode in bytes.
pub const TIMECODE_LEN: usize = 8;

/// Seconds represented by one unit of the day count.
pub const DAY_COUNT_SECONDS: f64 = 18.204444444 * 3600.0;

const SECONDS_PER_CALENDAR_DAY: f64 = 86400.0;

/// Per-spacecraft scaling of the raw timecode fields.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimecodeCalibration {
    /// Whole calendar days between the Unix epoch and the spacecraft epoch
    pub offset_days: i32,
    /// Divisor turning the millisecond-of-day count into seconds
    pub ms_divisor: f64,
    /// Divisor turning the sub-millisecond count into seconds
    pub sub_ms_divisor: f64,
    /// Fitted residual added after scaling, in seconds
    pub epoch_adjust_seconds: f64,
}

impl TimecodeCalibration {
    /// Calibration shape shared by every Meteosat spacecraft.
    ///
    /// The sub-millisecond divisor is large enough to make that field
    /// irrelevant.
    pub const fn meteosat(offset_days: i32, epoch_adjust_seconds: f64) -> Self {
        Self { offset_days, ms_divisor: 65536.0, sub_ms_divisor: 1e100, epoch_adjust_seconds }
    }

    fn base_seconds(&self) -> f64 {
        self.offset_days as f64 * SECONDS_PER_CALENDAR_DAY + self.epoch_adjust_seconds
    }
}

/// Raw fields of an embedded timecode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CdsTimecode {
    pub days: u16,
    pub ms_of_day: u32,
    pub sub_ms: u16,
}

impl CdsTimecode {
    /// Split 8 raw bytes into their fields.
    pub fn from_bytes(bytes: &[u8; TIMECODE_LEN]) -> Self {
        Self {
            days: u16::from_be_bytes([bytes[0], bytes[1]]),
            ms_of_day: u32::from_be_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]),
            sub_ms: u16::from_be_bytes([bytes[6], bytes[7]]),
        }
    }

    /// Read the timecode from the start of a payload.
    ///
    /// Returns `None` when the payload is shorter than the timecode.
    pub fn from_payload(payload: &[u8]) -> Option<Self> {
        let bytes: &[u8; TIMECODE_LEN] = payload.get(..TIMECODE_LEN)?.try_into().ok()?;
        Some(Self::from_bytes(bytes))
    }

    pub fn to_bytes(self) -> [u8; TIMECODE_LEN] {
        let mut bytes = [0u8; TIMECODE_LEN];
        bytes[0..2].copy_from_slice(&self.days.to_be_bytes());
        bytes[2..6].copy_from_slice(&self.ms_of_day.to_be_bytes());
        bytes[6..8].copy_from_slice(&self.sub_ms.to_be_bytes());
        bytes
    }

    /// Scale the raw fields into Unix-epoch seconds.
    pub fn to_seconds(self, calibration: &TimecodeCalibration) -> f64 {
        calibration.offset_days as f64 * SECONDS_PER_CALENDAR_DAY
            + self.days as f64 * DAY_COUNT_SECONDS
            + self.ms_of_day as f64 / calibration.ms_divisor
            + self.sub_ms as f64 / calibration.sub_ms_divisor
            + calibration.epoch_adjust_seconds
    }

    /// Build the timecode a spacecraft would stamp at `seconds`.
    ///
    /// Resolution is one unit of the millisecond field. Returns `None` for
    /// instants before the spacecraft epoch or past the day-count range.
    pub fn from_seconds(seconds: f64, calibration: &TimecodeCalibration) -> Option<Self> {
        let since_epoch = seconds - calibration.base_seconds();
        if !since_epoch.is_finite() || since_epoch < 0.0 {
            return None;
        }

        let days = (since_epoch / DAY_COUNT_SECONDS).floor();
        if days > u16::MAX as f64 {
            return None;
        }
        let remainder = (since_epoch - days * DAY_COUNT_SECONDS).max(0.0);
        let ms_of_day = (remainder * calibration.ms_divisor).round().min(u32::MAX as f64) as u32;

        Some(Self { days: days as u16, ms_of_day, sub_ms: 0 })
    }
}

/// Decode an embedded timecode into Unix-epoch seconds.
pub fn decode_timecode(bytes: &[u8; TIMECODE_LEN], calibration: &TimecodeCalibration) -> f64 {
    CdsTimecode::from_bytes(bytes).to_seconds(calibration)
}
