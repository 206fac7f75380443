//! Operating mode and framebuffer geometry

use serde::{Deserialize, Serialize};

/// Columns in every standard-resolution line.
pub const STANDARD_WIDTH: usize = 3834;

/// Columns in every high-resolution line.
pub const HRV_WIDTH: usize = 5751;

/// Line slots a standard-resolution segment is divided into, regardless of mode.
pub const STANDARD_LINE_SLOTS: f64 = 1494.0;

/// Duration of one standard-resolution line slot in seconds.
pub const STANDARD_LINE_DURATION: f64 = 300.0 / STANDARD_LINE_SLOTS;

/// Duration of one high-resolution line slot in seconds.
pub const HRV_LINE_DURATION: f64 = 100.0 / STANDARD_LINE_SLOTS;

/// Scan operating mode, fixed for the lifetime of a reconstructor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanMode {
    /// Rapid scan: 5 minute segments covering a third of the disk
    RapidScan,

    /// Full disk: 15 minute segments
    #[default]
    FullDisk,
}

impl ScanMode {
    /// Wall-clock length of one segment in seconds.
    pub const fn segment_period(self) -> f64 {
        match self {
            ScanMode::RapidScan => 300.0,
            ScanMode::FullDisk => 900.0,
        }
    }

    /// Minute-of-hour spacing between segment boundaries.
    pub const fn trigger_interval_minutes(self) -> u32 {
        match self {
            ScanMode::RapidScan => 5,
            ScanMode::FullDisk => 15,
        }
    }

    /// Whether a minute-of-hour is one where a segment may end.
    pub const fn is_trigger_minute(self, minute: u32) -> bool {
        minute < 60 && minute % self.trigger_interval_minutes() == 0
    }

    /// Standard-resolution framebuffer height.
    pub const fn standard_height(self) -> usize {
        match self {
            ScanMode::RapidScan => 1494,
            ScanMode::FullDisk => 4482,
        }
    }

    /// High-resolution framebuffer height.
    pub const fn hrv_height(self) -> usize {
        match self {
            ScanMode::RapidScan => 4500,
            ScanMode::FullDisk => 13500,
        }
    }

    /// Line index within the current segment for a standard-resolution packet.
    pub fn standard_line(self, timestamp: f64) -> i64 {
        line_in_segment(timestamp, self.segment_period(), STANDARD_LINE_DURATION)
    }

    /// Line index within the current segment for a high-resolution packet.
    pub fn hrv_line(self, timestamp: f64) -> i64 {
        line_in_segment(timestamp, self.segment_period(), HRV_LINE_DURATION)
    }
}

fn line_in_segment(timestamp: f64, period: f64, line_duration: f64) -> i64 {
    (timestamp.rem_euclid(period) / line_duration).floor() as i64
}

/// Framebuffer dimensions for one decoder instance.
///
/// [`ScanGeometry::for_mode`] gives the instrument's native sizes. Narrower
/// geometries are accepted so that tests and benchmarks can exercise the full
/// line arithmetic without allocating full-size rasters; the payload layout
/// then follows the narrower widths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanGeometry {
    pub standard_width: usize,
    pub standard_height: usize,
    pub hrv_width: usize,
    pub hrv_height: usize,
}

impl ScanGeometry {
    /// Native geometry for a scan mode.
    pub const fn for_mode(mode: ScanMode) -> Self {
        Self {
            standard_width: STANDARD_WIDTH,
            standard_height: mode.standard_height(),
            hrv_width: HRV_WIDTH,
            hrv_height: mode.hrv_height(),
        }
    }

    /// Native heights with reduced line widths.
    pub const fn narrow(mode: ScanMode, standard_width: usize, hrv_width: usize) -> Self {
        Self {
            standard_width,
            standard_height: mode.standard_height(),
            hrv_width,
            hrv_height: mode.hrv_height(),
        }
    }
}
