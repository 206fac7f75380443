//! Per-channel framebuffers for the segment being accumulated
//!
//! One 16-bit raster per standard channel plus one high-resolution raster.
//! They are allocated once, written line by line as packets arrive and
//! zero-filled after every flush; they are never reallocated.

use crate::Result;
use crate::raster::Raster;
use crate::types::{ScanGeometry, STANDARD_CHANNELS};
use tracing::trace;

/// Native sample depth of the instrument.
pub const SAMPLE_BITS: u8 = 10;

/// Shift that left-aligns a native sample in 16-bit storage.
pub const SAMPLE_SHIFT: u32 = 16 - SAMPLE_BITS as u32;

/// Framebuffer a line is written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Standard-resolution channel `0..11`
    Standard(u8),
    /// High-resolution channel
    HighRes,
}

impl Channel {
    /// Product channel index: standard channels first, high resolution last.
    pub const fn index(self) -> usize {
        match self {
            Channel::Standard(channel) => channel as usize,
            Channel::HighRes => STANDARD_CHANNELS,
        }
    }
}

/// Framebuffers for one in-progress segment.
#[derive(Debug, Clone)]
pub struct ChannelFramebuffers {
    geometry: ScanGeometry,
    standard: Vec<Raster>,
    hrv: Raster,
}

impl ChannelFramebuffers {
    /// Allocate zero-filled framebuffers.
    pub fn new(geometry: ScanGeometry) -> Result<Self> {
        let standard = (0..STANDARD_CHANNELS)
            .map(|_| Raster::new(16, geometry.standard_width, geometry.standard_height))
            .collect::<Result<_>>()?;
        let hrv = Raster::new(16, geometry.hrv_width, geometry.hrv_height)?;
        Ok(Self { geometry, standard, hrv })
    }

    pub fn geometry(&self) -> ScanGeometry {
        self.geometry
    }

    /// Framebuffer for a channel.
    pub fn get(&self, channel: Channel) -> Option<&Raster> {
        match channel {
            Channel::Standard(index) => self.standard.get(index as usize),
            Channel::HighRes => Some(&self.hrv),
        }
    }

    fn get_mut(&mut self, channel: Channel) -> Option<&mut Raster> {
        match channel {
            Channel::Standard(index) => self.standard.get_mut(index as usize),
            Channel::HighRes => Some(&mut self.hrv),
        }
    }

    /// Samples per line for a channel.
    pub fn line_width(&self, channel: Channel) -> usize {
        match channel {
            Channel::Standard(_) => self.geometry.standard_width,
            Channel::HighRes => self.geometry.hrv_width,
        }
    }

    /// Write native samples to one line, left-aligned into 16 bits.
    ///
    /// Lines outside the framebuffer are dropped and `false` is returned.
    /// Short sample slices fill only the leading columns.
    pub fn write_line(&mut self, channel: Channel, line: i64, samples: &[u16]) -> bool {
        let Some(raster) = self.get_mut(channel) else {
            return false;
        };
        let row = usize::try_from(line).ok().and_then(|y| raster.row_mut(y));
        let Some(row) = row else {
            trace!(?channel, line, "Dropping line outside framebuffer");
            return false;
        };

        for (pixel, sample) in row.iter_mut().zip(samples) {
            *pixel = sample << SAMPLE_SHIFT;
        }
        true
    }

    /// Zero-fill every framebuffer in place.
    pub fn clear(&mut self) {
        for raster in &mut self.standard {
            raster.fill(0);
        }
        self.hrv.fill(0);
    }

    /// Copies of every framebuffer in product order, mirrored on both axes.
    pub fn mirrored_snapshot(&self) -> Vec<Raster> {
        self.standard
            .iter()
            .chain(std::iter::once(&self.hrv))
            .map(|raster| {
                let mut copy = raster.clone();
                copy.mirror(true, true);
                copy
            })
            .collect()
    }
}
