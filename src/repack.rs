//! Bit-depth repacking
//!
//! Imager payloads carry samples packed back to back in big-endian bit order
//! with no padding between them. [`repack`] turns such a byte stream into
//! one `u16` per sample; [`pack_samples`] is the inverse used by simulators.

use serde::{Deserialize, Serialize};

/// Width of one packed sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SampleWidth {
    Bits10,
    Bits12,
    Bits16,
}

impl SampleWidth {
    pub const fn bits(self) -> u32 {
        match self {
            SampleWidth::Bits10 => 10,
            SampleWidth::Bits12 => 12,
            SampleWidth::Bits16 => 16,
        }
    }

    const fn mask(self) -> u32 {
        (1u32 << self.bits()) - 1
    }

    /// Whole samples contained in `byte_len` bytes.
    pub const fn samples_in(self, byte_len: usize) -> usize {
        byte_len * 8 / self.bits() as usize
    }

    /// Bytes needed to hold `samples` packed samples, trailing bits zeroed.
    pub const fn bytes_for(self, samples: usize) -> usize {
        (samples * self.bits() as usize).div_ceil(8)
    }
}

/// Unpack `bytes` into `out`, returning the number of samples written.
///
/// A trailing partial sample is discarded. Writing stops early if `out`
/// cannot hold every whole sample.
pub fn repack(bytes: &[u8], width: SampleWidth, out: &mut [u16]) -> usize {
    let bits = width.bits();
    let mask = width.mask();
    let mut acc: u32 = 0;
    let mut held: u32 = 0;
    let mut written = 0;

    for &byte in bytes {
        acc = (acc << 8) | byte as u32;
        held += 8;
        while held >= bits {
            if written == out.len() {
                return written;
            }
            held -= bits;
            out[written] = ((acc >> held) & mask) as u16;
            written += 1;
        }
        acc &= (1u32 << held) - 1;
    }

    written
}

/// Unpack 10-bit samples.
pub fn repack_bytes_to_10bits(bytes: &[u8], out: &mut [u16]) -> usize {
    repack(bytes, SampleWidth::Bits10, out)
}

/// Unpack 12-bit samples.
pub fn repack_bytes_to_12bits(bytes: &[u8], out: &mut [u16]) -> usize {
    repack(bytes, SampleWidth::Bits12, out)
}

/// Unpack 16-bit samples.
pub fn repack_bytes_to_16bits(bytes: &[u8], out: &mut [u16]) -> usize {
    repack(bytes, SampleWidth::Bits16, out)
}

/// Pack samples back to back, big-endian bit order, zero-padding the last byte.
///
/// Bits above the sample width are ignored.
pub fn pack_samples(samples: &[u16], width: SampleWidth) -> Vec<u8> {
    let bits = width.bits();
    let mask = width.mask();
    let mut out = Vec::with_capacity(width.bytes_for(samples.len()));
    let mut acc: u32 = 0;
    let mut held: u32 = 0;

    for &sample in samples {
        acc = (acc << bits) | (sample as u32 & mask);
        held += bits;
        while held >= 8 {
            held -= 8;
            out.push((acc >> held) as u8);
        }
        acc &= (1u32 << held) - 1;
    }

    if held > 0 {
        out.push((acc << (8 - held)) as u8);
    }

    out
}
