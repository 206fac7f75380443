//! Spacecraft identities and their static calibration tables

use crate::timecode::TimecodeCalibration;
use serde::{Deserialize, Serialize};

const SPACECRAFT_COUNT: usize = 4;

/// Meteosat Second Generation spacecraft carrying the imager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Spacecraft {
    /// Meteosat-8
    Msg1,
    /// Meteosat-9
    Msg2,
    /// Meteosat-10
    Msg3,
    /// Meteosat-11
    Msg4,
}

impl Spacecraft {
    pub const ALL: [Spacecraft; SPACECRAFT_COUNT] =
        [Spacecraft::Msg1, Spacecraft::Msg2, Spacecraft::Msg3, Spacecraft::Msg4];

    /// Look up a spacecraft by its transfer-frame spacecraft id.
    pub const fn from_scid(scid: u16) -> Option<Self> {
        match scid {
            321 => Some(Spacecraft::Msg1),
            322 => Some(Spacecraft::Msg2),
            323 => Some(Spacecraft::Msg3),
            324 => Some(Spacecraft::Msg4),
            _ => None,
        }
    }

    pub const fn scid(self) -> u16 {
        match self {
            Spacecraft::Msg1 => 321,
            Spacecraft::Msg2 => 322,
            Spacecraft::Msg3 => 323,
            Spacecraft::Msg4 => 324,
        }
    }

    /// Source name declared on products from this spacecraft.
    pub const fn product_source(self) -> &'static str {
        match self {
            Spacecraft::Msg1 => "MSG-1",
            Spacecraft::Msg2 => "MSG-2",
            Spacecraft::Msg3 => "MSG-3",
            Spacecraft::Msg4 => "MSG-4",
        }
    }

    /// Empirically fitted timecode epoch for this spacecraft.
    ///
    /// Meteosat-8 has no fitted epoch; its packets cannot be placed on a
    /// line and are skipped.
    pub const fn timecode_calibration(self) -> Option<TimecodeCalibration> {
        match self {
            Spacecraft::Msg1 => None,
            Spacecraft::Msg2 => Some(TimecodeCalibration::meteosat(18249 + 1310, 6442.0)),
            Spacecraft::Msg3 => Some(TimecodeCalibration::meteosat(18249, 34738.0)),
            Spacecraft::Msg4 => Some(TimecodeCalibration::meteosat(18249 + 731, 42207.0)),
        }
    }
}

impl std::fmt::Display for Spacecraft {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.product_source())
    }
}

/// Per-spacecraft packet counts for one segment.
///
/// Bounded regardless of how many packets a segment holds. Each spacecraft
/// also keeps the rank of its first vote, so ties can go to whichever was
/// seen first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpacecraftVotes {
    counts: [u64; SPACECRAFT_COUNT],
    first_seen: [Option<u8>; SPACECRAFT_COUNT],
    distinct: u8,
}

impl SpacecraftVotes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, spacecraft: Spacecraft) {
        let slot = spacecraft as usize;
        if self.first_seen[slot].is_none() {
            self.first_seen[slot] = Some(self.distinct);
            self.distinct += 1;
        }
        self.counts[slot] += 1;
    }

    pub fn count(&self, spacecraft: Spacecraft) -> u64 {
        self.counts[spacecraft as usize]
    }

    /// Votes cast since the last clear.
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.distinct == 0
    }

    /// Observed spacecraft with their counts, in order of first appearance.
    pub fn iter(&self) -> impl Iterator<Item = (Spacecraft, u64)> + '_ {
        let mut seen: Vec<(u8, Spacecraft)> = Spacecraft::ALL
            .iter()
            .filter_map(|sc| self.first_seen[*sc as usize].map(|rank| (rank, *sc)))
            .collect();
        seen.sort_unstable();
        seen.into_iter().map(|(_, sc)| (sc, self.count(sc)))
    }

    /// The most frequently observed spacecraft.
    ///
    /// Ties go to the spacecraft that was seen first.
    pub fn winner(&self) -> Option<Spacecraft> {
        let mut best: Option<(Spacecraft, u64)> = None;
        for (spacecraft, count) in self.iter() {
            if best.is_none_or(|(_, top)| count > top) {
                best = Some((spacecraft, count));
            }
        }
        best.map(|(spacecraft, _)| spacecraft)
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

impl FromIterator<Spacecraft> for SpacecraftVotes {
    fn from_iter<I: IntoIterator<Item = Spacecraft>>(iter: I) -> Self {
        let mut votes = Self::new();
        for spacecraft in iter {
            votes.record(spacecraft);
        }
        votes
    }
}

/// Pick the most frequently observed spacecraft.
///
/// Ties go to the spacecraft that was seen first. Returns `None` for an
/// empty slice.
pub fn majority_vote(observed: &[Spacecraft]) -> Option<Spacecraft> {
    observed.iter().copied().collect::<SpacecraftVotes>().winner()
}
