//! Replay source for recorded packet files

use std::path::Path;
use tokio::time::{Duration, Interval, MissedTickBehavior, interval};
use tracing::{debug, info, trace};

use crate::Result;
use crate::ccsds::PacketReader;
use crate::source::PacketSource;
use crate::types::Packet;

/// Replays a file of concatenated space packets.
///
/// Unpaced by default: packets are delivered as fast as the decoder takes
/// them. [`with_rate`](Self::with_rate) spaces them out like a live downlink.
pub struct ReplaySource {
    reader: PacketReader,

    /// Delay between packets, if paced
    pace: Option<Duration>,

    /// Created on first use so construction needs no runtime
    interval: Option<Interval>,

    name: String,
}

impl ReplaySource {
    /// Open a packet file recorded from spacecraft `scid`.
    pub fn open<P: AsRef<Path>>(path: P, scid: u16) -> Result<Self> {
        let reader = PacketReader::open(path, scid)?;
        info!(path = %reader.path().display(), bytes = reader.remaining(), scid, "Opened packet replay");
        Ok(Self::from_reader(reader))
    }

    pub fn from_reader(reader: PacketReader) -> Self {
        let name = format!("replay:{}", reader.path().display());
        Self { reader, pace: None, interval: None, name }
    }

    /// Deliver at most `packets_per_second`. Non-positive rates disable pacing.
    pub fn with_rate(mut self, packets_per_second: f64) -> Self {
        self.pace = (packets_per_second > 0.0)
            .then(|| Duration::from_secs_f64(1.0 / packets_per_second.clamp(0.001, 1e6)));
        self.interval = None;
        debug!(pace = ?self.pace, "Replay pacing set");
        self
    }

    pub fn packets_read(&self) -> usize {
        self.reader.packets_read()
    }

    async fn wait_for_slot(&mut self) {
        let Some(pace) = self.pace else {
            return;
        };
        let interval = self.interval.get_or_insert_with(|| {
            let mut interval = interval(pace);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });
        interval.tick().await;
    }
}

#[async_trait::async_trait]
impl PacketSource for ReplaySource {
    async fn next_packet(&mut self) -> Result<Option<Packet>> {
        if self.reader.remaining() == 0 {
            debug!(packets = self.reader.packets_read(), "Reached end of replay");
            return Ok(None);
        }

        self.wait_for_slot().await;

        let packet = self.reader.next_packet()?;
        if let Some(packet) = &packet {
            trace!(
                packet = self.reader.packets_read(),
                sequence = packet.sequence_count,
                "Replayed packet"
            );
        }
        Ok(packet)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
