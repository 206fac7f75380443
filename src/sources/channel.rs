//! In-process packet source fed through a tokio channel

use tokio::sync::mpsc;
use tracing::debug;

use crate::Result;
use crate::source::PacketSource;
use crate::types::Packet;

/// Receives packets pushed by another task, e.g. a live demultiplexer.
///
/// The stream ends once every sender has been dropped and the queue drained.
pub struct ChannelSource {
    rx: mpsc::Receiver<Packet>,
    received: u64,
}

impl ChannelSource {
    /// Create a bounded source and the sender that feeds it.
    pub fn new(capacity: usize) -> (mpsc::Sender<Packet>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self::from_receiver(rx))
    }

    pub fn from_receiver(rx: mpsc::Receiver<Packet>) -> Self {
        Self { rx, received: 0 }
    }

    pub fn received(&self) -> u64 {
        self.received
    }
}

#[async_trait::async_trait]
impl PacketSource for ChannelSource {
    async fn next_packet(&mut self) -> Result<Option<Packet>> {
        match self.rx.recv().await {
            Some(packet) => {
                self.received += 1;
                Ok(Some(packet))
            }
            None => {
                debug!(received = self.received, "All packet senders dropped");
                Ok(None)
            }
        }
    }

    fn name(&self) -> &str {
        "channel"
    }
}
