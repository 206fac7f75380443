//! Packet source trait

use crate::Result;
use crate::types::Packet;

/// Trait for packet streams feeding the decoder
///
/// Sources deliver packets in arrival order and handle their own pacing.
/// The driver owns exactly one source and awaits it between packets, so a
/// source never sees concurrent calls.
#[async_trait::async_trait]
pub trait PacketSource: Send + 'static {
    /// Get the next packet
    ///
    /// Returns:
    /// - `Ok(Some(packet))` - Packet available
    /// - `Ok(None)` - Stream ended (normal termination)
    /// - `Err(e)` - Error occurred; the driver may call again after backing off
    async fn next_packet(&mut self) -> Result<Option<Packet>>;

    /// Short description used in logs
    fn name(&self) -> &str;
}
