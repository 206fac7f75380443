//! Running decode sessions
//!
//! A [`DecodeSession`] owns the channels of one driver task. Flush reports
//! arrive in order through [`DecodeSession::next_report`]; previews and
//! counters are latest-value streams. Dropping the session cancels the task.
//!
//! ```rust,no_run
//! use seviri::{DecodeSession, DecoderConfig, DirectorySink};
//!
//! # async fn run() -> seviri::Result<()> {
//! let config = DecoderConfig::from_file("seviri.yaml")?;
//! let mut session =
//!     DecodeSession::replay("pass.ccsds", 323, config, DirectorySink::new("products"))?;
//!
//! while let Some(report) = session.next_report().await {
//!     println!("wrote {} from {:?}", report.key, report.source);
//! }
//! let exit = session.finish().await?;
//! println!("{:?}", exit.stats());
//! # Ok(())
//! # }
//! ```

use futures::{Stream, StreamExt};
use image::GrayImage;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::DecoderConfig;
use crate::driver::{Driver, DriverExit};
use crate::product::ProductSink;
use crate::reconstructor::{FlushReport, SegmentReconstructor};
use crate::source::PacketSource;
use crate::sources::ReplaySource;
use crate::types::DecoderStats;
use crate::{DecodeError, Result};

/// Handle to a running decode task
pub struct DecodeSession<S> {
    reports: mpsc::UnboundedReceiver<FlushReport>,
    previews: watch::Receiver<Option<Arc<GrayImage>>>,
    stats: watch::Receiver<DecoderStats>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<DriverExit<S>>>,
}

impl<S: ProductSink + 'static> DecodeSession<S> {
    /// Start decoding `source` into `reconstructor`.
    pub fn start<P: PacketSource>(source: P, reconstructor: SegmentReconstructor<S>) -> Self {
        info!(source = source.name(), "Starting decode session");
        let channels = Driver::spawn(source, reconstructor);
        Self {
            reports: channels.reports,
            previews: channels.previews,
            stats: channels.stats,
            cancel: channels.cancel,
            handle: Some(channels.handle),
        }
    }

    /// Replay a recorded packet file with native framebuffer sizes.
    pub fn replay<P: AsRef<Path>>(path: P, scid: u16, config: DecoderConfig, sink: S) -> Result<Self> {
        let source = ReplaySource::open(path, scid)?;
        let reconstructor = SegmentReconstructor::new(config, sink)?;
        Ok(Self::start(source, reconstructor))
    }
}

impl<S> DecodeSession<S> {
    /// Next flush report, or `None` once the task has stopped.
    pub async fn next_report(&mut self) -> Option<FlushReport> {
        self.reports.recv().await
    }

    /// Flush reports as a stream.
    pub fn reports(&mut self) -> impl Stream<Item = FlushReport> + '_ {
        futures::stream::poll_fn(move |cx| self.reports.poll_recv(cx))
    }

    /// Preview images as they are refreshed. Slow consumers see only the latest.
    pub fn previews(&self) -> impl Stream<Item = Arc<GrayImage>> + 'static {
        WatchStream::new(self.previews.clone()).filter_map(|opt| async move { opt })
    }

    /// Latest preview, if one has been rendered.
    pub fn current_preview(&self) -> Option<Arc<GrayImage>> {
        self.previews.borrow().clone()
    }

    /// Counters as last published by the task.
    pub fn stats(&self) -> DecoderStats {
        *self.stats.borrow()
    }

    pub fn stats_updates(&self) -> impl Stream<Item = DecoderStats> + 'static {
        WatchStream::new(self.stats.clone())
    }

    /// Ask the task to stop after the packet in progress.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Wait for the task to stop on its own.
    pub async fn finish(mut self) -> Result<DriverExit<S>> {
        let Some(handle) = self.handle.take() else {
            return Err(DecodeError::source_failed("decode task already joined"));
        };
        handle.await.map_err(|e| DecodeError::source_failed_with("decode task aborted", Box::new(e)))
    }

    /// Cancel the task and wait for it to hand back the reconstructor.
    pub async fn shutdown(self) -> Result<DriverExit<S>> {
        self.cancel();
        self.finish().await
    }
}

impl<S> Drop for DecodeSession<S> {
    fn drop(&mut self) {
        debug!("Dropping decode session");
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::StopReason;
    use crate::product::MemorySink;
    use crate::sources::ChannelSource;
    use crate::test_utils::{SEGMENT_START, ScanSimulator, cycle_timestamp};
    use crate::types::{ScanChunk, ScanGeometry, ScanMode, Spacecraft};
    use anyhow::Result;

    fn reconstructor(config: DecoderConfig) -> SegmentReconstructor<MemorySink> {
        let geometry = ScanGeometry::narrow(config.mode, 4, 6);
        SegmentReconstructor::with_geometry(config, geometry, MemorySink::new()).unwrap()
    }

    #[tokio::test]
    async fn previews_flow_through_the_session() -> Result<()> {
        let mut config = DecoderConfig::for_mode(ScanMode::RapidScan);
        config.preview = Some(crate::config::PreviewConfig { channel: 0, width: 2, height: 2, every_lines: 3 });

        let (tx, source) = ChannelSource::new(8);
        let session = DecodeSession::start(source, reconstructor(config));
        let mut previews = Box::pin(session.previews());

        let mut sim =
            ScanSimulator::new(ScanGeometry::narrow(ScanMode::RapidScan, 4, 6), Spacecraft::Msg3).unwrap();
        tx.send(sim.pattern_packet(ScanChunk::from_index(0), cycle_timestamp(SEGMENT_START, 0))).await?;

        let preview = previews.next().await.expect("preview published");
        assert_eq!(preview.dimensions(), (2, 2));
        assert!(session.current_preview().is_some());

        drop(tx);
        let exit = session.finish().await?;
        assert!(matches!(exit.stop, StopReason::EndOfStream));
        assert_eq!(exit.stats().packets_accepted, 1);
        Ok(())
    }

    #[tokio::test]
    async fn shutdown_returns_reconstructor() -> Result<()> {
        let (_tx, source) = ChannelSource::new(1);
        let session = DecodeSession::start(source, reconstructor(DecoderConfig::default()));

        let exit = session.shutdown().await?;
        assert!(matches!(exit.stop, StopReason::Cancelled));
        assert!(exit.reconstructor.sink().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn dropping_the_session_cancels_the_task() -> Result<()> {
        let (tx, source) = ChannelSource::new(1);
        let session = DecodeSession::start(source, reconstructor(DecoderConfig::default()));
        drop(session);

        // The task stops and drops its receiver, closing the channel.
        tokio::time::timeout(std::time::Duration::from_secs(5), tx.closed()).await?;
        Ok(())
    }

    #[tokio::test]
    async fn stats_are_published_at_exit() -> Result<()> {
        let (tx, source) = ChannelSource::new(4);
        let session = DecodeSession::start(source, reconstructor(DecoderConfig::default()));
        tx.send(crate::types::Packet::new(7, 0, vec![0; 8])).await?;
        drop(tx);

        let mut updates = Box::pin(session.stats_updates());
        let mut last = DecoderStats::default();
        while let Some(stats) = tokio::time::timeout(std::time::Duration::from_secs(5), updates.next()).await? {
            last = stats;
            if last.packets_skipped == 1 {
                break;
            }
        }
        assert_eq!(last.packets_skipped, 1);
        session.finish().await?;
        Ok(())
    }
}
