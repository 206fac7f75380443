//! Driver spawns and manages the decode task

use image::GrayImage;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::product::ProductSink;
use crate::reconstructor::{FlushReport, PacketOutcome, SegmentReconstructor};
use crate::source::PacketSource;
use crate::types::{DecoderStats, Packet};
use crate::{DecodeError, Result};

/// Consecutive source errors tolerated before the driver gives up.
pub const MAX_SOURCE_ERRORS: u32 = 10;

/// Packets between stats publications.
const STATS_EVERY: u64 = 256;

/// Why the decode task stopped.
#[derive(Debug)]
pub enum StopReason {
    /// Cancellation token fired
    Cancelled,
    /// Source reported end of input; the unflushed segment is discarded
    EndOfStream,
    /// Source kept failing
    SourceFailed(DecodeError),
    /// A flushed segment could not be persisted
    PersistenceFailed(DecodeError),
}

impl StopReason {
    /// Whether the task stopped because of an error.
    pub fn is_failure(&self) -> bool {
        matches!(self, StopReason::SourceFailed(_) | StopReason::PersistenceFailed(_))
    }
}

/// What the decode task hands back when it ends.
pub struct DriverExit<S> {
    /// The reconstructor, including its sink and any unpersisted product
    pub reconstructor: SegmentReconstructor<S>,
    pub stop: StopReason,
}

impl<S> DriverExit<S> {
    pub fn stats(&self) -> DecoderStats {
        self.reconstructor.stats()
    }

    /// Turn failure stops into errors.
    pub fn into_result(self) -> Result<SegmentReconstructor<S>> {
        match self.stop {
            StopReason::SourceFailed(e) | StopReason::PersistenceFailed(e) => Err(e),
            StopReason::Cancelled | StopReason::EndOfStream => Ok(self.reconstructor),
        }
    }
}

impl<S> std::fmt::Debug for DriverExit<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverExit").field("stop", &self.stop).finish_non_exhaustive()
    }
}

/// Result of spawning the decode task
pub struct DriverChannels<S> {
    /// One report per persisted segment
    pub reports: mpsc::UnboundedReceiver<FlushReport>,
    /// Latest preview image
    pub previews: watch::Receiver<Option<Arc<GrayImage>>>,
    /// Periodically published counters
    pub stats: watch::Receiver<DecoderStats>,
    /// Cancellation token for graceful shutdown
    pub cancel: CancellationToken,
    /// Completes with the reconstructor once the task stops
    pub handle: JoinHandle<DriverExit<S>>,
}

/// Driver runs a packet source into a reconstructor
///
/// A single task owns both, so every packet, including any flush it
/// triggers, is fully processed before the next one is read. Packets that
/// flush are handed to the blocking pool together with the reconstructor,
/// keeping sink I/O off the runtime threads.
pub struct Driver;

impl Driver {
    /// Spawn the decode task
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<P, S>(source: P, reconstructor: SegmentReconstructor<S>) -> DriverChannels<S>
    where
        P: PacketSource,
        S: ProductSink + 'static,
    {
        let (report_tx, report_rx) = mpsc::unbounded_channel();
        let (preview_tx, preview_rx) = watch::channel(None);
        let (stats_tx, stats_rx) = watch::channel(reconstructor.stats());
        let cancel = CancellationToken::new();

        let publish = Publishers { reports: report_tx, previews: preview_tx, stats: stats_tx };
        let handle = tokio::spawn(Self::decode_task(source, reconstructor, publish, cancel.clone()));

        DriverChannels { reports: report_rx, previews: preview_rx, stats: stats_rx, cancel, handle }
    }

    async fn decode_task<P, S>(
        mut source: P,
        mut reconstructor: SegmentReconstructor<S>,
        publish: Publishers,
        cancel: CancellationToken,
    ) -> DriverExit<S>
    where
        P: PacketSource,
        S: ProductSink + 'static,
    {
        info!(source = source.name(), mode = ?reconstructor.mode(), "Decode task started");
        let mut packet_count = 0u64;
        let mut error_count = 0u32;

        let stop = loop {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Decode task cancelled");
                    break StopReason::Cancelled;
                }
                result = source.next_packet() => result,
            };

            match result {
                Ok(Some(packet)) => {
                    packet_count += 1;
                    error_count = 0;

                    let result = if reconstructor.flush_pending(&packet) {
                        let (returned, result) = Self::process_blocking(reconstructor, packet).await;
                        reconstructor = returned;
                        result
                    } else {
                        reconstructor.process(&packet)
                    };

                    match result {
                        Ok(outcome) => {
                            if let Some(report) = outcome.flushed() {
                                publish.report(report.clone());
                                publish.stats(reconstructor.stats());
                            }
                        }
                        Err(e) => {
                            error!(error = %e, "Segment persistence failed, stopping");
                            break StopReason::PersistenceFailed(e);
                        }
                    }

                    publish.preview(reconstructor.preview());
                    if packet_count % STATS_EVERY == 0 {
                        trace!(packets = packet_count, "Publishing stats");
                        publish.stats(reconstructor.stats());
                    }
                }
                Ok(None) => {
                    info!(packets = packet_count, "Packet source ended");
                    if !reconstructor.votes().is_empty() {
                        warn!(
                            packets = reconstructor.votes().total(),
                            "Discarding unflushed segment at end of stream"
                        );
                    }
                    break StopReason::EndOfStream;
                }
                Err(e) => {
                    // Source error - don't crash on transient failures
                    error_count += 1;
                    error!("Source error ({}/{}): {}", error_count, MAX_SOURCE_ERRORS, e);

                    if error_count >= MAX_SOURCE_ERRORS {
                        error!("Too many source errors, shutting down");
                        break StopReason::SourceFailed(e);
                    }

                    // Exponential backoff: 100ms, 200ms, 400ms, ...
                    let backoff = std::time::Duration::from_millis(50 * (1 << error_count.min(5)));
                    tokio::select! {
                        _ = cancel.cancelled() => break StopReason::Cancelled,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
            }
        };

        publish.stats(reconstructor.stats());
        info!(packets = packet_count, stop = ?stop, "Decode task ended");
        DriverExit { reconstructor, stop }
    }

    /// Process a flushing packet on the blocking pool.
    async fn process_blocking<S>(
        mut reconstructor: SegmentReconstructor<S>,
        packet: Packet,
    ) -> (SegmentReconstructor<S>, Result<PacketOutcome>)
    where
        S: ProductSink + 'static,
    {
        debug!(sequence = packet.sequence_count, "Flushing on the blocking pool");
        let task = tokio::task::spawn_blocking(move || {
            let result = reconstructor.process(&packet);
            (reconstructor, result)
        });
        match task.await {
            Ok(done) => done,
            // Blocking tasks are only cancelled at runtime shutdown, which
            // drops this task first; anything else is a panic in the sink.
            Err(e) => std::panic::resume_unwind(e.into_panic()),
        }
    }
}

struct Publishers {
    reports: mpsc::UnboundedSender<FlushReport>,
    previews: watch::Sender<Option<Arc<GrayImage>>>,
    stats: watch::Sender<DecoderStats>,
}

impl Publishers {
    fn report(&self, report: FlushReport) {
        if self.reports.send(report).is_err() {
            debug!("Report receiver dropped");
        }
    }

    fn preview(&self, preview: Option<Arc<GrayImage>>) {
        let Some(preview) = preview else {
            return;
        };
        self.previews.send_if_modified(|current| {
            if current.as_ref().is_some_and(|c| Arc::ptr_eq(c, &preview)) {
                return false;
            }
            *current = Some(preview);
            true
        });
    }

    fn stats(&self, stats: DecoderStats) {
        self.stats.send_replace(stats);
    }
}
