//! File Channel Actor
//!
//! One actor per connection owns the transfer registry. Inbound requests,
//! status queries and reaper ticks all arrive through a single `select!`
//! loop, so a sweep can never interleave with a request and teardown never
//! races an in-flight tick.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use uuid::Uuid;

use super::handler::serve_chunk;
use super::registry::TransferRegistry;
use super::source::FileSource;
use super::types::{
    DrainReport, FileRequest, LogEvent, ServerMessage, TransferStatus, REAPER_PERIOD,
};

/// Capacity of the channel's event queue
const EVENT_BUFFER: usize = 64;

/// Error returned when the channel actor has already shut down
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("File channel is closed")]
pub struct ChannelClosed;

enum ChannelEvent {
    Request(FileRequest),
    Inspect(oneshot::Sender<Vec<TransferStatus>>),
    Close,
}

// ============================================================================
// Handle
// ============================================================================

/// Handle to a running file channel
///
/// Dropping the handle deactivates the channel just like [`ChannelHandle::close`].
pub struct ChannelHandle {
    conn_id: Uuid,
    events: mpsc::Sender<ChannelEvent>,
    task: JoinHandle<DrainReport>,
}

impl ChannelHandle {
    /// Queue a chunk request; requests are served in submission order
    pub async fn request(&self, request: FileRequest) -> Result<(), ChannelClosed> {
        self.events
            .send(ChannelEvent::Request(request))
            .await
            .map_err(|_| ChannelClosed)
    }

    /// Status of every open transfer, taken after all queued requests
    pub async fn transfers(&self) -> Result<Vec<TransferStatus>, ChannelClosed> {
        let (tx, rx) = oneshot::channel();
        self.events
            .send(ChannelEvent::Inspect(tx))
            .await
            .map_err(|_| ChannelClosed)?;
        rx.await.map_err(|_| ChannelClosed)
    }

    /// Deactivate the channel and wait for every handle to be released
    pub async fn close(self) -> DrainReport {
        // The actor may already be gone; the join below still yields its report
        let _ = self.events.send(ChannelEvent::Close).await;
        drop(self.events);

        match self.task.await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!(conn_id = %self.conn_id, error = %e, "File channel task failed");
                DrainReport::default()
            }
        }
    }
}

// ============================================================================
// Actor
// ============================================================================

/// Per-connection file serving actor
pub struct FileChannel<S: FileSource> {
    conn_id: Uuid,
    source: Arc<S>,
    registry: TransferRegistry<S::Handle>,
    outbound: mpsc::UnboundedSender<ServerMessage>,
}

impl<S: FileSource> FileChannel<S> {
    /// Activate a channel: spawn the actor and start its idle reaper
    ///
    /// Responses are queued on `outbound` without waiting, so a peer that
    /// stops reading never holds up the reaper.
    pub fn spawn(
        conn_id: Uuid,
        source: Arc<S>,
        outbound: mpsc::UnboundedSender<ServerMessage>,
    ) -> ChannelHandle {
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);

        let actor = Self {
            conn_id,
            source,
            registry: TransferRegistry::new(),
            outbound,
        };

        let task = tokio::spawn(actor.run(events_rx));

        ChannelHandle {
            conn_id,
            events: events_tx,
            task,
        }
    }

    async fn run(mut self, mut events: mpsc::Receiver<ChannelEvent>) -> DrainReport {
        let mut reaper = interval_at(Instant::now() + REAPER_PERIOD, REAPER_PERIOD);
        reaper.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::debug!(conn_id = %self.conn_id, "File channel active");

        loop {
            tokio::select! {
                event = events.recv() => {
                    match event {
                        Some(ChannelEvent::Request(request)) => self.handle_request(request).await,
                        Some(ChannelEvent::Inspect(reply)) => {
                            let _ = reply.send(self.registry.snapshot(Instant::now()));
                        }
                        Some(ChannelEvent::Close) | None => break,
                    }
                }
                _ = reaper.tick() => {
                    self.registry.sweep_idle(Instant::now()).await;
                }
            }
        }

        // Stop the reaper before force-closing what is left
        drop(reaper);
        let report = self.registry.drain().await;

        tracing::debug!(
            conn_id = %self.conn_id,
            closed = report.closed,
            failed = report.failed,
            "File channel inactive"
        );

        report
    }

    async fn handle_request(&mut self, request: FileRequest) {
        let message = match serve_chunk(&mut self.registry, self.source.as_ref(), &request).await {
            Ok(served) => ServerMessage::from(served.chunk),
            Err(e) => {
                tracing::warn!(
                    conn_id = %self.conn_id,
                    key = %request.key(),
                    error = %e,
                    "File request failed"
                );
                ServerMessage::from(LogEvent::error(e.to_string()))
            }
        };

        if self.outbound.send(message).is_err() {
            tracing::debug!(conn_id = %self.conn_id, "Outbound closed, dropping response");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
