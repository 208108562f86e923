//! Transport-agnostic event emission.

use crate::event::SubscribeEvent;

/// The client side of the stream is gone.
#[derive(Debug, thiserror::Error)]
#[error("client event stream closed")]
pub struct SinkClosed;

/// Where session events go.
///
/// A failed emit means the client stream is broken and terminates the
/// session. `closed` lets the session react to a disconnect without
/// waiting for the next emit.
#[async_trait::async_trait]
pub trait EventSink: Send {
    /// Emit one event to the client.
    async fn emit(&mut self, event: SubscribeEvent) -> Result<(), SinkClosed>;

    /// Resolve once the client stream is gone.
    async fn closed(&self);
}

/// Sink over a bounded channel consumed by a transport adapter.
pub struct ChannelSink {
    tx: tokio::sync::mpsc::Sender<SubscribeEvent>,
}

impl ChannelSink {
    /// Wrap a channel sender.
    pub fn new(tx: tokio::sync::mpsc::Sender<SubscribeEvent>) -> Self {
        Self { tx }
    }
}

#[async_trait::async_trait]
impl EventSink for ChannelSink {
    async fn emit(&mut self, event: SubscribeEvent) -> Result<(), SinkClosed> {
        self.tx.send(event).await.map_err(|_| SinkClosed)
    }

    async fn closed(&self) {
        self.tx.closed().await;
    }
}
