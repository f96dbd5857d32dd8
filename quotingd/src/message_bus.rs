//! In-process message bus.
//!
//! Inbound messages queue on an mpsc channel and are drained in batches
//! (bounded by size and by a deadline after the first message). Outbound
//! messages fan out to any number of subscribers over a broadcast channel.

use async_trait::async_trait;
use quoting_domain::{InboundMessage, OutboundMessage};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{timeout_at, Instant};

use crate::config::BatchConfig;
use crate::error::{DaemonError, DaemonResult};

// =============================================================================
// Ports
// =============================================================================

/// Source of inbound batches.
#[async_trait]
pub trait MessageConsumer: Send {
    /// Wait for the next batch. `None` once the bus is closed and drained.
    async fn next_batch(&mut self) -> Option<Vec<InboundMessage>>;
}

/// Sink for outbound messages.
#[async_trait]
pub trait MessageProducer: Send + Sync {
    async fn send(&self, messages: Vec<OutboundMessage>) -> DaemonResult<()>;
}

// =============================================================================
// In-memory bus
// =============================================================================

/// Publishing side of the in-memory bus.
///
/// Dropping every `InMemoryBus` handle closes the inbound channel; the
/// consumer then drains what is queued and reports the end.
#[derive(Clone)]
pub struct InMemoryBus {
    inbound: mpsc::Sender<InboundMessage>,
    outbound: broadcast::Sender<OutboundMessage>,
}

impl InMemoryBus {
    /// Create a bus and its single batch consumer.
    pub fn new(capacity: usize, batch: BatchConfig) -> (Self, BatchConsumer) {
        let (inbound, receiver) = mpsc::channel(capacity.max(1));
        let (outbound, _) = broadcast::channel(capacity.max(1));

        let consumer = BatchConsumer {
            receiver,
            batch_size: batch.size.max(1),
            batch_timeout: batch.timeout,
        };
        (Self { inbound, outbound }, consumer)
    }

    /// Queue an inbound message.
    pub async fn publish(&self, message: InboundMessage) -> DaemonResult<()> {
        self.inbound
            .send(message)
            .await
            .map_err(|_| DaemonError::Bus("inbound channel closed".to_string()))
    }

    /// Producer writing to this bus' outbound channel.
    pub fn producer(&self) -> BroadcastProducer {
        BroadcastProducer { sender: self.outbound.clone() }
    }

    /// Subscribe to outbound messages sent after this call.
    pub fn subscribe(&self) -> OutboundReceiver {
        OutboundReceiver { receiver: self.outbound.subscribe() }
    }
}

/// Drains the inbound channel in batches.
pub struct BatchConsumer {
    receiver: mpsc::Receiver<InboundMessage>,
    batch_size: usize,
    batch_timeout: Duration,
}

#[async_trait]
impl MessageConsumer for BatchConsumer {
    async fn next_batch(&mut self) -> Option<Vec<InboundMessage>> {
        let first = self.receiver.recv().await?;
        let deadline = Instant::now() + self.batch_timeout;

        let mut batch = Vec::with_capacity(self.batch_size);
        batch.push(first);

        while batch.len() < self.batch_size {
            match timeout_at(deadline, self.receiver.recv()).await {
                Ok(Some(message)) => batch.push(message),
                // Closed or deadline reached
                Ok(None) | Err(_) => break,
            }
        }
        Some(batch)
    }
}

/// Outbound side of the in-memory bus.
#[derive(Clone)]
pub struct BroadcastProducer {
    sender: broadcast::Sender<OutboundMessage>,
}

#[async_trait]
impl MessageProducer for BroadcastProducer {
    async fn send(&self, messages: Vec<OutboundMessage>) -> DaemonResult<()> {
        for message in messages {
            // No subscribers is not an error
            let _ = self.sender.send(message);
        }
        Ok(())
    }
}

/// Receiver for outbound messages.
pub struct OutboundReceiver {
    receiver: broadcast::Receiver<OutboundMessage>,
}

impl OutboundReceiver {
    /// Receive the next outbound message.
    ///
    /// Returns `None` if every sender has been dropped.
    /// Returns error description if the receiver lagged (missed messages).
    pub async fn recv(&mut self) -> Option<Result<OutboundMessage, String>> {
        match self.receiver.recv().await {
            Ok(message) => Some(Ok(message)),
            Err(broadcast::error::RecvError::Closed) => None,
            Err(broadcast::error::RecvError::Lagged(count)) => {
                Some(Err(format!("Receiver lagged, missed {} messages", count)))
            },
        }
    }

    /// Try to receive a message without blocking.
    pub fn try_recv(&mut self) -> Option<Result<OutboundMessage, String>> {
        match self.receiver.try_recv() {
            Ok(message) => Some(Ok(message)),
            Err(broadcast::error::TryRecvError::Empty) => None,
            Err(broadcast::error::TryRecvError::Closed) => None,
            Err(broadcast::error::TryRecvError::Lagged(count)) => {
                Some(Err(format!("Receiver lagged, missed {} messages", count)))
            },
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
