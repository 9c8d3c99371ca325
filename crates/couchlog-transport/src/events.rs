//! # Transport Events
//!
//! Side channel on which the write path reports outcomes. Every accepted
//! write eventually produces one `Logged`; every failed write produces one
//! `Error`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::TransportError;

/// Default capacity of the event channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Outcome notifications from the write path.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A log event was persisted.
    Logged { level: String, message: String },
    /// A write failed.
    Error(Arc<TransportError>),
}

impl TransportEvent {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

/// Errors from subscription operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    /// The transport was dropped.
    #[error("Event bus closed")]
    Closed,
}

/// Broadcast bus owned by one transport instance.
#[derive(Debug)]
pub struct TransportEventBus {
    sender: broadcast::Sender<TransportEvent>,
    events_published: AtomicU64,
}

impl TransportEventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            events_published: AtomicU64::new(0),
        }
    }

    /// Publish an event; returns how many subscribers received it.
    pub fn publish(&self, event: TransportEvent) -> usize {
        self.events_published.fetch_add(1, Ordering::Relaxed);
        match self.sender.send(event) {
            Ok(receivers) => receivers,
            Err(_) => {
                debug!("Transport event published with no subscribers");
                0
            }
        }
    }

    #[must_use]
    pub fn subscribe(&self) -> EventSubscription {
        EventSubscription {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }
}

impl Default for TransportEventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving end of the event bus.
pub struct EventSubscription {
    receiver: broadcast::Receiver<TransportEvent>,
}

impl EventSubscription {
    /// Next event, or `None` once the transport is gone.
    pub async fn recv(&mut self) -> Option<TransportEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    debug!(lagged = count, "Subscriber lagged, some events dropped");
                }
            }
        }
    }

    /// Next event without waiting.
    pub fn try_recv(&mut self) -> Result<Option<TransportEvent>, SubscriptionError> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Ok(Some(event)),
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(SubscriptionError::Closed)
                }
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            }
        }
    }
}
