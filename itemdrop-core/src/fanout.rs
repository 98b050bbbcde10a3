//! Per-channel single-consumer event delivery.
//!
//! Each channel id maps to at most one live consumer. A new connection for
//! the same channel replaces the old one; the old stream simply stops
//! receiving.

use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Messages buffered per consumer before writes start failing.
pub const CONSUMER_BUFFER: usize = 256;

#[derive(Debug, Error)]
pub enum FanoutError {
    #[error("no consumer connected for channel {0}")]
    NoConsumerForChannel(String),

    #[error("consumer for channel {0} is not keeping up")]
    ConsumerLagging(String),

    #[error("event serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// The write side of one consumer connection.
#[derive(Debug, Clone)]
pub struct ConsumerHandle {
    pub id: u64,
    tx: mpsc::Sender<String>,
}

impl ConsumerHandle {
    pub fn new(id: u64, tx: mpsc::Sender<String>) -> Self {
        Self { id, tx }
    }
}

/// The read side handed to the transport after [`FanoutRegistry::connect`].
#[derive(Debug)]
pub struct ConsumerStream {
    pub channel_id: String,
    pub consumer_id: u64,
    pub rx: mpsc::Receiver<String>,
}

#[derive(Debug, Default)]
pub struct FanoutRegistry {
    consumers: DashMap<String, ConsumerHandle>,
    next_id: AtomicU64,
}

impl FanoutRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a fresh consumer for `channel_id` and register it.
    pub fn connect(&self, channel_id: &str) -> ConsumerStream {
        let (tx, rx) = mpsc::channel(CONSUMER_BUFFER);
        let consumer_id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.register_consumer(channel_id, ConsumerHandle::new(consumer_id, tx));
        ConsumerStream {
            channel_id: channel_id.to_string(),
            consumer_id,
            rx,
        }
    }

    /// Register `handle` for `channel_id`, replacing any previous consumer.
    ///
    /// Returns the replaced handle, if any.
    pub fn register_consumer(
        &self,
        channel_id: &str,
        handle: ConsumerHandle,
    ) -> Option<ConsumerHandle> {
        let consumer_id = handle.id;
        let replaced = self.consumers.insert(channel_id.to_string(), handle);
        match &replaced {
            Some(old) => info!(
                %channel_id,
                consumer_id,
                replaced_consumer_id = old.id,
                "Consumer replaced"
            ),
            None => info!(%channel_id, consumer_id, "Consumer registered"),
        }
        replaced
    }

    /// Remove whatever consumer is registered for `channel_id`. No-op if none.
    pub fn deregister_consumer(&self, channel_id: &str) -> bool {
        let removed = self.consumers.remove(channel_id).is_some();
        if removed {
            info!(%channel_id, "Consumer deregistered");
        }
        removed
    }

    /// Remove the registration only if it still belongs to `consumer_id`.
    ///
    /// Used when a connection closes, so a stale connection cannot evict the
    /// one that replaced it.
    pub fn release(&self, channel_id: &str, consumer_id: u64) -> bool {
        let removed = self
            .consumers
            .remove_if(channel_id, |_, handle| handle.id == consumer_id)
            .is_some();
        if removed {
            info!(%channel_id, consumer_id, "Consumer disconnected");
        } else {
            debug!(%channel_id, consumer_id, "Closed consumer was already replaced");
        }
        removed
    }

    pub fn has_consumer(&self, channel_id: &str) -> bool {
        self.consumers.contains_key(channel_id)
    }

    /// Serialize `event` and hand it to the channel's consumer.
    pub fn broadcast<T: Serialize + ?Sized>(
        &self,
        channel_id: &str,
        event: &T,
    ) -> Result<(), FanoutError> {
        let payload = serde_json::to_string(event)?;
        self.send_raw(channel_id, payload)
    }

    /// Hand an already serialized event to the channel's consumer.
    pub fn send_raw(&self, channel_id: &str, payload: String) -> Result<(), FanoutError> {
        let handle = self
            .consumers
            .get(channel_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| FanoutError::NoConsumerForChannel(channel_id.to_string()))?;

        match handle.tx.try_send(payload) {
            Ok(()) => {
                debug!(%channel_id, consumer_id = handle.id, "Event delivered");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(%channel_id, consumer_id = handle.id, "Consumer buffer full, event dropped");
                Err(FanoutError::ConsumerLagging(channel_id.to_string()))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                // The transport went away without releasing.
                self.release(channel_id, handle.id);
                Err(FanoutError::NoConsumerForChannel(channel_id.to_string()))
            }
        }
    }

    pub fn consumer_count(&self) -> usize {
        self.consumers.len()
    }
}
