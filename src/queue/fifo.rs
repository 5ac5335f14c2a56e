//! JSON-encoded FIFO queue.
//!
//! Messages are appended to the tail of a store list and popped from its
//! head. There is no acknowledgment or redelivery: once `consume` returns a
//! message it is gone from the store, even if the consumer then fails to
//! process it. Entries that cannot be decoded are dropped, not re-enqueued.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{trace, warn};

use crate::config::QueueConfig;
use crate::error::Result;
use crate::store::CoordinationStore;

/// A FIFO queue of `T` messages shared between producer and consumer processes.
pub struct FifoQueue<S: CoordinationStore + ?Sized, T> {
    store: Arc<S>,
    name: String,
    _message: PhantomData<fn() -> T>,
}

impl<S, T> FifoQueue<S, T>
where
    S: CoordinationStore + ?Sized,
    T: Serialize + DeserializeOwned,
{
    /// Create a queue over the list named in `config`.
    pub fn new(store: Arc<S>, config: QueueConfig) -> Self {
        Self {
            store,
            name: config.name,
            _message: PhantomData,
        }
    }

    /// Name of the backing list.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append `message` to the tail of the queue.
    ///
    /// Returns `Ok(false)` without touching the store if the message cannot be
    /// serialized. Store failures are returned as errors.
    pub async fn publish(&self, message: &T) -> Result<bool> {
        let data = match serde_json::to_string(message) {
            Ok(data) => data,
            Err(e) => {
                warn!(queue = %self.name, error = %e, "Failed to serialize message, not published");
                return Ok(false);
            }
        };

        let len = self.store.push_tail(&self.name, &data).await?;
        trace!(queue = %self.name, len = len, "Published message");
        Ok(len > 0)
    }

    /// Remove and return the message at the head of the queue.
    ///
    /// Returns `Ok(None)` when the queue is empty, and also when the head entry
    /// cannot be decoded; such an entry is lost.
    pub async fn consume(&self) -> Result<Option<T>> {
        let Some(data) = self.store.pop_head(&self.name).await? else {
            return Ok(None);
        };

        match serde_json::from_str(&data) {
            Ok(message) => Ok(Some(message)),
            Err(e) => {
                warn!(queue = %self.name, error = %e, "Dropped undecodable message");
                Ok(None)
            }
        }
    }

    /// Number of messages waiting.
    pub async fn len(&self) -> Result<u64> {
        self.store.list_len(&self.name).await
    }

    /// Whether no messages are waiting.
    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}
