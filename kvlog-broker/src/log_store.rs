//! Per-offset log entries in the backing store.
//!
//! Every slot is written at most once, by a create-if-absent compare-and-swap.
//! Whichever of the message and its tombstone lands first stays.

use std::sync::Arc;

use kvlog_store::KvStore;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{BrokerError, Result};
use crate::key::StoreKey;
use crate::types::{Offset, Payload, Topic};

/// Value stored at a log key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum LogRecord {
    /// A message appended by a producer.
    Message(Payload),
    /// Tombstone for an offset that was reserved but never written.
    Abandoned,
}

/// Reads and writes log entries keyed by (topic, offset).
#[derive(Clone)]
pub struct LogStore {
    store: Arc<dyn KvStore>,
}

impl LogStore {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// Write a message at `offset`.
    ///
    /// Slots are write-once: if the slot already holds a different record,
    /// including a tombstone, this fails with a precondition error and the
    /// slot is left alone. Returns the raw store error so the caller can
    /// attribute it to the reservation that owns the offset.
    pub async fn put(
        &self,
        topic: &Topic,
        offset: Offset,
        payload: Payload,
    ) -> kvlog_store::Result<()> {
        let key = StoreKey::log(topic, offset).render();
        let record = serde_json::to_value(LogRecord::Message(payload))?;
        self.store
            .compare_and_swap(&key, record.clone(), record, true)
            .await
    }

    /// Read the record at `offset`, or `None` if nothing was written there.
    pub async fn get(&self, topic: &Topic, offset: Offset) -> Result<Option<LogRecord>> {
        let key = StoreKey::log(topic, offset).render();
        match self.store.read(&key).await? {
            None => Ok(None),
            Some(value) => decode(&key, value).map(Some),
        }
    }

    /// Place a tombstone at `offset` unless a message already landed there.
    ///
    /// Returns `true` when the slot holds a tombstone afterwards and `false`
    /// when it holds a message.
    pub async fn mark_abandoned(&self, topic: &Topic, offset: Offset) -> kvlog_store::Result<bool> {
        let key = StoreKey::log(topic, offset).render();
        let tombstone = serde_json::to_value(LogRecord::Abandoned)?;

        match self
            .store
            .compare_and_swap(&key, tombstone.clone(), tombstone, true)
            .await
        {
            Ok(()) => Ok(true),
            Err(e) if e.is_precondition_failed() => Ok(false),
            Err(e) => Err(e),
        }
    }
}

fn decode(key: &str, value: Value) -> Result<LogRecord> {
    serde_json::from_value(value).map_err(|e| BrokerError::CorruptValue {
        key: key.to_string(),
        reason: e.to_string(),
    })
}
