//! In-memory KvStore implementation.
//!
//! All operations run under a single lock, which makes every call
//! linearizable. Useful for tests and for running several brokers in one
//! process against a shared store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::trace;

use crate::error::{Error, Result};
use crate::traits::KvStore;

/// Operation counters for a [`MemoryKvStore`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub reads: u64,
    pub writes: u64,
    pub cas_attempts: u64,
    pub cas_conflicts: u64,
}

/// In-memory, linearizable implementation of [`KvStore`].
#[derive(Default)]
pub struct MemoryKvStore {
    entries: Mutex<HashMap<String, Value>>,
    /// Simulated round-trip delay applied before every operation.
    latency: Option<Duration>,
    reads: AtomicU64,
    writes: AtomicU64,
    cas_attempts: AtomicU64,
    cas_conflicts: AtomicU64,
}

impl MemoryKvStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every operation by `latency`, yielding to other tasks the way a
    /// network round trip would.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Number of keys in the store.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Check if the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Sorted list of all keys.
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.lock().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Snapshot of the operation counters.
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            reads: self.reads.load(Ordering::SeqCst),
            writes: self.writes.load(Ordering::SeqCst),
            cas_attempts: self.cas_attempts.load(Ordering::SeqCst),
            cas_conflicts: self.cas_conflicts.load(Ordering::SeqCst),
        }
    }

    async fn round_trip(&self) {
        match self.latency {
            Some(latency) => tokio::time::sleep(latency).await,
            None => tokio::task::yield_now().await,
        }
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn read(&self, key: &str) -> Result<Option<Value>> {
        self.round_trip().await;
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn write(&self, key: &str, value: Value) -> Result<()> {
        self.round_trip().await;
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.entries.lock().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        from: Value,
        to: Value,
        create_if_missing: bool,
    ) -> Result<()> {
        self.round_trip().await;
        self.cas_attempts.fetch_add(1, Ordering::SeqCst);

        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            None if create_if_missing => {
                entries.insert(key.to_string(), to);
                Ok(())
            }
            None => Err(Error::KeyNotFound {
                key: key.to_string(),
            }),
            Some(current) if *current == from => {
                entries.insert(key.to_string(), to);
                Ok(())
            }
            Some(current) => {
                self.cas_conflicts.fetch_add(1, Ordering::SeqCst);
                trace!(key, %from, %current, "compare-and-swap conflict");
                Err(Error::PreconditionFailed {
                    key: key.to_string(),
                    expected: from,
                    actual: current.clone(),
                })
            }
        }
    }
}
