//! Fault-injecting KvStore wrapper.
//!
//! Wraps another store and fails selected operations with
//! [`Error::Unavailable`] before they reach it. Used to exercise the
//! write-failure paths of callers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::traits::KvStore;

/// Store operation a fault applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    Write,
    CompareAndSwap,
}

#[derive(Debug)]
struct Fault {
    operation: Operation,
    key_prefix: String,
    /// Remaining injections; `None` fails forever.
    remaining: Option<usize>,
}

/// [`KvStore`] wrapper that injects failures.
pub struct FaultyKvStore {
    inner: Arc<dyn KvStore>,
    faults: Mutex<Vec<Fault>>,
    injected: AtomicU64,
}

impl FaultyKvStore {
    /// Wrap `inner`; no faults are armed initially.
    #[must_use]
    pub fn new(inner: Arc<dyn KvStore>) -> Self {
        Self {
            inner,
            faults: Mutex::new(Vec::new()),
            injected: AtomicU64::new(0),
        }
    }

    /// Fail the next `times` matching operations on keys starting with `key_prefix`.
    pub fn fail_times(&self, operation: Operation, key_prefix: impl Into<String>, times: usize) {
        self.arm(operation, key_prefix.into(), Some(times));
    }

    /// Fail every matching operation on keys starting with `key_prefix` until cleared.
    pub fn fail_always(&self, operation: Operation, key_prefix: impl Into<String>) {
        self.arm(operation, key_prefix.into(), None);
    }

    /// Disarm all faults.
    pub fn clear(&self) {
        self.faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Number of failures injected so far.
    pub fn injected(&self) -> u64 {
        self.injected.load(Ordering::SeqCst)
    }

    fn arm(&self, operation: Operation, key_prefix: String, remaining: Option<usize>) {
        self.faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Fault {
                operation,
                key_prefix,
                remaining,
            });
    }

    fn check(&self, operation: Operation, key: &str) -> Result<()> {
        let mut faults = self.faults.lock().unwrap_or_else(PoisonError::into_inner);

        let hit = faults.iter_mut().find(|fault| {
            fault.operation == operation
                && key.starts_with(&fault.key_prefix)
                && fault.remaining != Some(0)
        });

        let Some(fault) = hit else {
            return Ok(());
        };

        if let Some(remaining) = fault.remaining.as_mut() {
            *remaining -= 1;
        }
        faults.retain(|fault| fault.remaining != Some(0));

        self.injected.fetch_add(1, Ordering::SeqCst);
        debug!(?operation, key, "injecting store failure");
        Err(Error::Unavailable(format!(
            "injected {operation:?} failure for {key}"
        )))
    }
}

#[async_trait]
impl KvStore for FaultyKvStore {
    async fn read(&self, key: &str) -> Result<Option<Value>> {
        self.check(Operation::Read, key)?;
        self.inner.read(key).await
    }

    async fn write(&self, key: &str, value: Value) -> Result<()> {
        self.check(Operation::Write, key)?;
        self.inner.write(key, value).await
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        from: Value,
        to: Value,
        create_if_missing: bool,
    ) -> Result<()> {
        self.check(Operation::CompareAndSwap, key)?;
        self.inner
            .compare_and_swap(key, from, to, create_if_missing)
            .await
    }
}
