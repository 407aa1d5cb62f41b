//! Core trait for linearizable key-value operations.

use async_trait::async_trait;
use serde_json::Value;

/// A remote, linearizable key-value store.
///
/// Every operation is individually atomic and appears to take effect at a
/// single point between its call and its return. Nothing is promised about
/// sequences of operations; callers that need multi-step atomicity build it
/// on top of [`KvStore::compare_and_swap`].
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read the value stored at `key`, or `None` if the key does not exist.
    async fn read(&self, key: &str) -> crate::Result<Option<Value>>;

    /// Unconditionally store `value` at `key`.
    async fn write(&self, key: &str, value: Value) -> crate::Result<()>;

    /// Atomically replace the value at `key` with `to` if it currently equals `from`.
    ///
    /// When the key is absent and `create_if_missing` is true, the key is
    /// created with `to` regardless of `from`. When it is absent and
    /// `create_if_missing` is false, fails with [`crate::Error::KeyNotFound`].
    /// A mismatch fails with [`crate::Error::PreconditionFailed`].
    async fn compare_and_swap(
        &self,
        key: &str,
        from: Value,
        to: Value,
        create_if_missing: bool,
    ) -> crate::Result<()>;
}
