//! Key-value store client seam for kvlog.
//!
//! The log service keeps all of its state in a remote linearizable
//! key-value store. This crate defines the operations it relies on and ships
//! in-process implementations for tests and single-process deployments.
//!
//! # Key Types
//!
//! - [`KvStore`] - Trait for read, write and compare-and-swap
//! - [`MemoryKvStore`] - Linearizable in-memory implementation
//! - [`FaultyKvStore`] - Wrapper that injects store failures

pub mod error;
pub mod faulty;
pub mod memory;
pub mod traits;

// Re-exports
pub use error::{Error, Result};
pub use faulty::{FaultyKvStore, Operation};
pub use memory::{MemoryKvStore, StoreStats};
pub use traits::KvStore;
