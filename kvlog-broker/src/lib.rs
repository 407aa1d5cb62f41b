//! A replicated append-only log service over a linearizable key-value store.
//!
//! Many broker instances share one [`kvlog_store::KvStore`]. Each topic is an
//! ordered log with dense offsets starting at 0; offsets are reserved with a
//! compare-and-swap on a per-topic counter, so instances never hand out the
//! same offset twice. Consumers poll from an offset and checkpoint progress
//! with committed offsets.
//!
//! # Key Types
//!
//! - [`LogService`] - Append, poll, commit and list over a shared store
//! - [`OffsetAllocator`] - Bounded compare-and-swap offset reservation
//! - [`PollEngine`] - Reads a topic from an offset up to the first gap
//! - [`CommitTracker`] - Last-write-wins consumer checkpoints
//! - [`Node`] - Serves a [`LogService`] over a [`Transport`]
//! - [`BrokerConfig`] - Retry and poll tuning, loaded from TOML

pub mod allocator;
pub mod commit;
pub mod config;
pub mod error;
pub mod key;
pub mod locks;
pub mod log_store;
pub mod poll;
pub mod protocol;
pub mod retry;
pub mod runtime;
pub mod service;
pub mod types;

// Re-exports
pub use allocator::OffsetAllocator;
pub use commit::CommitTracker;
pub use config::{AllocatorConfig, BrokerConfig, PollConfig, ProbeStrategy};
pub use error::{BrokerError, ErrorCode, Result};
pub use key::{KeyKind, KeyParseError, StoreKey};
pub use locks::TopicLocks;
pub use log_store::{LogRecord, LogStore};
pub use poll::PollEngine;
pub use protocol::{Message, Request, RequestBody, Response, ResponseBody};
pub use retry::Backoff;
pub use runtime::{ChannelClient, ChannelTransport, Node, Transport};
pub use service::LogService;
pub use types::{LogEntry, Offset, Payload, Topic};
