//! Core value types shared by the broker components.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Zero-based position of an entry within a topic.
pub type Offset = u64;

/// Opaque message payload as stored and returned.
pub type Payload = serde_json::Value;

/// Name of an append-only log.
///
/// Topics are created implicitly by their first append or commit.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Topic(String);

impl Topic {
    /// Create a topic from any string.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The topic name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Topic {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for Topic {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl Borrow<str> for Topic {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Topic {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A single polled log entry.
///
/// On the wire an entry is the two-element array `[offset, payload]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "(Offset, Payload)", into = "(Offset, Payload)")]
pub struct LogEntry {
    pub offset: Offset,
    pub payload: Payload,
}

impl LogEntry {
    pub fn new(offset: Offset, payload: Payload) -> Self {
        Self { offset, payload }
    }
}

impl From<(Offset, Payload)> for LogEntry {
    fn from((offset, payload): (Offset, Payload)) -> Self {
        Self { offset, payload }
    }
}

impl From<LogEntry> for (Offset, Payload) {
    fn from(entry: LogEntry) -> Self {
        (entry.offset, entry.payload)
    }
}
