//! Backing-store key namespace.
//!
//! Every piece of broker state lives under a [`StoreKey`]. Keys render as
//!
//! ```text
//! log/<topic length>/<topic>/<offset, 20 digits>
//! counter/<topic length>/<topic>
//! commit/<topic length>/<topic>
//! ```
//!
//! The byte-length prefix makes the rendering injective: a topic name may
//! contain `/` or digits and still never collide with another topic, and log
//! entries never collide with counter or commit state.

use std::fmt;
use std::str::FromStr;

use crate::types::{Offset, Topic};

const LOG: &str = "log";
const COUNTER: &str = "counter";
const COMMIT: &str = "commit";

/// What a key stores for its topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyKind {
    /// The log entry at one offset.
    Log { offset: Offset },
    /// The highest reserved offset.
    Counter,
    /// The last committed offset.
    Commit,
}

/// Structured backing-store key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoreKey {
    pub topic: Topic,
    pub kind: KeyKind,
}

impl StoreKey {
    pub fn log(topic: &Topic, offset: Offset) -> Self {
        Self {
            topic: topic.clone(),
            kind: KeyKind::Log { offset },
        }
    }

    pub fn counter(topic: &Topic) -> Self {
        Self {
            topic: topic.clone(),
            kind: KeyKind::Counter,
        }
    }

    pub fn commit(topic: &Topic) -> Self {
        Self {
            topic: topic.clone(),
            kind: KeyKind::Commit,
        }
    }

    /// Rendered key string as sent to the store.
    #[must_use]
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let topic = self.topic.as_str();
        match self.kind {
            KeyKind::Log { offset } => write!(f, "{LOG}/{}/{topic}/{offset:020}", topic.len()),
            KeyKind::Counter => write!(f, "{COUNTER}/{}/{topic}", topic.len()),
            KeyKind::Commit => write!(f, "{COMMIT}/{}/{topic}", topic.len()),
        }
    }
}

/// Error returned when a string is not a rendered [`StoreKey`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid store key {key:?}: {reason}")]
pub struct KeyParseError {
    pub key: String,
    pub reason: &'static str,
}

impl FromStr for StoreKey {
    type Err = KeyParseError;

    fn from_str(key: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &'static str| KeyParseError {
            key: key.to_string(),
            reason,
        };

        let (kind, rest) = key.split_once('/').ok_or_else(|| invalid("missing kind"))?;
        let (len, rest) = rest
            .split_once('/')
            .ok_or_else(|| invalid("missing topic length"))?;
        let len: usize = len.parse().map_err(|_| invalid("bad topic length"))?;

        if rest.len() < len || !rest.is_char_boundary(len) {
            return Err(invalid("topic shorter than its length"));
        }
        let (topic, tail) = rest.split_at(len);
        let topic = Topic::new(topic);

        let kind = match (kind, tail) {
            (LOG, tail) => {
                let digits = tail
                    .strip_prefix('/')
                    .ok_or_else(|| invalid("missing offset"))?;
                if digits.len() != 20 || !digits.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(invalid("offset must be 20 digits"));
                }
                let offset = digits.parse().map_err(|_| invalid("offset out of range"))?;
                KeyKind::Log { offset }
            }
            (COUNTER, "") => KeyKind::Counter,
            (COMMIT, "") => KeyKind::Commit,
            (COUNTER | COMMIT, _) => return Err(invalid("trailing data")),
            _ => return Err(invalid("unknown kind")),
        };

        Ok(Self { topic, kind })
    }
}
