//! Error types for kvlog-broker

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Offset, Topic};

/// Result type for broker operations.
pub type Result<T> = std::result::Result<T, BrokerError>;

/// Top-level error type for broker operations
#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("Store error: {0}")]
    Store(#[from] kvlog_store::Error),

    /// The offset was reserved but the message never reached the log.
    /// The offset stays consumed.
    #[error("Failed to write {topic} at reserved offset {offset}: {source}")]
    Append {
        topic: Topic,
        offset: Offset,
        #[source]
        source: kvlog_store::Error,
    },

    #[error("Gave up reserving an offset for {topic} after {attempts} attempts")]
    Contention { topic: Topic, attempts: u32 },

    #[error("Corrupt value at {key}: {reason}")]
    CorruptValue { key: String, reason: String },

    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

impl BrokerError {
    /// Wire error code reported to the caller.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Store(source) => match source {
                kvlog_store::Error::KeyNotFound { .. } => ErrorCode::KeyDoesNotExist,
                kvlog_store::Error::PreconditionFailed { .. } => ErrorCode::PreconditionFailed,
                kvlog_store::Error::Unavailable(_) => ErrorCode::TemporarilyUnavailable,
                kvlog_store::Error::Codec(_) => ErrorCode::Crash,
            },
            // The write may have landed even though the store reported failure.
            Self::Append { .. } => ErrorCode::Crash,
            Self::Contention { .. } => ErrorCode::TemporarilyUnavailable,
            Self::CorruptValue { .. } | Self::Config(_) | Self::Transport(_) => ErrorCode::Crash,
            Self::MalformedRequest(_) => ErrorCode::MalformedRequest,
        }
    }
}

impl From<serde_json::Error> for BrokerError {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedRequest(err.to_string())
    }
}

/// Numeric error codes understood by clients of the log service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
pub enum ErrorCode {
    Timeout,
    NotSupported,
    TemporarilyUnavailable,
    MalformedRequest,
    Crash,
    Abort,
    KeyDoesNotExist,
    PreconditionFailed,
}

impl ErrorCode {
    /// Whether the failed operation definitely had no effect.
    #[must_use]
    pub fn is_definite(self) -> bool {
        !matches!(self, Self::Timeout | Self::Crash)
    }
}

impl From<ErrorCode> for u16 {
    fn from(code: ErrorCode) -> Self {
        match code {
            ErrorCode::Timeout => 0,
            ErrorCode::NotSupported => 10,
            ErrorCode::TemporarilyUnavailable => 11,
            ErrorCode::MalformedRequest => 12,
            ErrorCode::Crash => 13,
            ErrorCode::Abort => 14,
            ErrorCode::KeyDoesNotExist => 20,
            ErrorCode::PreconditionFailed => 22,
        }
    }
}

impl TryFrom<u16> for ErrorCode {
    type Error = String;

    fn try_from(code: u16) -> std::result::Result<Self, Self::Error> {
        Ok(match code {
            0 => Self::Timeout,
            10 => Self::NotSupported,
            11 => Self::TemporarilyUnavailable,
            12 => Self::MalformedRequest,
            13 => Self::Crash,
            14 => Self::Abort,
            20 => Self::KeyDoesNotExist,
            22 => Self::PreconditionFailed,
            other => return Err(format!("unknown error code {other}")),
        })
    }
}
