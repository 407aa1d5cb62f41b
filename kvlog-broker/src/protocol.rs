//! Request and response bodies of the log service.
//!
//! Bodies are JSON objects discriminated by `type`. Field names are the wire
//! contract:
//!
//! | Request | Response |
//! |---|---|
//! | `send { key, msg }` | `send_ok { offset }` |
//! | `poll { offsets }` | `poll_ok { msgs }` |
//! | `commit_offsets { offsets }` | `commit_offsets_ok` |
//! | `list_committed_offsets { keys }` | `list_committed_offsets_ok { offsets }` |
//!
//! Any failure is answered with `error { code, text }`.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{BrokerError, ErrorCode, Result};
use crate::types::{LogEntry, Offset, Payload, Topic};

/// A routed message as delivered by the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub src: String,
    pub dest: String,
    pub body: Value,
}

/// Operations a client can ask for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Append `msg` to topic `key`.
    Send { key: Topic, msg: Payload },
    /// Read each topic from its start offset.
    Poll { offsets: HashMap<Topic, Offset> },
    /// Overwrite the committed offset of each topic.
    CommitOffsets { offsets: HashMap<Topic, Offset> },
    /// Fetch committed offsets.
    ListCommittedOffsets { keys: Vec<Topic> },
}

impl Request {
    /// Wire name of the request type.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Send { .. } => "send",
            Self::Poll { .. } => "poll",
            Self::CommitOffsets { .. } => "commit_offsets",
            Self::ListCommittedOffsets { .. } => "list_committed_offsets",
        }
    }
}

/// Replies produced by the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    SendOk {
        offset: Offset,
    },
    PollOk {
        msgs: BTreeMap<Topic, Vec<LogEntry>>,
    },
    CommitOffsetsOk,
    ListCommittedOffsetsOk {
        offsets: BTreeMap<Topic, Offset>,
    },
    Error {
        code: ErrorCode,
        text: String,
    },
}

impl Response {
    pub fn error(err: &BrokerError) -> Self {
        Self::Error {
            code: err.code(),
            text: err.to_string(),
        }
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

/// Request body with its correlation id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg_id: Option<u64>,
    #[serde(flatten)]
    pub request: Request,
}

impl RequestBody {
    /// Decode a raw body. Unknown types and bad fields are malformed requests.
    pub fn parse(body: &Value) -> Result<Self> {
        Ok(Self::deserialize(body)?)
    }
}

/// Response body with the id of the request it answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<u64>,
    #[serde(flatten)]
    pub response: Response,
}

impl ResponseBody {
    pub fn new(in_reply_to: Option<u64>, response: Response) -> Self {
        Self {
            in_reply_to,
            response,
        }
    }

    /// Encode as a JSON body.
    pub fn to_value(&self) -> Value {
        // Response bodies contain only strings, integers and JSON values.
        serde_json::to_value(self).unwrap_or_else(|e| {
            serde_json::json!({
                "type": "error",
                "in_reply_to": self.in_reply_to,
                "code": u16::from(ErrorCode::Crash),
                "text": e.to_string(),
            })
        })
    }
}

/// Pull `msg_id` out of a body that may not otherwise parse.
pub fn msg_id_of(body: &Value) -> Option<u64> {
    body.get("msg_id").and_then(Value::as_u64)
}
