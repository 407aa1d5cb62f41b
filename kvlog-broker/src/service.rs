//! Request dispatch for one broker instance.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use kvlog_store::KvStore;
use serde_json::Value;
use tracing::{debug, warn};

use crate::allocator::OffsetAllocator;
use crate::commit::CommitTracker;
use crate::config::BrokerConfig;
use crate::error::Result;
use crate::locks::TopicLocks;
use crate::log_store::LogStore;
use crate::poll::PollEngine;
use crate::protocol::{Request, RequestBody, Response, ResponseBody, msg_id_of};
use crate::types::{LogEntry, Offset, Payload, Topic};

/// The log service: append, poll, commit and list over a shared store.
///
/// Several `LogService`s may share one store; they coordinate only through
/// the store's compare-and-swap. The topic locks held here order calls
/// within this instance and nothing more.
pub struct LogService {
    allocator: OffsetAllocator,
    poller: PollEngine,
    commits: CommitTracker,
    log_locks: TopicLocks,
    commit_locks: TopicLocks,
}

impl LogService {
    /// Build a service over `store`.
    pub fn new(store: Arc<dyn KvStore>, config: BrokerConfig) -> Result<Self> {
        config.validate()?;

        let log = LogStore::new(Arc::clone(&store));
        Ok(Self {
            allocator: OffsetAllocator::new(Arc::clone(&store), log.clone(), config.allocator),
            poller: PollEngine::new(log, config.poll),
            commits: CommitTracker::new(store),
            log_locks: TopicLocks::new(),
            commit_locks: TopicLocks::new(),
        })
    }

    /// Append a message and return its offset.
    pub async fn send(&self, topic: &Topic, payload: Payload) -> Result<Offset> {
        let _guard = self.log_locks.write(topic).await;
        self.allocator.append(topic, payload).await
    }

    /// Read each topic from its start offset.
    pub async fn poll(
        &self,
        offsets: &HashMap<Topic, Offset>,
    ) -> Result<BTreeMap<Topic, Vec<LogEntry>>> {
        let _guards = self.log_locks.read_many(offsets.keys()).await;
        self.poller.poll(offsets).await
    }

    /// Overwrite committed offsets.
    pub async fn commit_offsets(&self, offsets: &HashMap<Topic, Offset>) -> Result<()> {
        let _guards = self.commit_locks.write_many(offsets.keys()).await;
        self.commits.commit(offsets).await
    }

    /// Committed offsets, 0 for topics never committed.
    pub async fn list_committed_offsets(&self, keys: &[Topic]) -> Result<BTreeMap<Topic, Offset>> {
        let _guards = self.commit_locks.read_many(keys).await;
        self.commits.list_committed(keys).await
    }

    /// Run one decoded request.
    pub async fn handle(&self, request: Request) -> Result<Response> {
        match request {
            Request::Send { key, msg } => {
                let offset = self.send(&key, msg).await?;
                Ok(Response::SendOk { offset })
            }
            Request::Poll { offsets } => {
                let msgs = self.poll(&offsets).await?;
                Ok(Response::PollOk { msgs })
            }
            Request::CommitOffsets { offsets } => {
                self.commit_offsets(&offsets).await?;
                Ok(Response::CommitOffsetsOk)
            }
            Request::ListCommittedOffsets { keys } => {
                let offsets = self.list_committed_offsets(&keys).await?;
                Ok(Response::ListCommittedOffsetsOk { offsets })
            }
        }
    }

    /// Decode a raw request body, run it, and encode the reply body.
    ///
    /// Every request gets exactly one reply; failures become `error` bodies.
    pub async fn handle_body(&self, body: &Value) -> Value {
        let reply = match RequestBody::parse(body) {
            Ok(RequestBody { msg_id, request }) => {
                let kind = request.kind();
                debug!(kind, ?msg_id, "Handling request");

                let response = match self.handle(request).await {
                    Ok(response) => response,
                    Err(error) => {
                        warn!(kind, ?msg_id, %error, "Request failed");
                        Response::error(&error)
                    }
                };
                ResponseBody::new(msg_id, response)
            }
            Err(error) => {
                warn!(%error, "Rejecting malformed request");
                ResponseBody::new(msg_id_of(body), Response::error(&error))
            }
        };

        reply.to_value()
    }

    /// The allocator, for reconciliation and inspection.
    pub fn allocator(&self) -> &OffsetAllocator {
        &self.allocator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvlog_store::{FaultyKvStore, MemoryKvStore, Operation};
    use serde_json::json;

    fn service() -> LogService {
        LogService::new(Arc::new(MemoryKvStore::new()), BrokerConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn rejects_invalid_config() {
        let result = LogService::new(
            Arc::new(MemoryKvStore::new()),
            BrokerConfig::default().with_max_attempts(0),
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn send_body_replies_with_offset() {
        let service = service();

        let reply = service
            .handle_body(&json!({"type": "send", "msg_id": 1, "key": "k", "msg": 10}))
            .await;
        assert_eq!(reply, json!({"type": "send_ok", "in_reply_to": 1, "offset": 0}));

        let reply = service
            .handle_body(&json!({"type": "send", "msg_id": 2, "key": "k", "msg": 11}))
            .await;
        assert_eq!(reply["offset"], 1);
    }

    #[tokio::test]
    async fn poll_body_after_sends() {
        let service = service();
        for msg in ["m0", "m1", "m2"] {
            service.send(&Topic::new("k"), json!(msg)).await.unwrap();
        }

        let reply = service
            .handle_body(&json!({"type": "poll", "msg_id": 5, "offsets": {"k": 1}}))
            .await;
        assert_eq!(
            reply,
            json!({"type": "poll_ok", "in_reply_to": 5, "msgs": {"k": [[1, "m1"], [2, "m2"]]}})
        );
    }

    #[tokio::test]
    async fn commit_and_list_bodies() {
        let service = service();

        let reply = service
            .handle_body(&json!({"type": "commit_offsets", "msg_id": 1, "offsets": {"k": 4}}))
            .await;
        assert_eq!(reply, json!({"type": "commit_offsets_ok", "in_reply_to": 1}));

        let reply = service
            .handle_body(&json!({"type": "list_committed_offsets", "msg_id": 2, "keys": ["k", "j"]}))
            .await;
        assert_eq!(reply["offsets"], json!({"k": 4, "j": 0}));
    }

    #[tokio::test]
    async fn malformed_body_is_rejected_without_mutation() {
        let store = Arc::new(MemoryKvStore::new());
        let service = LogService::new(store.clone(), BrokerConfig::default()).unwrap();

        let reply = service
            .handle_body(&json!({"type": "send", "msg_id": 9, "msg": 1}))
            .await;

        assert_eq!(reply["type"], "error");
        assert_eq!(reply["code"], 12);
        assert_eq!(reply["in_reply_to"], 9);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn store_failure_becomes_error_reply() {
        let faulty = Arc::new(FaultyKvStore::new(Arc::new(MemoryKvStore::new())));
        let service = LogService::new(faulty.clone(), BrokerConfig::default()).unwrap();
        faulty.fail_always(Operation::Read, "log/");

        let reply = service
            .handle_body(&json!({"type": "poll", "msg_id": 3, "offsets": {"k": 0}}))
            .await;

        assert_eq!(reply["type"], "error");
        assert_eq!(reply["code"], 11);
    }
}
