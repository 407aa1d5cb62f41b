//! Consumer commit checkpoints.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use kvlog_store::KvStore;
use serde_json::json;
use tracing::debug;

use crate::error::{BrokerError, Result};
use crate::key::StoreKey;
use crate::types::{Offset, Topic};

/// Stores one committed offset per topic.
///
/// Commits are last-write-wins: a lower offset overwrites a higher one, and
/// nothing checks that the offset exists in the log.
#[derive(Clone)]
pub struct CommitTracker {
    store: Arc<dyn KvStore>,
}

impl CommitTracker {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// Overwrite the committed offset of each topic.
    pub async fn commit(&self, offsets: &HashMap<Topic, Offset>) -> Result<()> {
        for (topic, offset) in offsets {
            let key = StoreKey::commit(topic).render();
            self.store.write(&key, json!(offset)).await?;
            debug!(%topic, offset, "Committed offset");
        }
        Ok(())
    }

    /// Committed offset of each topic; 0 for topics never committed.
    pub async fn list_committed(&self, topics: &[Topic]) -> Result<BTreeMap<Topic, Offset>> {
        let mut result = BTreeMap::new();
        for topic in topics {
            let offset = self.committed(topic).await?;
            result.insert(topic.clone(), offset);
        }
        Ok(result)
    }

    /// Committed offset of one topic; 0 if never committed.
    pub async fn committed(&self, topic: &Topic) -> Result<Offset> {
        let key = StoreKey::commit(topic).render();
        match self.store.read(&key).await? {
            None => Ok(0),
            Some(value) => value.as_u64().ok_or_else(|| BrokerError::CorruptValue {
                key,
                reason: format!("expected a committed offset, found {value}"),
            }),
        }
    }
}
