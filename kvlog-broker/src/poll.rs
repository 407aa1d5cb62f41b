//! Contiguous log scans.

use std::collections::{BTreeMap, HashMap};

use tracing::trace;

use crate::config::PollConfig;
use crate::error::Result;
use crate::log_store::{LogRecord, LogStore};
use crate::types::{LogEntry, Offset, Topic};

/// Reads runs of entries starting at caller-supplied offsets.
///
/// A missing offset ends the scan: appends are dense, so the first hole is
/// the end of the log. Tombstoned offsets are stepped over silently. A poll
/// racing an in-flight append may simply not see it yet.
#[derive(Clone)]
pub struct PollEngine {
    log: LogStore,
    config: PollConfig,
}

impl PollEngine {
    pub fn new(log: LogStore, config: PollConfig) -> Self {
        Self { log, config }
    }

    /// Poll every requested topic from its start offset.
    pub async fn poll(
        &self,
        starts: &HashMap<Topic, Offset>,
    ) -> Result<BTreeMap<Topic, Vec<LogEntry>>> {
        let mut result = BTreeMap::new();
        for (topic, start) in starts {
            let entries = self.scan(topic, *start).await?;
            result.insert(topic.clone(), entries);
        }
        Ok(result)
    }

    /// Entries of one topic from `start` up to the first missing offset.
    pub async fn scan(&self, topic: &Topic, start: Offset) -> Result<Vec<LogEntry>> {
        let limit = self.config.max_messages_per_topic.unwrap_or(usize::MAX);
        let mut entries = Vec::new();
        let mut offset = start;

        while entries.len() < limit {
            match self.log.get(topic, offset).await? {
                Some(LogRecord::Message(payload)) => entries.push(LogEntry::new(offset, payload)),
                Some(LogRecord::Abandoned) => trace!(%topic, offset, "Skipping abandoned offset"),
                None => break,
            }
            offset += 1;
        }

        trace!(%topic, start, count = entries.len(), "Scanned log");
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvlog_store::{KvStore, MemoryKvStore};
    use serde_json::json;
    use std::sync::Arc;

    async fn engine_with(topic: &Topic, messages: &[&str], config: PollConfig) -> PollEngine {
        let store: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        let log = LogStore::new(store);
        for (offset, message) in messages.iter().enumerate() {
            log.put(topic, offset as Offset, json!(message)).await.unwrap();
        }
        PollEngine::new(log, config)
    }

    fn offsets(entries: &[LogEntry]) -> Vec<Offset> {
        entries.iter().map(|e| e.offset).collect()
    }

    #[tokio::test]
    async fn scan_from_zero_returns_everything() {
        let topic = Topic::new("t");
        let engine = engine_with(&topic, &["m0", "m1", "m2"], PollConfig::default()).await;

        let entries = engine.scan(&topic, 0).await.unwrap();
        assert_eq!(
            entries,
            vec![
                LogEntry::new(0, json!("m0")),
                LogEntry::new(1, json!("m1")),
                LogEntry::new(2, json!("m2")),
            ]
        );
    }

    #[tokio::test]
    async fn scan_from_middle() {
        let topic = Topic::new("t");
        let engine = engine_with(&topic, &["m0", "m1", "m2"], PollConfig::default()).await;

        let entries = engine.scan(&topic, 2).await.unwrap();
        assert_eq!(entries, vec![LogEntry::new(2, json!("m2"))]);
    }

    #[tokio::test]
    async fn scan_past_end_is_empty() {
        let topic = Topic::new("t");
        let engine = engine_with(&topic, &["m0", "m1", "m2"], PollConfig::default()).await;

        assert!(engine.scan(&topic, 5).await.unwrap().is_empty());
        assert!(engine.scan(&topic, 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn scan_stops_at_first_hole() {
        let topic = Topic::new("t");
        let engine = engine_with(&topic, &["m0"], PollConfig::default()).await;
        engine.log.put(&topic, 2, json!("m2")).await.unwrap();

        assert_eq!(offsets(&engine.scan(&topic, 0).await.unwrap()), vec![0]);
    }

    #[tokio::test]
    async fn scan_steps_over_tombstones() {
        let topic = Topic::new("t");
        let engine = engine_with(&topic, &["m0"], PollConfig::default()).await;
        engine.log.mark_abandoned(&topic, 1).await.unwrap();
        engine.log.put(&topic, 2, json!("m2")).await.unwrap();

        assert_eq!(offsets(&engine.scan(&topic, 0).await.unwrap()), vec![0, 2]);
    }

    #[tokio::test]
    async fn limit_caps_entries_per_topic() {
        let topic = Topic::new("t");
        let config = PollConfig {
            max_messages_per_topic: Some(2),
        };
        let engine = engine_with(&topic, &["m0", "m1", "m2"], config).await;

        assert_eq!(offsets(&engine.scan(&topic, 0).await.unwrap()), vec![0, 1]);
        assert_eq!(offsets(&engine.scan(&topic, 2).await.unwrap()), vec![2]);
    }

    #[tokio::test]
    async fn poll_covers_every_requested_topic() {
        let a = Topic::new("a");
        let engine = engine_with(&a, &["a0", "a1"], PollConfig::default()).await;

        let starts = HashMap::from([(a.clone(), 1), (Topic::new("unknown"), 0)]);
        let result = engine.poll(&starts).await.unwrap();

        assert_eq!(result.len(), 2);
        assert_eq!(result[&a], vec![LogEntry::new(1, json!("a1"))]);
        assert!(result[&Topic::new("unknown")].is_empty());
    }
}
