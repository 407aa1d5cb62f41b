//! Topic-scoped advisory locks.
//!
//! These locks order calls within one broker process only. They carry no
//! weight across processes: offset uniqueness between brokers sharing a store
//! comes from the store's compare-and-swap, never from here.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

use crate::types::Topic;

/// One reader/writer lock per topic, created on first use.
#[derive(Default)]
pub struct TopicLocks {
    locks: Mutex<HashMap<Topic, Arc<RwLock<()>>>>,
}

impl TopicLocks {
    pub fn new() -> Self {
        Self::default()
    }

    async fn lock_for(&self, topic: &Topic) -> Arc<RwLock<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(locks.entry(topic.clone()).or_default())
    }

    /// Exclusive access to one topic.
    pub async fn write(&self, topic: &Topic) -> OwnedRwLockWriteGuard<()> {
        self.lock_for(topic).await.write_owned().await
    }

    /// Shared access to one topic.
    ///
    /// Returns `None` without creating a lock when no writer has used the
    /// topic yet, so reads of unknown topics leave nothing behind.
    pub async fn read(&self, topic: &Topic) -> Option<OwnedRwLockReadGuard<()>> {
        let lock = self.locks.lock().await.get(topic).cloned()?;
        Some(lock.read_owned().await)
    }

    /// Exclusive access to several topics, acquired in sorted order.
    pub async fn write_many<'a, I>(&self, topics: I) -> Vec<OwnedRwLockWriteGuard<()>>
    where
        I: IntoIterator<Item = &'a Topic>,
    {
        let mut guards = Vec::new();
        for topic in sorted_unique(topics) {
            guards.push(self.write(topic).await);
        }
        guards
    }

    /// Shared access to several topics, acquired in sorted order.
    pub async fn read_many<'a, I>(&self, topics: I) -> Vec<OwnedRwLockReadGuard<()>>
    where
        I: IntoIterator<Item = &'a Topic>,
    {
        let mut guards = Vec::new();
        for topic in sorted_unique(topics) {
            if let Some(guard) = self.read(topic).await {
                guards.push(guard);
            }
        }
        guards
    }

    /// Number of topics that have a lock.
    pub async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.locks.lock().await.is_empty()
    }
}

fn sorted_unique<'a>(topics: impl IntoIterator<Item = &'a Topic>) -> Vec<&'a Topic> {
    let mut topics: Vec<&Topic> = topics.into_iter().collect();
    topics.sort();
    topics.dedup();
    topics
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn readers_share_a_topic() {
        let locks = TopicLocks::new();
        let topic = Topic::new("t");
        drop(locks.write(&topic).await);

        let _a = locks.read(&topic).await.unwrap();
        let second = tokio::time::timeout(Duration::from_millis(50), locks.read(&topic)).await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn writer_excludes_readers_of_same_topic() {
        let locks = TopicLocks::new();
        let topic = Topic::new("t");

        let _w = locks.write(&topic).await;
        let blocked = tokio::time::timeout(Duration::from_millis(50), locks.read(&topic)).await;
        assert!(blocked.is_err());
    }

    #[tokio::test]
    async fn different_topics_do_not_contend() {
        let locks = TopicLocks::new();

        let _w = locks.write(&Topic::new("a")).await;
        let other =
            tokio::time::timeout(Duration::from_millis(50), locks.write(&Topic::new("b"))).await;
        assert!(other.is_ok());
        assert_eq!(locks.len().await, 2);
    }

    #[tokio::test]
    async fn reads_of_unknown_topics_create_no_locks() {
        let locks = TopicLocks::new();

        assert!(locks.read(&Topic::new("ghost")).await.is_none());
        let guards = locks
            .read_many([&Topic::new("a"), &Topic::new("b")])
            .await;
        assert!(guards.is_empty());
        assert!(locks.is_empty().await);

        drop(locks.write(&Topic::new("a")).await);
        let guards = locks
            .read_many([&Topic::new("a"), &Topic::new("b")])
            .await;
        assert_eq!(guards.len(), 1);
        assert_eq!(locks.len().await, 1);
    }

    #[tokio::test]
    async fn many_dedups_repeated_topics() {
        let locks = TopicLocks::new();
        let a = Topic::new("a");
        let b = Topic::new("b");

        let guards = locks.write_many([&b, &a, &b]).await;
        assert_eq!(guards.len(), 2);
    }
}
