//! Offset reservation and append.
//!
//! Each topic has a counter key holding the highest reserved offset (absent
//! means -1). Reserving offset `n` is a compare-and-swap of the counter from
//! `n - 1` to `n`; the store's linearizable CAS guarantees at most one caller
//! wins each `n`, across every broker sharing the store.
//!
//! # Reserved but unwritten offsets
//!
//! Reservation and the log write are two separate store calls. If the write
//! fails, the offset stays consumed and is never handed out again. The
//! allocator then tries to fill the slot with a [`LogRecord::Abandoned`]
//! tombstone so pollers can step over it. Tombstones that cannot be written
//! yet stay pending and are retried before the next append to that topic.
//! Log slots are write-once, so a message write that lands after the
//! tombstone is refused and the offset stays abandoned.
//!
//! [`LogRecord::Abandoned`]: crate::log_store::LogRecord::Abandoned

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use kvlog_store::KvStore;
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::{AllocatorConfig, ProbeStrategy};
use crate::error::{BrokerError, Result};
use crate::key::StoreKey;
use crate::log_store::LogStore;
use crate::retry::Backoff;
use crate::types::{Offset, Payload, Topic};

/// Counter value before the first reservation.
const EMPTY_COUNTER: i64 = -1;

/// Assigns offsets and writes appended messages.
pub struct OffsetAllocator {
    store: Arc<dyn KvStore>,
    log: LogStore,
    config: AllocatorConfig,
    /// Last counter value this instance saw per topic. Only a starting guess.
    hints: Mutex<HashMap<Topic, i64>>,
    /// Offsets whose message write failed and whose tombstone is not written yet.
    pending: Mutex<HashMap<Topic, BTreeSet<Offset>>>,
}

impl OffsetAllocator {
    pub fn new(store: Arc<dyn KvStore>, log: LogStore, config: AllocatorConfig) -> Self {
        Self {
            store,
            log,
            config,
            hints: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Append `payload` to `topic` and return its offset.
    ///
    /// On [`BrokerError::Append`] the returned offset is lost for good: it
    /// will not be assigned to any later append.
    pub async fn append(&self, topic: &Topic, payload: Payload) -> Result<Offset> {
        self.reconcile_topic(topic).await;

        let offset = self.reserve(topic).await?;

        if let Err(source) = self.log.put(topic, offset, payload).await {
            warn!(%topic, offset, error = %source, "Log write failed after reservation");
            self.abandon(topic, offset).await;
            return Err(BrokerError::Append {
                topic: topic.clone(),
                offset,
                source,
            });
        }

        debug!(%topic, offset, "Appended message");
        Ok(offset)
    }

    /// Reserve the next offset of `topic` without writing anything.
    pub async fn reserve(&self, topic: &Topic) -> Result<Offset> {
        let key = StoreKey::counter(topic).render();
        let mut backoff = Backoff::new(&self.config);

        let cached = self.hints.lock().await.get(topic).copied();
        let mut last = match cached {
            Some(hint) => hint,
            None => self.read_counter(&key).await?,
        };

        while backoff.start_attempt() {
            let candidate = next_counter(&key, last)?;

            match self
                .store
                .compare_and_swap(&key, json!(last), json!(candidate), true)
                .await
            {
                Ok(()) => {
                    self.hints.lock().await.insert(topic.clone(), candidate);
                    return to_offset(&key, candidate);
                }
                Err(e) if e.is_precondition_failed() => {
                    debug!(
                        %topic,
                        candidate,
                        attempt = backoff.attempts(),
                        "Offset already reserved elsewhere"
                    );

                    let delay = backoff.next_delay();
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }

                    last = match self.config.probe_strategy {
                        ProbeStrategy::Reread => self.read_counter(&key).await?,
                        ProbeStrategy::ProbeForward => candidate,
                    };
                }
                Err(e) => return Err(e.into()),
            }
        }

        warn!(%topic, attempts = backoff.attempts(), "Offset reservation gave up");
        Err(BrokerError::Contention {
            topic: topic.clone(),
            attempts: backoff.attempts(),
        })
    }

    /// Next offset that will be assigned for `topic`.
    pub async fn high_water_mark(&self, topic: &Topic) -> Result<Offset> {
        let key = StoreKey::counter(topic).render();
        let last = self.read_counter(&key).await?;
        to_offset(&key, next_counter(&key, last)?)
    }

    /// Offsets of `topic` still waiting for a tombstone.
    pub async fn pending(&self, topic: &Topic) -> Vec<Offset> {
        self.pending
            .lock()
            .await
            .get(topic)
            .map(|offsets| offsets.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Retry tombstones for every topic. Returns how many remain pending.
    pub async fn reconcile(&self) -> usize {
        let topics: Vec<Topic> = self.pending.lock().await.keys().cloned().collect();

        let mut remaining = 0;
        for topic in &topics {
            remaining += self.reconcile_topic(topic).await;
        }
        remaining
    }

    async fn reconcile_topic(&self, topic: &Topic) -> usize {
        let offsets = self.pending(topic).await;
        if offsets.is_empty() {
            return 0;
        }

        let mut resolved = Vec::new();
        for offset in offsets.iter().copied() {
            match self.log.mark_abandoned(topic, offset).await {
                Ok(tombstoned) => {
                    debug!(%topic, offset, tombstoned, "Reconciled reserved offset");
                    resolved.push(offset);
                }
                Err(error) => {
                    warn!(%topic, offset, %error, "Tombstone write still failing");
                }
            }
        }

        let mut pending = self.pending.lock().await;
        let Some(set) = pending.get_mut(topic) else {
            return 0;
        };
        for offset in &resolved {
            set.remove(offset);
        }
        let remaining = set.len();
        if remaining == 0 {
            pending.remove(topic);
        }
        remaining
    }

    async fn abandon(&self, topic: &Topic, offset: Offset) {
        self.pending
            .lock()
            .await
            .entry(topic.clone())
            .or_default()
            .insert(offset);

        self.reconcile_topic(topic).await;
    }

    async fn read_counter(&self, key: &str) -> Result<i64> {
        match self.store.read(key).await? {
            None => Ok(EMPTY_COUNTER),
            Some(value) => decode_counter(key, &value),
        }
    }
}

fn decode_counter(key: &str, value: &Value) -> Result<i64> {
    match value.as_i64() {
        Some(n) if n >= EMPTY_COUNTER => Ok(n),
        _ => Err(BrokerError::CorruptValue {
            key: key.to_string(),
            reason: format!("expected an offset counter, found {value}"),
        }),
    }
}

fn next_counter(key: &str, last: i64) -> Result<i64> {
    last.checked_add(1).ok_or_else(|| BrokerError::CorruptValue {
        key: key.to_string(),
        reason: format!("offset counter {last} has no successor"),
    })
}

fn to_offset(key: &str, value: i64) -> Result<Offset> {
    Offset::try_from(value).map_err(|_| BrokerError::CorruptValue {
        key: key.to_string(),
        reason: format!("negative offset {value}"),
    })
}
