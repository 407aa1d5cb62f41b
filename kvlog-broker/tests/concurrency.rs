//! Offset allocation under concurrent appenders.
//!
//! Several `LogService` instances share one store, the way separate broker
//! nodes share one key-value service. Every append must get a distinct offset
//! and the offsets of a topic must stay dense.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use kvlog_broker::{BrokerConfig, LogEntry, LogService, Offset, ProbeStrategy, Topic};
use kvlog_store::MemoryKvStore;
use serde_json::json;
use tokio::task::JoinSet;

fn patient_config() -> BrokerConfig {
    BrokerConfig::default()
        .with_max_attempts(10_000)
        .with_backoff(Duration::ZERO, Duration::ZERO)
}

fn brokers(
    store: &Arc<MemoryKvStore>,
    count: usize,
    config: BrokerConfig,
) -> Vec<Arc<LogService>> {
    (0..count)
        .map(|_| Arc::new(LogService::new(store.clone(), config.clone()).unwrap()))
        .collect()
}

async fn append_all(brokers: &[Arc<LogService>], topic: &Topic, per_broker: usize) -> Vec<Offset> {
    let mut tasks = JoinSet::new();
    for (b, broker) in brokers.iter().enumerate() {
        for i in 0..per_broker {
            let broker = Arc::clone(broker);
            let topic = topic.clone();
            tasks.spawn(async move { broker.send(&topic, json!(format!("{b}-{i}"))).await });
        }
    }

    let mut offsets = Vec::new();
    while let Some(result) = tasks.join_next().await {
        offsets.push(result.unwrap().unwrap());
    }
    offsets.sort_unstable();
    offsets
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_brokers_assign_dense_unique_offsets() {
    let store = Arc::new(MemoryKvStore::new());
    let brokers = brokers(&store, 4, patient_config());
    let topic = Topic::new("k");

    let offsets = append_all(&brokers, &topic, 25).await;

    assert_eq!(offsets, (0..100).collect::<Vec<Offset>>());
    assert_eq!(
        brokers[0].allocator().high_water_mark(&topic).await.unwrap(),
        100
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn slow_store_still_yields_unique_offsets() {
    let store = Arc::new(MemoryKvStore::new().with_latency(Duration::from_millis(1)));
    let brokers = brokers(&store, 3, patient_config());
    let topic = Topic::new("slow");

    let offsets = append_all(&brokers, &topic, 10).await;

    assert_eq!(offsets, (0..30).collect::<Vec<Offset>>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn legacy_probe_strategy_is_also_unique() {
    let store = Arc::new(MemoryKvStore::new());
    let config = patient_config().with_probe_strategy(ProbeStrategy::ProbeForward);
    let brokers = brokers(&store, 3, config);
    let topic = Topic::new("probe");

    let offsets = append_all(&brokers, &topic, 20).await;

    assert_eq!(offsets, (0..60).collect::<Vec<Offset>>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn every_appended_message_is_polled_once() {
    let store = Arc::new(MemoryKvStore::new());
    let brokers = brokers(&store, 4, patient_config());
    let topic = Topic::new("k");

    append_all(&brokers, &topic, 10).await;

    let polled = brokers[3]
        .poll(&HashMap::from([(topic.clone(), 0)]))
        .await
        .unwrap();
    let entries = &polled[&topic];
    assert_eq!(entries.len(), 40);

    let payloads: BTreeSet<String> = entries
        .iter()
        .map(|entry| entry.payload.as_str().unwrap().to_string())
        .collect();
    assert_eq!(payloads.len(), 40);
    for (expected, entry) in entries.iter().enumerate() {
        assert_eq!(entry.offset, expected as Offset);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn topics_do_not_share_offsets() {
    let store = Arc::new(MemoryKvStore::new());
    let brokers = brokers(&store, 2, patient_config());

    let topic_a = Topic::new("a");
    let topic_b = Topic::new("b");
    let (a, b) = tokio::join!(
        append_all(&brokers, &topic_a, 10),
        append_all(&brokers, &topic_b, 10),
    );

    assert_eq!(a, (0..20).collect::<Vec<Offset>>());
    assert_eq!(b, (0..20).collect::<Vec<Offset>>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn polls_during_appends_see_growing_dense_prefixes() {
    let store = Arc::new(MemoryKvStore::new().with_latency(Duration::from_micros(200)));
    let writers = brokers(&store, 3, patient_config());
    let reader = LogService::new(store.clone(), patient_config()).unwrap();
    let topic = Topic::new("live");

    let appends = {
        let writers = writers.clone();
        let topic = topic.clone();
        tokio::spawn(async move { append_all(&writers, &topic, 20).await })
    };

    let start: Offset = 3;
    let mut seen: Vec<LogEntry> = Vec::new();
    loop {
        let finished = appends.is_finished();

        let mut polled = reader
            .poll(&HashMap::from([(topic.clone(), start)]))
            .await
            .unwrap();
        let entries = polled.remove(&topic).unwrap();

        let offsets: Vec<Offset> = entries.iter().map(|entry| entry.offset).collect();
        let dense: Vec<Offset> = (start..start + entries.len() as Offset).collect();
        assert_eq!(offsets, dense, "poll skipped an offset");
        assert!(entries.len() >= seen.len(), "poll went backwards");
        assert_eq!(entries[..seen.len()], seen[..], "observed entry changed");

        seen = entries;
        if finished {
            break;
        }
    }

    assert_eq!(appends.await.unwrap(), (0..60).collect::<Vec<Offset>>());
    assert_eq!(seen.len(), 57);
}
