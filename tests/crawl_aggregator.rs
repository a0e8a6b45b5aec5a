// tests/crawl_aggregator.rs
//
// Aggregator behavior with instrumented mock sources:
// - concurrency never exceeds the configured cap
// - transient failures retry, permanent ones do not
// - a failed source is reported without sinking the batch
// - duplicate fingerprints collapse to one item

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use black_swan_monitor::crawl::types::{FetchError, NewsSource, SourceRegistry};
use black_swan_monitor::crawl::Crawler;
use black_swan_monitor::dedup::{Deduplicator, MemoryDedupStore};
use black_swan_monitor::model::NewsItem;
use black_swan_monitor::retry::RetryPolicy;

fn item(source: &str, guid: &str) -> NewsItem {
    NewsItem {
        source: source.into(),
        title: format!("{source} headline {guid}"),
        body: "body".into(),
        url: format!("https://{source}.example.com/{guid}"),
        guid: Some(guid.into()),
        published_at: None,
    }
}

/// Counts in-flight fetches and remembers the high-water mark.
struct SlowSource {
    id: String,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

#[async_trait]
impl NewsSource for SlowSource {
    async fn fetch_latest(&self) -> Result<Vec<NewsItem>, FetchError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(40)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(vec![item(&self.id, &format!("{}-1", self.id))])
    }

    fn name(&self) -> &str {
        &self.id
    }
}

/// Fails with the given error class, counting attempts.
struct FailingSource {
    id: String,
    error_kind: &'static str,
    attempts: Arc<AtomicU32>,
}

#[async_trait]
impl NewsSource for FailingSource {
    async fn fetch_latest(&self) -> Result<Vec<NewsItem>, FetchError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(match self.error_kind {
            "network" => FetchError::Network("connection reset".into()),
            "status" => FetchError::Status { status: 503 },
            _ => FetchError::Parse("unexpected token".into()),
        })
    }

    fn name(&self) -> &str {
        &self.id
    }
}

struct FixedSource {
    id: String,
    items: Vec<NewsItem>,
}

#[async_trait]
impl NewsSource for FixedSource {
    async fn fetch_latest(&self) -> Result<Vec<NewsItem>, FetchError> {
        Ok(self.items.clone())
    }

    fn name(&self) -> &str {
        &self.id
    }
}

fn fast_policy() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(4))
}

fn dedup() -> Arc<Deduplicator> {
    Arc::new(Deduplicator::with_defaults(Arc::new(MemoryDedupStore::new())))
}

#[tokio::test]
async fn fetches_never_exceed_the_concurrency_cap() {
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut registry = SourceRegistry::new();
    for i in 0..12 {
        let id = format!("src-{i}");
        registry.register(
            id.clone(),
            1,
            Arc::new(SlowSource {
                id,
                in_flight: in_flight.clone(),
                peak: peak.clone(),
            }),
        );
    }

    let crawler = Crawler::new(registry, dedup(), fast_policy(), 5);
    let outcome = crawler.crawl_all().await;

    assert_eq!(outcome.items.len(), 12);
    assert!(outcome.errors.is_empty());
    assert!(
        peak.load(Ordering::SeqCst) <= 5,
        "peak concurrency {} exceeded cap",
        peak.load(Ordering::SeqCst)
    );
}

#[tokio::test]
async fn transient_failures_use_the_whole_retry_budget() {
    let attempts = Arc::new(AtomicU32::new(0));
    let mut registry = SourceRegistry::new();
    registry.register(
        "flaky",
        1,
        Arc::new(FailingSource {
            id: "flaky".into(),
            error_kind: "network",
            attempts: attempts.clone(),
        }),
    );

    let crawler = Crawler::new(registry, dedup(), fast_policy(), 5);
    let outcome = crawler.crawl_all().await;

    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert!(outcome.items.is_empty());
    assert!(matches!(
        outcome.errors.get("flaky"),
        Some(FetchError::Network(_))
    ));
}

#[tokio::test]
async fn malformed_payloads_fail_without_retry() {
    let attempts = Arc::new(AtomicU32::new(0));
    let mut registry = SourceRegistry::new();
    registry.register(
        "broken",
        1,
        Arc::new(FailingSource {
            id: "broken".into(),
            error_kind: "parse",
            attempts: attempts.clone(),
        }),
    );

    let crawler = Crawler::new(registry, dedup(), fast_policy(), 5);
    let outcome = crawler.crawl_all().await;

    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert!(outcome.errors.contains_key("broken"));
}

#[tokio::test]
async fn one_dead_source_does_not_sink_the_batch() {
    let mut registry = SourceRegistry::new();
    registry.register(
        "dead",
        1,
        Arc::new(FailingSource {
            id: "dead".into(),
            error_kind: "network",
            attempts: Arc::new(AtomicU32::new(0)),
        }),
    );
    registry.register(
        "alive",
        1,
        Arc::new(FixedSource {
            id: "alive".into(),
            items: vec![item("alive", "a-1"), item("alive", "a-2")],
        }),
    );

    let crawler = Crawler::new(registry, dedup(), fast_policy(), 5);
    let outcome = crawler.crawl_all().await;

    assert_eq!(outcome.items.len(), 2);
    assert_eq!(outcome.errors.len(), 1);
    assert!(outcome.errors.contains_key("dead"));
    // within-source order preserved
    assert_eq!(outcome.items[0].guid.as_deref(), Some("a-1"));
    assert_eq!(outcome.items[1].guid.as_deref(), Some("a-2"));
}

#[tokio::test]
async fn identical_fingerprints_collapse_to_one_item() {
    let mut registry = SourceRegistry::new();
    registry.register(
        "wire-a",
        1,
        Arc::new(FixedSource {
            id: "wire-a".into(),
            items: vec![item("wire-a", "X")],
        }),
    );
    registry.register(
        "wire-b",
        1,
        Arc::new(FixedSource {
            id: "wire-b".into(),
            items: vec![item("wire-b", "X")],
        }),
    );

    let crawler = Crawler::new(registry, dedup(), fast_policy(), 5);
    let outcome = crawler.crawl_all().await;

    let with_x: Vec<_> = outcome
        .items
        .iter()
        .filter(|i| i.guid.as_deref() == Some("X"))
        .collect();
    assert_eq!(with_x.len(), 1);
    assert_eq!(outcome.duplicates, 1);
    assert_eq!(outcome.fetched, 2);
}

#[tokio::test]
async fn items_without_fingerprint_are_always_kept() {
    let no_fp = NewsItem {
        source: "anon".into(),
        title: "untraceable".into(),
        body: "b".into(),
        url: String::new(),
        guid: None,
        published_at: None,
    };
    let mut registry = SourceRegistry::new();
    registry.register(
        "anon",
        1,
        Arc::new(FixedSource {
            id: "anon".into(),
            items: vec![no_fp.clone(), no_fp],
        }),
    );

    let crawler = Crawler::new(registry, dedup(), fast_policy(), 5);
    let outcome = crawler.crawl_all().await;
    // both copies survive: nothing to deduplicate on
    assert_eq!(outcome.items.len(), 2);
    assert_eq!(outcome.duplicates, 0);
}
