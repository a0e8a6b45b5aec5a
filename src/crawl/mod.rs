// src/crawl/mod.rs
pub mod rss;
pub mod types;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::dedup::Deduplicator;
use crate::model::NewsItem;
use crate::retry::RetryPolicy;
use types::{FetchError, NewsSource, SourceRegistry};

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("crawl_items_total", "Items fetched across all sources.");
        describe_counter!("crawl_duplicates_total", "Items dropped by deduplication.");
        describe_counter!(
            "crawl_source_failures_total",
            "Sources that exhausted their retry budget in a batch."
        );
        describe_counter!("crawl_fetch_retries_total", "Transient fetch attempts retried.");
        describe_gauge!("crawl_last_run_ts", "Unix ts when the last crawl finished.");
    });
}

/// Normalize text: entity-decode, strip tags, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, "").to_string();

    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();
    out.trim().to_string()
}

/// Result of one crawl batch. A failed source is absent from `items`
/// but present in `errors`; the batch as a whole always succeeds.
#[derive(Debug, Default)]
pub struct CrawlOutcome {
    pub items: Vec<NewsItem>,
    pub errors: HashMap<String, FetchError>,
    /// Items fetched before deduplication.
    pub fetched: usize,
    /// Items dropped as already seen.
    pub duplicates: usize,
}

/// Fans fetches out across all registered sources under a concurrency
/// bound, retries transient failures, merges results and applies the
/// deduplicator.
pub struct Crawler {
    registry: SourceRegistry,
    dedup: Arc<Deduplicator>,
    policy: RetryPolicy,
    max_in_flight: usize,
}

impl Crawler {
    pub fn new(
        registry: SourceRegistry,
        dedup: Arc<Deduplicator>,
        policy: RetryPolicy,
        max_in_flight: usize,
    ) -> Self {
        Self {
            registry,
            dedup,
            policy,
            max_in_flight: max_in_flight.max(1),
        }
    }

    pub fn source_count(&self) -> usize {
        self.registry.len()
    }

    /// Fetch every source, bounded by `max_in_flight` concurrent
    /// fetches. Within one source the feed order is preserved; across
    /// sources the merge order follows completion and is unspecified.
    pub async fn crawl_all(&self) -> CrawlOutcome {
        ensure_metrics_described();

        let semaphore = Arc::new(Semaphore::new(self.max_in_flight));
        let mut tasks: JoinSet<(String, Result<Vec<NewsItem>, FetchError>)> = JoinSet::new();

        for reg in self.registry.iter() {
            let id = reg.id.clone();
            let source = Arc::clone(&reg.source);
            let policy = self.policy;
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                let result = fetch_with_retry(source.as_ref(), &policy).await;
                (id, result)
            });
        }

        let mut outcome = CrawlOutcome::default();
        let mut merged: Vec<NewsItem> = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((id, Ok(mut items))) => {
                    tracing::debug!(source = %id, count = items.len(), "source fetched");
                    merged.append(&mut items);
                }
                Ok((id, Err(e))) => {
                    tracing::warn!(source = %id, error = %e, "source failed after retries");
                    counter!("crawl_source_failures_total").increment(1);
                    outcome.errors.insert(id, e);
                }
                Err(e) => {
                    tracing::error!(error = %e, "crawl task panicked");
                }
            }
        }

        outcome.fetched = merged.len();
        counter!("crawl_items_total").increment(merged.len() as u64);

        for item in merged {
            match self.dedup.seen(item.fingerprint()).await {
                Ok(true) => {
                    outcome.duplicates += 1;
                    counter!("crawl_duplicates_total").increment(1);
                }
                Ok(false) => outcome.items.push(item),
                Err(e) => {
                    // Dedup store outage must not lose fresh news; fail
                    // open and let the retention sweep catch up later.
                    tracing::warn!(error = %e, "dedup store unavailable, keeping item");
                    outcome.items.push(item);
                }
            }
        }

        gauge!("crawl_last_run_ts").set(chrono::Utc::now().timestamp() as f64);
        outcome
    }
}

/// One source, up to `policy.max_attempts` attempts. Only
/// network-class failures are retried; the backoff schedule comes
/// from the policy.
async fn fetch_with_retry(
    source: &dyn NewsSource,
    policy: &RetryPolicy,
) -> Result<Vec<NewsItem>, FetchError> {
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match source.fetch_latest().await {
            Ok(items) => return Ok(items),
            Err(e) if e.is_retryable() && policy.should_retry(attempt) => {
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    source = source.name(),
                    attempt,
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "transient fetch failure, retrying"
                );
                counter!("crawl_fetch_retries_total").increment(1);
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
