// src/monitor.rs
//! The monitoring cycle: crawl every source, score what survives
//! deduplication, persist, and raise alerts. One instance composes
//! the pipeline; the scheduler (or the manual API endpoint) drives it.

use anyhow::Result;
use metrics::{describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use serde::Serialize;
use std::sync::Arc;

use crate::crawl::Crawler;
use crate::notify::AlertDispatcher;
use crate::score::Scorer;
use crate::store::ArticleStore;

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("scored_items_total", "Items that completed scoring.");
        describe_counter!("black_swan_items_total", "Items that qualified as black swans.");
        describe_counter!("classifier_fallbacks_total", "Classifier calls resolved by the keyword fallback.");
        describe_counter!("alerts_fired_total", "Alerts dispatched to sinks.");
        describe_counter!("alert_delivery_failures_total", "Sink deliveries that failed.");
        describe_counter!("dedup_hits_total", "Fingerprints already seen within retention.");
        describe_gauge!("cycle_last_run_ts", "Unix ts when the last cycle finished.");
    });
}

/// What one cycle did, for logs and the manual-run endpoint.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleSummary {
    pub fetched: usize,
    pub duplicates: usize,
    pub scored: usize,
    pub score_failures: usize,
    pub black_swans: usize,
    pub source_errors: Vec<String>,
}

pub struct Monitor {
    crawler: Crawler,
    scorer: Scorer,
    store: Arc<dyn ArticleStore>,
    dispatcher: AlertDispatcher,
}

impl Monitor {
    pub fn new(
        crawler: Crawler,
        scorer: Scorer,
        store: Arc<dyn ArticleStore>,
        dispatcher: AlertDispatcher,
    ) -> Self {
        Self {
            crawler,
            scorer,
            store,
            dispatcher,
        }
    }

    pub fn scorer(&self) -> &Scorer {
        &self.scorer
    }

    /// Run one full monitoring cycle. Per-item and per-source failures
    /// degrade the result; they never abort the cycle.
    pub async fn run_cycle(&self) -> Result<CycleSummary> {
        ensure_metrics_described();
        tracing::info!(sources = self.crawler.source_count(), "cycle started");

        let crawl = self.crawler.crawl_all().await;
        let mut summary = CycleSummary {
            fetched: crawl.fetched,
            duplicates: crawl.duplicates,
            source_errors: crawl
                .errors
                .iter()
                .map(|(id, e)| format!("{id}: {e}"))
                .collect(),
            ..CycleSummary::default()
        };

        for item in crawl.items {
            let source = item.source.clone();
            let scored = match self.scorer.score(item).await {
                Ok(s) => s,
                Err(e) => {
                    summary.score_failures += 1;
                    tracing::warn!(source = %source, error = ?e, "scoring failed, item skipped");
                    continue;
                }
            };
            summary.scored += 1;

            // Persistence failure is logged, not re-queued; history and
            // alerting already saw the item.
            if let Err(e) = self.store.append(&scored).await {
                tracing::error!(source = %source, error = ?e, "persisting article failed");
            }

            if self.dispatcher.maybe_alert(&scored).await.is_some() {
                summary.black_swans += 1;
            }
        }

        gauge!("cycle_last_run_ts").set(chrono::Utc::now().timestamp() as f64);
        tracing::info!(
            fetched = summary.fetched,
            duplicates = summary.duplicates,
            scored = summary.scored,
            black_swans = summary.black_swans,
            failed_sources = summary.source_errors.len(),
            "cycle finished"
        );
        Ok(summary)
    }
}
