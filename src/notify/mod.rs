// src/notify/mod.rs
pub mod email;
pub mod webhook;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::counter;

use crate::model::{RiskLevel, ScoredNews};

/// Reasoning text included in alerts is capped at this many chars.
const REASONING_LIMIT: usize = 200;

/// The record handed to alert sinks when an item qualifies.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AlertEvent {
    pub source: String,
    pub title: String,
    pub url: String,
    pub final_score: f32,
    pub confidence: f32,
    pub risk_level: RiskLevel,
    pub reasoning: String,
    pub ts: DateTime<Utc>,
}

impl AlertEvent {
    pub fn from_scored(scored: &ScoredNews) -> Self {
        Self {
            source: scored.item.source.clone(),
            title: scored.item.title.clone(),
            url: scored.item.url.clone(),
            final_score: scored.final_score,
            confidence: scored.verdict.confidence_score,
            risk_level: scored.verdict.risk_level,
            reasoning: truncate_chars(&scored.verdict.reasoning, REASONING_LIMIT),
            ts: Utc::now(),
        }
    }
}

fn truncate_chars(s: &str, limit: usize) -> String {
    if s.chars().count() <= limit {
        s.to_string()
    } else {
        s.chars().take(limit).collect()
    }
}

/// Delivery channel for alerts: log line, webhook, email, ...
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn send(&self, event: &AlertEvent) -> Result<()>;
    fn name(&self) -> &'static str;
}

/// Writes the alert to the process log. Always configured, so a run
/// without webhook/email credentials still surfaces alerts somewhere.
pub struct LogAlertSink;

#[async_trait]
impl AlertSink for LogAlertSink {
    async fn send(&self, event: &AlertEvent) -> Result<()> {
        tracing::warn!(
            source = %event.source,
            score = event.final_score,
            confidence = event.confidence,
            risk = ?event.risk_level,
            url = %event.url,
            "BLACK SWAN ALERT: {} - {}",
            event.title,
            event.reasoning
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// Fan-out over all configured sinks. One sink failing is logged and
/// does not stop delivery to the others.
#[derive(Default)]
pub struct AlertMux {
    sinks: Vec<Box<dyn AlertSink>>,
}

impl AlertMux {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Box<dyn AlertSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub async fn send_all(&self, event: &AlertEvent) {
        for sink in &self.sinks {
            if let Err(e) = sink.send(event).await {
                tracing::error!(sink = sink.name(), error = %e, "alert delivery failed");
                counter!("alert_delivery_failures_total").increment(1);
            }
        }
    }
}

/// Threshold gate in front of the sinks. Stateless: repeat suppression
/// across cycles is the deduplicator's job upstream, so anything
/// arriving here is novel within the retention window.
pub struct AlertDispatcher {
    mux: AlertMux,
}

impl AlertDispatcher {
    pub fn new(mux: AlertMux) -> Self {
        Self { mux }
    }

    /// Fire exactly one alert iff the item qualifies. Returns the
    /// emitted event for callers that want to record it.
    pub async fn maybe_alert(&self, scored: &ScoredNews) -> Option<AlertEvent> {
        if !scored.is_black_swan {
            return None;
        }
        let event = AlertEvent::from_scored(scored);
        counter!("alerts_fired_total").increment(1);
        self.mux.send_all(&event).await;
        Some(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ClassifierVerdict, NewsItem};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingSink(Arc<AtomicUsize>);

    #[async_trait]
    impl AlertSink for CountingSink {
        async fn send(&self, _event: &AlertEvent) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn name(&self) -> &'static str {
            "counting"
        }
    }

    fn scored(qualifies: bool, reasoning: &str) -> ScoredNews {
        ScoredNews {
            item: NewsItem {
                source: "test".into(),
                title: "t".into(),
                body: "b".into(),
                url: "https://example.com".into(),
                guid: None,
                published_at: None,
            },
            embedding: vec![],
            surprise: 0.5,
            verdict: ClassifierVerdict {
                is_black_swan: qualifies,
                confidence_score: 0.9,
                reasoning: reasoning.into(),
                impact_areas: vec![],
                risk_level: RiskLevel::High,
            },
            final_score: if qualifies { 0.9 } else { 0.1 },
            is_black_swan: qualifies,
        }
    }

    #[tokio::test]
    async fn qualifying_item_reaches_every_sink_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let mux = AlertMux::new()
            .with_sink(Box::new(CountingSink(count.clone())))
            .with_sink(Box::new(CountingSink(count.clone())));
        let d = AlertDispatcher::new(mux);

        assert!(d.maybe_alert(&scored(true, "r")).await.is_some());
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn non_qualifying_item_is_silent() {
        let count = Arc::new(AtomicUsize::new(0));
        let mux = AlertMux::new().with_sink(Box::new(CountingSink(count.clone())));
        let d = AlertDispatcher::new(mux);

        assert!(d.maybe_alert(&scored(false, "r")).await.is_none());
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn reasoning_is_truncated_in_the_event() {
        let long = "x".repeat(500);
        let d = AlertDispatcher::new(AlertMux::new());
        let ev = d.maybe_alert(&scored(true, &long)).await.unwrap();
        assert_eq!(ev.reasoning.chars().count(), 200);
    }
}
