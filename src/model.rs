//! Core record types passed between pipeline stages.
//!
//! Everything that crosses a collaborator boundary (crawler output,
//! classifier response, scored result) is an explicit typed record so
//! that malformed external data is rejected at the edge, not deep in
//! the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One raw ingested news item, immutable after the crawler builds it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    /// Registry id of the originating source, e.g. "reuters".
    pub source: String,
    pub title: String,
    pub body: String,
    /// Canonical article URL.
    pub url: String,
    /// Source-native unique id when the feed provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
}

impl NewsItem {
    /// Stable dedup key: source-native guid first, canonical URL as
    /// fallback. `None` means the item cannot be deduplicated and is
    /// always treated as novel.
    pub fn fingerprint(&self) -> Option<&str> {
        match self.guid.as_deref() {
            Some(g) if !g.is_empty() => Some(g),
            _ if !self.url.is_empty() => Some(&self.url),
            _ => None,
        }
    }
}

/// Risk bucket assigned by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
    Extreme,
}

/// Structured verdict from the classifier collaborator (or its
/// deterministic fallback). Always complete: parsing enforces the
/// required fields and defaults the rest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierVerdict {
    pub is_black_swan: bool,
    pub confidence_score: f32,
    pub reasoning: String,
    #[serde(default)]
    pub impact_areas: Vec<String>,
    #[serde(default)]
    pub risk_level: RiskLevel,
}

/// Final scored item produced by the scorer; owned by one cycle, then
/// handed to persistence and alerting.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredNews {
    pub item: NewsItem,
    /// Embedding of the body text; opaque fixed-length vector.
    #[serde(skip_serializing)]
    pub embedding: Vec<f32>,
    /// Semantic novelty in [0,1]; 1.0 for the first-ever item.
    pub surprise: f32,
    pub verdict: ClassifierVerdict,
    /// `0.7 * confidence + 0.3 * surprise`, both clamped to [0,1].
    pub final_score: f32,
    /// `final_score >= threshold`.
    pub is_black_swan: bool,
}

/// Clamp into `<0.0, 1.0>`.
pub fn clamp01(x: f32) -> f32 {
    x.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(guid: Option<&str>, url: &str) -> NewsItem {
        NewsItem {
            source: "test".into(),
            title: "t".into(),
            body: "b".into(),
            url: url.into(),
            guid: guid.map(|s| s.to_string()),
            published_at: None,
        }
    }

    #[test]
    fn fingerprint_prefers_guid_then_url() {
        assert_eq!(
            item(Some("g-1"), "https://x/a").fingerprint(),
            Some("g-1")
        );
        assert_eq!(item(None, "https://x/a").fingerprint(), Some("https://x/a"));
        assert_eq!(item(Some(""), "https://x/a").fingerprint(), Some("https://x/a"));
        assert_eq!(item(None, "").fingerprint(), None);
    }

    #[test]
    fn risk_level_uses_snake_case_wire_format() {
        let v: RiskLevel = serde_json::from_str("\"extreme\"").unwrap();
        assert_eq!(v, RiskLevel::Extreme);
        assert_eq!(serde_json::to_string(&RiskLevel::Medium).unwrap(), "\"medium\"");
    }
}
