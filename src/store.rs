// src/store.rs
//! Persistence sink for scored articles. Durable storage is an
//! external collaborator behind a narrow append/query interface; the
//! in-memory implementation backs tests and storage-less deployments.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::model::{RiskLevel, ScoredNews};

/// Bodies are truncated to this length before storage.
pub const STORED_BODY_LIMIT: usize = 5000;

/// Flattened article record as persisted (no embedding vector).
#[derive(Debug, Clone, Serialize)]
pub struct StoredArticle {
    pub source: String,
    pub title: String,
    pub body: String,
    pub url: String,
    pub surprise: f32,
    pub final_score: f32,
    pub is_black_swan: bool,
    pub risk_level: RiskLevel,
    pub impact_areas: Vec<String>,
    pub stored_at: DateTime<Utc>,
}

impl StoredArticle {
    pub fn from_scored(scored: &ScoredNews) -> Self {
        Self {
            source: scored.item.source.clone(),
            title: scored.item.title.clone(),
            body: scored.item.body.chars().take(STORED_BODY_LIMIT).collect(),
            url: scored.item.url.clone(),
            surprise: scored.surprise,
            final_score: scored.final_score,
            is_black_swan: scored.is_black_swan,
            risk_level: scored.verdict.risk_level,
            impact_areas: scored.verdict.impact_areas.clone(),
            stored_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait ArticleStore: Send + Sync {
    async fn append(&self, scored: &ScoredNews) -> Result<()>;
    /// Most recent articles, newest first.
    async fn recent(&self, limit: usize) -> Result<Vec<StoredArticle>>;
}

/// Ring-buffered in-memory store.
pub struct MemoryArticleStore {
    inner: Mutex<VecDeque<StoredArticle>>,
    cap: usize,
}

impl MemoryArticleStore {
    pub fn new(cap: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
            cap: cap.max(1),
        }
    }
}

impl Default for MemoryArticleStore {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl ArticleStore for MemoryArticleStore {
    async fn append(&self, scored: &ScoredNews) -> Result<()> {
        let mut buf = self.inner.lock().expect("article store mutex poisoned");
        buf.push_back(StoredArticle::from_scored(scored));
        while buf.len() > self.cap {
            buf.pop_front();
        }
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<StoredArticle>> {
        let buf = self.inner.lock().expect("article store mutex poisoned");
        Ok(buf.iter().rev().take(limit).cloned().collect())
    }
}
