// src/crawl/types.rs
use async_trait::async_trait;
use std::sync::Arc;

use crate::model::NewsItem;

/// Failure modes of one fetch attempt. Only network-class failures
/// (timeouts, connection errors) are retried; HTTP status and parse
/// failures surface immediately.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),
    #[error("unexpected HTTP status {status}")]
    Status { status: u16 },
    #[error("malformed payload: {0}")]
    Parse(String),
}

impl FetchError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Network(_))
    }

    pub fn from_reqwest(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            FetchError::Status {
                status: status.as_u16(),
            }
        } else {
            // timeouts, DNS, connect and body-read failures
            FetchError::Network(e.to_string())
        }
    }
}

/// One registered news source: fetches its latest batch of items.
/// Per-source payload parsing lives behind this trait; the aggregator
/// only sees typed items or a typed failure.
#[async_trait]
pub trait NewsSource: Send + Sync {
    async fn fetch_latest(&self) -> Result<Vec<NewsItem>, FetchError>;
    fn name(&self) -> &str;
}

/// Static mapping of source id → fetch capability + priority.
#[derive(Clone)]
pub struct RegisteredSource {
    pub id: String,
    pub priority: u8,
    pub source: Arc<dyn NewsSource>,
}

#[derive(Clone, Default)]
pub struct SourceRegistry {
    entries: Vec<RegisteredSource>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, id: impl Into<String>, priority: u8, source: Arc<dyn NewsSource>) {
        self.entries.push(RegisteredSource {
            id: id.into(),
            priority,
            source,
        });
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredSource> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
