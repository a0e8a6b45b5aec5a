// src/score/mod.rs
pub mod classifier;
pub mod embedding;
pub mod history;

use anyhow::{Context, Result};
use metrics::counter;
use std::sync::Arc;

use crate::model::{clamp01, NewsItem, ScoredNews};
use classifier::{fallback_verdict, Classifier, ClassifyContext};
use embedding::{cosine_similarity, EmbeddingClient};
use history::{HistoryEntry, HistoryWindow};

/// How many of the most recent history entries feed the surprise
/// computation.
pub const SURPRISE_WINDOW: usize = 100;

/// Weighted fusion of classifier confidence and semantic surprise.
/// Both inputs are clamped, so the result stays in [0,1].
pub fn fuse(confidence: f32, surprise: f32) -> f32 {
    0.7 * clamp01(confidence) + 0.3 * clamp01(surprise)
}

/// Scores one item at a time: embedding → surprise → classifier (with
/// fallback) → fusion → history append. History mutation is serialized
/// through the window's own lock, so concurrent callers still produce
/// a deterministic append/evict order.
pub struct Scorer {
    embedder: Arc<dyn EmbeddingClient>,
    classifier: Arc<dyn Classifier>,
    history: Arc<HistoryWindow>,
    threshold: f32,
}

impl Scorer {
    pub fn new(
        embedder: Arc<dyn EmbeddingClient>,
        classifier: Arc<dyn Classifier>,
        history: Arc<HistoryWindow>,
        threshold: f32,
    ) -> Self {
        Self {
            embedder,
            classifier,
            history,
            threshold,
        }
    }

    pub fn history(&self) -> &Arc<HistoryWindow> {
        &self.history
    }

    /// Semantic novelty of `embedding` against the recent window.
    /// An empty history makes the first item maximally surprising.
    fn surprise_score(&self, embedding: &[f32]) -> f32 {
        let recent = self.history.recent_embeddings(SURPRISE_WINDOW);
        if recent.is_empty() {
            return 1.0;
        }
        let avg: f32 = recent
            .iter()
            .map(|h| cosine_similarity(embedding, h))
            .sum::<f32>()
            / recent.len() as f32;
        clamp01(1.0 - avg)
    }

    pub async fn score(&self, item: NewsItem) -> Result<ScoredNews> {
        let embedding = self
            .embedder
            .embed(&item.body)
            .await
            .with_context(|| format!("embedding item from {}", item.source))?;

        let surprise = self.surprise_score(&embedding);

        let context = if self.history.is_empty() {
            None
        } else {
            Some(ClassifyContext {
                history_len: self.history.len(),
                avg_surprise: self.history.average_surprise(),
            })
        };

        let verdict = match self.classifier.classify(&item.title, &item.body, context).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(source = %item.source, error = %e, "classifier unavailable, using fallback");
                counter!("classifier_fallbacks_total").increment(1);
                fallback_verdict(&item.title, &item.body)
            }
        };

        let final_score = fuse(verdict.confidence_score, surprise);
        let is_black_swan = final_score >= self.threshold;

        self.history.push(HistoryEntry {
            embedding: embedding.clone(),
            surprise,
            final_score,
            ts: chrono::Utc::now(),
        });

        counter!("scored_items_total").increment(1);
        if is_black_swan {
            counter!("black_swan_items_total").increment(1);
        }

        Ok(ScoredNews {
            item,
            embedding,
            surprise,
            verdict,
            final_score,
            is_black_swan,
        })
    }
}
