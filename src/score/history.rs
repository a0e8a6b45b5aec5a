// src/score/history.rs
//! Bounded rolling context of past scored items, used only to compute
//! surprise for future items. Process-local and non-persistent: a
//! restart starts cold and the first item scores as maximally novel.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub embedding: Vec<f32>,
    pub surprise: f32,
    pub final_score: f32,
    pub ts: DateTime<Utc>,
}

/// Fixed-capacity ring buffer with single-writer discipline: all
/// mutation goes through the internal mutex, so entries land in the
/// order items finished scoring and eviction is strictly oldest-first.
#[derive(Debug)]
pub struct HistoryWindow {
    inner: Mutex<VecDeque<HistoryEntry>>,
    cap: usize,
}

impl HistoryWindow {
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(cap.min(10_000))),
            cap: cap.max(1),
        }
    }

    pub fn push(&self, entry: HistoryEntry) {
        let mut buf = self.inner.lock().expect("history mutex poisoned");
        buf.push_back(entry);
        while buf.len() > self.cap {
            buf.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("history mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Embeddings of the most recent `n` entries, oldest first.
    pub fn recent_embeddings(&self, n: usize) -> Vec<Vec<f32>> {
        let buf = self.inner.lock().expect("history mutex poisoned");
        let start = buf.len().saturating_sub(n);
        buf.iter().skip(start).map(|e| e.embedding.clone()).collect()
    }

    /// Mean surprise across the whole window; 0.0 when empty.
    pub fn average_surprise(&self) -> f32 {
        let buf = self.inner.lock().expect("history mutex poisoned");
        if buf.is_empty() {
            return 0.0;
        }
        buf.iter().map(|e| e.surprise).sum::<f32>() / buf.len() as f32
    }

    pub fn snapshot_last_n(&self, n: usize) -> Vec<HistoryEntry> {
        let buf = self.inner.lock().expect("history mutex poisoned");
        let start = buf.len().saturating_sub(n);
        buf.iter().skip(start).cloned().collect()
    }

    /// Drop all entries (cold restart semantics on demand).
    pub fn reset(&self) {
        self.inner.lock().expect("history mutex poisoned").clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(score: f32) -> HistoryEntry {
        HistoryEntry {
            embedding: vec![score],
            surprise: score,
            final_score: score,
            ts: Utc::now(),
        }
    }

    #[test]
    fn never_exceeds_cap_and_evicts_oldest_first() {
        let w = HistoryWindow::with_capacity(1000);
        for i in 0..1001 {
            w.push(entry(i as f32));
        }
        assert_eq!(w.len(), 1000);
        let snap = w.snapshot_last_n(1000);
        // entry 0 evicted; order preserved
        assert_eq!(snap.first().unwrap().final_score, 1.0);
        assert_eq!(snap.last().unwrap().final_score, 1000.0);
    }

    #[test]
    fn recent_embeddings_takes_the_tail() {
        let w = HistoryWindow::with_capacity(10);
        for i in 0..5 {
            w.push(entry(i as f32));
        }
        let recent = w.recent_embeddings(2);
        assert_eq!(recent, vec![vec![3.0], vec![4.0]]);
        // asking for more than we have returns all
        assert_eq!(w.recent_embeddings(100).len(), 5);
    }

    #[test]
    fn average_surprise_and_reset() {
        let w = HistoryWindow::with_capacity(10);
        assert_eq!(w.average_surprise(), 0.0);
        w.push(entry(0.2));
        w.push(entry(0.8));
        assert!((w.average_surprise() - 0.5).abs() < 1e-6);
        w.reset();
        assert!(w.is_empty());
    }
}
