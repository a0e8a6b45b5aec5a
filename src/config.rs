// src/config.rs
//! Process configuration: TOML file with env override for the path,
//! serde defaults for every field so a missing file still yields a
//! runnable config.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

const ENV_PATH: &str = "MONITOR_CONFIG_PATH";
const DEFAULT_PATH: &str = "config/monitor.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Main crawl cycle period.
    pub crawl_interval_minutes: u64,
    /// Fast re-check period, active only inside working hours.
    pub quick_check_interval_minutes: u64,
    /// Daily window for the quick-check job, "HH:MM" inclusive start,
    /// exclusive end hour.
    pub working_hours_start: String,
    pub working_hours_end: String,

    /// Fused score at or above which an item qualifies as a black swan.
    pub black_swan_threshold: f32,

    /// Crawl fan-out bound: fetches in flight at once.
    pub max_concurrent_fetches: usize,
    /// Attempts per source, transient failures only.
    pub max_retries: u32,
    pub fetch_timeout_secs: u64,
    pub user_agent: String,

    /// Dedup fingerprints are remembered this long.
    pub dedup_retention_days: u64,
    /// A cleanup sweep runs every Nth `seen` call.
    pub dedup_cleanup_every: u64,

    /// Rolling history of scored embeddings.
    pub history_cap: usize,

    pub sources: Vec<SourceEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceEntry {
    pub id: String,
    pub url: String,
    #[serde(default = "default_priority")]
    pub priority: u8,
}

fn default_priority() -> u8 {
    1
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            crawl_interval_minutes: 30,
            quick_check_interval_minutes: 5,
            working_hours_start: "06:00".to_string(),
            working_hours_end: "22:00".to_string(),
            black_swan_threshold: 0.7,
            max_concurrent_fetches: 5,
            max_retries: 3,
            fetch_timeout_secs: 30,
            user_agent: "BlackSwanMonitor/1.0".to_string(),
            dedup_retention_days: 30,
            dedup_cleanup_every: 100,
            history_cap: 1000,
            sources: Vec::new(),
        }
    }
}

impl AppConfig {
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    /// Load using env var + fallbacks:
    /// 1) $MONITOR_CONFIG_PATH
    /// 2) config/monitor.toml
    /// 3) built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_PATH) {
            return Self::load_from(&PathBuf::from(p));
        }
        let default = PathBuf::from(DEFAULT_PATH);
        if default.exists() {
            return Self::load_from(&default);
        }
        Ok(Self::default())
    }

    /// Start/end hours of the quick-check window, e.g. (6, 22).
    /// Malformed values fall back to the full day.
    pub fn working_hours_span(&self) -> (u8, u8) {
        let hour = |s: &str| -> Option<u8> {
            s.split(':').next()?.parse::<u8>().ok().filter(|h| *h < 24)
        };
        match (
            hour(&self.working_hours_start),
            hour(&self.working_hours_end),
        ) {
            (Some(a), Some(b)) => (a, b),
            _ => (0, 23),
        }
    }
}
