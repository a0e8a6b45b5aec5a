//! Black-swan news monitor, binary entrypoint.
//! Wires the pipeline (crawler → scorer → store → alerts), registers
//! the recurring jobs, and serves the status API.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use black_swan_monitor::api::{create_router, AppState};
use black_swan_monitor::config::AppConfig;
use black_swan_monitor::crawl::rss::RssSource;
use black_swan_monitor::crawl::types::SourceRegistry;
use black_swan_monitor::crawl::Crawler;
use black_swan_monitor::dedup::{DedupStore, Deduplicator, MemoryDedupStore, RedisDedupStore};
use black_swan_monitor::metrics::Metrics;
use black_swan_monitor::monitor::Monitor;
use black_swan_monitor::notify::webhook::WebhookAlertSink;
use black_swan_monitor::notify::{email::EmailAlertSink, AlertDispatcher, AlertMux, LogAlertSink};
use black_swan_monitor::retry::RetryPolicy;
use black_swan_monitor::sched::{JobSpec, Scheduler, Trigger};
use black_swan_monitor::score::classifier::LlmClassifier;
use black_swan_monitor::score::embedding::HttpEmbeddingClient;
use black_swan_monitor::score::history::HistoryWindow;
use black_swan_monitor::score::Scorer;
use black_swan_monitor::store::MemoryArticleStore;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .compact()
        .init();
}

async fn build_dedup() -> Arc<dyn DedupStore> {
    match std::env::var("REDIS_URL") {
        Ok(url) => match RedisDedupStore::connect(&url, "black_swan:seen").await {
            Ok(store) => {
                tracing::info!("dedup store: redis");
                return Arc::new(store);
            }
            Err(e) => {
                tracing::error!(error = ?e, "redis unavailable, falling back to in-memory dedup");
            }
        },
        Err(_) => {
            tracing::warn!("REDIS_URL not set, dedup is process-local and resets on restart");
        }
    }
    Arc::new(MemoryDedupStore::new())
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let metrics = Metrics::init();
    let cfg = AppConfig::load_default().context("loading configuration")?;
    tracing::info!(
        sources = cfg.sources.len(),
        threshold = cfg.black_swan_threshold,
        "configuration loaded"
    );

    // --- Deduplication ---
    let store = build_dedup().await;
    let dedup = Arc::new(Deduplicator::new(
        store,
        Duration::from_secs(cfg.dedup_retention_days * 24 * 3600),
        cfg.dedup_cleanup_every,
    ));

    // --- Sources ---
    let mut registry = SourceRegistry::new();
    for entry in &cfg.sources {
        registry.register(
            entry.id.clone(),
            entry.priority,
            Arc::new(RssSource::new(
                entry.id.clone(),
                entry.url.clone(),
                &cfg.user_agent,
                Duration::from_secs(cfg.fetch_timeout_secs),
            )),
        );
    }
    if registry.is_empty() {
        tracing::warn!("no sources configured, cycles will fetch nothing");
    }

    let crawler = Crawler::new(
        registry,
        Arc::clone(&dedup),
        RetryPolicy {
            max_attempts: cfg.max_retries,
            ..RetryPolicy::default()
        },
        cfg.max_concurrent_fetches,
    );

    // --- Scoring ---
    let embedder = HttpEmbeddingClient::from_env().context("configuring embedding client")?;
    let classifier = match LlmClassifier::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(error = ?e, "classifier not configured, keyword fallback only");
            LlmClassifier::new(
                "https://api.openai.com/v1/chat/completions",
                "",
                "gpt-4o-mini",
                RetryPolicy::default(),
            )
        }
    };
    let history = Arc::new(HistoryWindow::with_capacity(cfg.history_cap));
    let scorer = Scorer::new(
        Arc::new(embedder),
        Arc::new(classifier),
        history,
        cfg.black_swan_threshold,
    );

    // --- Alerts ---
    let mut mux = AlertMux::new().with_sink(Box::new(LogAlertSink));
    if let Some(webhook) = WebhookAlertSink::from_env() {
        tracing::info!("alert sink: webhook");
        mux = mux.with_sink(Box::new(webhook));
    }
    match EmailAlertSink::from_env() {
        Ok(email) => {
            tracing::info!("alert sink: email");
            mux = mux.with_sink(Box::new(email));
        }
        Err(e) => tracing::debug!(reason = %e, "email alerts disabled"),
    }

    // --- Pipeline + persistence ---
    let articles = Arc::new(MemoryArticleStore::default());
    let monitor = Arc::new(Monitor::new(
        crawler,
        scorer,
        articles.clone(),
        AlertDispatcher::new(mux),
    ));

    // --- Jobs ---
    let scheduler = Arc::new(Scheduler::new());
    {
        let m = Arc::clone(&monitor);
        scheduler.register(
            JobSpec::new(
                "crawl-cycle",
                Trigger::Interval(Duration::from_secs(cfg.crawl_interval_minutes * 60)),
            ),
            move || {
                let m = Arc::clone(&m);
                async move { m.run_cycle().await.map(|_| ()) }
            },
        )?;
    }
    {
        let (start, end) = cfg.working_hours_span();
        let m = Arc::clone(&monitor);
        scheduler.register(
            JobSpec::new(
                "quick-scan",
                Trigger::daily_range(start, end, cfg.quick_check_interval_minutes as u32)?,
            ),
            move || {
                let m = Arc::clone(&m);
                async move { m.run_cycle().await.map(|_| ()) }
            },
        )?;
    }

    // Kick one cycle right away instead of waiting a full interval.
    {
        let m = Arc::clone(&monitor);
        tokio::spawn(async move {
            if let Err(e) = m.run_cycle().await {
                tracing::error!(error = ?e, "initial cycle failed");
            }
        });
    }

    // --- HTTP surface ---
    let state = AppState {
        scheduler: Arc::clone(&scheduler),
        monitor,
        store: articles,
    };
    let router = create_router(state).merge(metrics.router());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("binding port {port}"))?;
    tracing::info!(port, "monitor up");

    axum::serve(listener, router).await.context("http server")?;
    scheduler.shutdown();
    Ok(())
}
