// tests/api_http.rs
//
// HTTP-level tests for the public Router without opening sockets,
// exercised directly via tower::ServiceExt::oneshot.

use anyhow::Result;
use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::Value as Json;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt as _; // for `oneshot`

use black_swan_monitor::api::{create_router, AppState};
use black_swan_monitor::crawl::types::SourceRegistry;
use black_swan_monitor::crawl::Crawler;
use black_swan_monitor::dedup::{Deduplicator, MemoryDedupStore};
use black_swan_monitor::model::ClassifierVerdict;
use black_swan_monitor::monitor::Monitor;
use black_swan_monitor::notify::{AlertDispatcher, AlertMux};
use black_swan_monitor::retry::RetryPolicy;
use black_swan_monitor::sched::{JobSpec, Scheduler, Trigger};
use black_swan_monitor::score::classifier::{Classifier, ClassifyContext};
use black_swan_monitor::score::embedding::EmbeddingClient;
use black_swan_monitor::score::history::HistoryWindow;
use black_swan_monitor::score::Scorer;
use black_swan_monitor::store::MemoryArticleStore;

const BODY_LIMIT: usize = 1024 * 1024;

struct StubEmbedder;

#[async_trait]
impl EmbeddingClient for StubEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(vec![1.0])
    }
}

struct StubClassifier;

#[async_trait]
impl Classifier for StubClassifier {
    async fn classify(
        &self,
        _title: &str,
        _body: &str,
        _ctx: Option<ClassifyContext>,
    ) -> Result<ClassifierVerdict> {
        anyhow::bail!("not configured in tests")
    }
}

/// Router over a pipeline with no sources: cycles run and do nothing.
fn test_router() -> Router {
    let crawler = Crawler::new(
        SourceRegistry::new(),
        Arc::new(Deduplicator::with_defaults(Arc::new(MemoryDedupStore::new()))),
        RetryPolicy::new(1, Duration::from_millis(1), Duration::from_millis(1)),
        5,
    );
    let scorer = Scorer::new(
        Arc::new(StubEmbedder),
        Arc::new(StubClassifier),
        Arc::new(HistoryWindow::with_capacity(100)),
        0.7,
    );
    let store = Arc::new(MemoryArticleStore::default());
    let monitor = Arc::new(Monitor::new(
        crawler,
        scorer,
        store.clone(),
        AlertDispatcher::new(AlertMux::new()),
    ));

    let scheduler = Arc::new(Scheduler::new());
    scheduler
        .register(
            JobSpec::new("crawl-cycle", Trigger::Interval(Duration::from_secs(1800))),
            || async { Ok(()) },
        )
        .unwrap();

    create_router(AppState {
        scheduler,
        monitor,
        store,
    })
}

async fn body_json(resp: axum::response::Response) -> Json {
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("json body")
}

#[tokio::test]
async fn health_returns_ok() {
    let app = test_router();
    let resp = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT).await.unwrap();
    assert_eq!(&bytes[..], b"ok");
}

#[tokio::test]
async fn status_lists_jobs_with_trigger_descriptions() {
    let app = test_router();
    // let the job loop publish its first next_run
    tokio::time::sleep(Duration::from_millis(50)).await;

    let resp = app
        .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let json = body_json(resp).await;
    let jobs = json["jobs"].as_array().expect("jobs array");
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0]["id"], "crawl-cycle");
    assert_eq!(jobs[0]["trigger"], "interval[1800s]");
    assert!(jobs[0]["next_run"].is_string());
    assert_eq!(json["history_len"], 0);
}

#[tokio::test]
async fn run_once_returns_a_cycle_summary() {
    let app = test_router();
    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/run-once")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let json = body_json(resp).await;
    assert_eq!(json["fetched"], 0);
    assert_eq!(json["scored"], 0);
    assert_eq!(json["black_swans"], 0);
}

#[tokio::test]
async fn recent_articles_starts_empty() {
    let app = test_router();
    let resp = app
        .oneshot(
            Request::builder()
                .uri("/articles/recent?limit=5")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await.as_array().unwrap().len(), 0);
}
