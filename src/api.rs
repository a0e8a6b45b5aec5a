// src/api.rs
//! Process-level HTTP surface: health, per-job scheduler status, a
//! manual "run one cycle now" trigger, and recent stored articles.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::monitor::{CycleSummary, Monitor};
use crate::sched::{JobStatus, Scheduler};
use crate::store::{ArticleStore, StoredArticle};

#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<Scheduler>,
    pub monitor: Arc<Monitor>,
    pub store: Arc<dyn ArticleStore>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/status", get(status))
        .route("/run-once", post(run_once))
        .route("/articles/recent", get(recent_articles))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(serde::Serialize)]
struct StatusResp {
    jobs: Vec<JobStatus>,
    history_len: usize,
}

async fn status(State(state): State<AppState>) -> Json<StatusResp> {
    Json(StatusResp {
        jobs: state.scheduler.status(),
        history_len: state.monitor.scorer().history().len(),
    })
}

async fn run_once(
    State(state): State<AppState>,
) -> Result<Json<CycleSummary>, (StatusCode, String)> {
    state
        .monitor
        .run_cycle()
        .await
        .map(Json)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}")))
}

#[derive(serde::Deserialize)]
struct RecentQuery {
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    20
}

async fn recent_articles(
    State(state): State<AppState>,
    Query(q): Query<RecentQuery>,
) -> Result<Json<Vec<StoredArticle>>, (StatusCode, String)> {
    state
        .store
        .recent(q.limit.min(500))
        .await
        .map(Json)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}")))
}
