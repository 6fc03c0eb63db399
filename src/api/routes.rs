use crate::api::api_error::APIError;
use crate::api::model::{BlockedName, BlocklistSize, CacheReport, QuestionsParams};
use crate::api::server::AppState;
use crate::blocklist;
use crate::cache::QuestionLogEntry;
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_extra::extract::WithRejection;
use serde_json::json;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub(super) fn new(state: AppState) -> Router {
    Router::new()
        .route("/healthcheck", get(health_check))
        .route("/cache", get(cache_report))
        .route("/questions", get(questions))
        .route("/blocklist", get(blocklist_size))
        .route("/blocklist/reload", post(reload_blocklist))
        .route("/blocklist/:name", get(blocked_name))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(state.config.api_timeout))
        .with_state(state)
}

#[allow(clippy::unused_async)]
async fn health_check() -> impl IntoResponse {
    Json(json!({"ok":"healthy"}))
}

#[allow(clippy::unused_async)]
async fn cache_report(State(state): State<AppState>) -> Json<CacheReport> {
    Json(CacheReport {
        positive: state.caches.positive.as_ref().into(),
        negative: state.caches.negative.as_ref().into(),
    })
}

#[allow(clippy::unused_async)]
async fn questions(
    State(state): State<AppState>,
    WithRejection(Query(params), _): WithRejection<Query<QuestionsParams>, APIError>,
) -> Json<Vec<QuestionLogEntry>> {
    Json(state.caches.questions.recent(params.limit))
}

#[allow(clippy::unused_async)]
async fn blocklist_size(State(state): State<AppState>) -> Json<BlocklistSize> {
    Json(BlocklistSize {
        size: state.caches.blocked.len(),
    })
}

#[allow(clippy::unused_async)]
async fn blocked_name(State(state): State<AppState>, Path(name): Path<String>) -> Json<BlockedName> {
    let blocked = state.caches.blocked.exists(&name);
    Json(BlockedName { name, blocked })
}

async fn reload_blocklist(State(state): State<AppState>) -> Result<Json<BlocklistSize>, APIError> {
    let domains = blocklist::load(&state.config).await.map_err(|err| {
        tracing::warn!("blocklist reload failed, keeping previous list: {err}");
        err
    })?;
    let size = domains.len();
    state.caches.blocked.reload(domains);
    tracing::info!("blocklist reloaded with {size} names");
    Ok(Json(BlocklistSize { size }))
}
