// src/api.rs

//! HTTP surface.
//!
//! Read endpoints over persisted records, trigger endpoints that run a
//! collection job and report its JobResult, and a health probe backed by
//! the repository ping. Failed jobs surface as non-200 responses carrying
//! the error kind, never internal error text.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use serde_json::json;

use crate::error::Result;
use crate::models::{ApiConfig, JobResult, JobState, Trend, Tweet, User};
use crate::storage::Repository;
use crate::tasks::Orchestrator;

/// Shared handler state.
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub repo: Arc<dyn Repository>,
}

/// Build the service router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/tweets", get(list_tweets))
        .route("/users/{username}", get(get_user))
        .route("/trends", get(list_trends))
        .route("/scrape/tweets", post(trigger_tweets))
        .route("/scrape/users/{username}", post(trigger_user))
        .route("/scrape/trends", post(trigger_trends))
        .with_state(state)
}

/// Bind and serve until the process exits.
pub async fn serve(state: Arc<AppState>, config: &ApiConfig) -> Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    log::info!("HTTP API listening on {addr}");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

type ApiError = (StatusCode, Json<serde_json::Value>);

fn internal_error(err: crate::error::AppError) -> ApiError {
    log::error!("request failed: {err}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": err.kind() })),
    )
}

fn job_response(result: JobResult) -> (StatusCode, Json<JobResult>) {
    let status = match result.state {
        JobState::Failed => StatusCode::BAD_GATEWAY,
        _ => StatusCode::OK,
    };
    (status, Json(result))
}

async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<serde_json::Value>) {
    match state.repo.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "status": "healthy", "database": "healthy" })),
        ),
        Err(e) => {
            log::error!("health check failed: {e}");
            (
                StatusCode::OK,
                Json(json!({ "status": "degraded", "database": "unhealthy" })),
            )
        }
    }
}

#[derive(Debug, Deserialize)]
struct TweetListParams {
    query: Option<String>,
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    50
}

async fn list_tweets(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TweetListParams>,
) -> std::result::Result<Json<Vec<Tweet>>, ApiError> {
    state
        .repo
        .recent_tweets(params.query.as_deref(), params.limit)
        .await
        .map(Json)
        .map_err(internal_error)
}

async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
) -> std::result::Result<Json<User>, ApiError> {
    match state.repo.get_user(&username).await {
        Ok(Some(user)) => Ok(Json(user)),
        Ok(None) => Err((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "user not found" })),
        )),
        Err(e) => Err(internal_error(e)),
    }
}

#[derive(Debug, Deserialize)]
struct TrendListParams {
    region: Option<String>,
    #[serde(default = "default_trend_limit")]
    limit: usize,
}

fn default_trend_limit() -> usize {
    20
}

async fn list_trends(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TrendListParams>,
) -> std::result::Result<Json<Vec<Trend>>, ApiError> {
    state
        .repo
        .latest_trends(params.region.as_deref(), params.limit)
        .await
        .map(Json)
        .map_err(internal_error)
}

#[derive(Debug, Deserialize)]
struct ScrapeTweetsParams {
    query: String,
    #[serde(default = "default_limit")]
    limit: usize,
}

async fn trigger_tweets(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ScrapeTweetsParams>,
) -> (StatusCode, Json<JobResult>) {
    let result = state
        .orchestrator
        .run_scrape_tweets(&params.query, params.limit)
        .await;
    job_response(result)
}

async fn trigger_user(
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
) -> (StatusCode, Json<JobResult>) {
    job_response(state.orchestrator.run_scrape_user(&username).await)
}

#[derive(Debug, Deserialize)]
struct ScrapeTrendsParams {
    #[serde(default = "default_region")]
    region: String,
}

fn default_region() -> String {
    "worldwide".to_string()
}

async fn trigger_trends(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ScrapeTrendsParams>,
) -> (StatusCode, Json<JobResult>) {
    job_response(state.orchestrator.run_scrape_trends(&params.region).await)
}
