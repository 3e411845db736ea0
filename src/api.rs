//! HTTP API for the Pension Engine.
//!
//! This module exposes a small REST API around the analysis engine
//! using the [`axum`](https://crates.io/crates/axum) framework.  Clients
//! submit the parser's output for one or many workers and receive the
//! [`AnalysisReport`]s as JSON.  The server holds the rule tables loaded
//! at start-up; nothing else is shared between requests.

use crate::config::EngineConfig;
use crate::engine::{analyze, analyze_batch, AnalysisOptions};
use crate::error::AnalysisError;
use crate::models::{AnalysisInput, AnalysisReport};
use crate::rules::RuleBook;
use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

/// Application state shared across requests.
#[derive(Clone)]
pub struct AppState {
    pub rules: Arc<RuleBook>,
    pub tolerance_weeks: u32,
}

/// Options common to single and batch requests.  Omitted fields fall
/// back to the server defaults; the reference date defaults to today.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestOptions {
    #[serde(default)]
    pub reference_date: Option<NaiveDate>,
    #[serde(default)]
    pub tolerance_weeks: Option<u32>,
    #[serde(default)]
    pub target_days: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisRequest {
    pub input: AnalysisInput,
    #[serde(flatten)]
    pub options: RequestOptions,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchRequest {
    pub inputs: Vec<AnalysisInput>,
    #[serde(flatten)]
    pub options: RequestOptions,
}

/// One element of a batch response.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum BatchItem {
    Report { report: Box<AnalysisReport> },
    Error { error: String, kind: &'static str },
}

impl AppState {
    fn options(&self, requested: &RequestOptions) -> AnalysisOptions {
        AnalysisOptions {
            reference_date: requested
                .reference_date
                .unwrap_or_else(|| chrono::Local::now().date_naive()),
            tolerance_weeks: requested.tolerance_weeks.unwrap_or(self.tolerance_weeks),
            target_days: requested.target_days,
        }
    }
}

/// Error body returned by the handlers.
pub enum ApiError {
    Analysis(AnalysisError),
    Internal(String),
}

impl From<AnalysisError> for ApiError {
    fn from(err: AnalysisError) -> Self {
        ApiError::Analysis(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, kind) = match self {
            ApiError::Analysis(err) => {
                let status = match err {
                    AnalysisError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
                    _ => StatusCode::UNPROCESSABLE_ENTITY,
                };
                (status, err.to_string(), err.kind())
            }
            ApiError::Internal(message) => (StatusCode::INTERNAL_SERVER_ERROR, message, "internal"),
        };
        if status.is_server_error() {
            error!(%message, kind, "analysis request failed");
        }
        let body = Json(serde_json::json!({ "error": message, "kind": kind }));
        (status, body).into_response()
    }
}

/// Build the API router over the given rule book.
pub fn build_router(rules: Arc<RuleBook>, tolerance_weeks: u32) -> Router {
    let state = AppState {
        rules,
        tolerance_weeks,
    };
    Router::new()
        .route("/api/analyze", post(analyze_handler))
        .route("/api/analyze/batch", post(batch_handler))
        .route("/api/health", get(health_handler))
        .with_state(state)
}

/// Handler for POST /api/analyze
async fn analyze_handler(
    State(state): State<AppState>,
    Json(request): Json<AnalysisRequest>,
) -> Result<Json<AnalysisReport>, ApiError> {
    let options = state.options(&request.options);
    let report = analyze(&request.input, state.rules.as_ref(), &options)?;
    Ok(Json(report))
}

/// Handler for POST /api/analyze/batch.  Runs on the blocking pool since
/// the batch fans out across rayon threads.
async fn batch_handler(
    State(state): State<AppState>,
    Json(request): Json<BatchRequest>,
) -> Result<Json<Vec<BatchItem>>, ApiError> {
    let options = state.options(&request.options);
    let rules = state.rules.clone();
    let results = tokio::task::spawn_blocking(move || analyze_batch(&request.inputs, rules.as_ref(), &options))
        .await
        .map_err(|e| ApiError::Internal(format!("batch analysis task failed: {e}")))?;
    let items = results
        .into_iter()
        .map(|result| match result {
            Ok(report) => BatchItem::Report {
                report: Box::new(report),
            },
            Err(err) => BatchItem::Error {
                error: err.to_string(),
                kind: err.kind(),
            },
        })
        .collect();
    Ok(Json(items))
}

/// Handler for GET /api/health
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok", "rule_tables": state.rules.len() }))
}

/// Launch the API server on the configured address.  Blocks until the
/// server terminates.
pub async fn serve(config: &EngineConfig, rules: RuleBook) -> Result<()> {
    let router = build_router(Arc::new(rules), config.tolerance_weeks);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "server listening");
    axum::serve(listener, router).await.context("server terminated")?;
    Ok(())
}
