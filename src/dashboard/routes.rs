//! Dashboard API route handlers.
//!
//! All endpoints return JSON except the CSV export. State is shared via
//! `Arc<DashboardState>`; handlers work on an `Arc` snapshot of the
//! history, so a concurrent sync never blocks them.

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::advisor::{advise, Advice, Advisor};
use crate::engine::{SyncOrchestrator, SyncReport};
use crate::export::{parse_csv, to_csv};
use crate::prize::{summarise, BacktestSummary};
use crate::stats::{filter_history, years, HistoryStats};
use crate::types::{parse_number_list, DrawRecord, Ticket};

/// Default page size for `/api/history`.
const DEFAULT_HISTORY_LIMIT: usize = 100;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

pub struct DashboardState {
    pub orchestrator: Arc<SyncOrchestrator>,
    pub advisor: Option<Arc<dyn Advisor>>,
    pub started_at: DateTime<Utc>,
}

impl DashboardState {
    pub fn new(orchestrator: Arc<SyncOrchestrator>, advisor: Option<Arc<dyn Advisor>>) -> Self {
        Self { orchestrator, advisor, started_at: Utc::now() }
    }
}

pub type AppState = Arc<DashboardState>;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self { status: StatusCode::BAD_REQUEST, message: message.into() }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self { status: StatusCode::INTERNAL_SERVER_ERROR, message: message.into() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(serde_json::json!({ "error": self.message }))).into_response()
    }
}

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub history_version: u64,
    pub draws: usize,
    pub latest: Option<DrawRecord>,
    pub updated_at: DateTime<Utc>,
    pub syncing: bool,
    pub last_sync: Option<SyncReport>,
    pub advisor_enabled: bool,
    pub uptime_secs: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub year: Option<String>,
    pub q: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryResponse {
    pub version: u64,
    pub total: usize,
    pub matched: usize,
    pub years: Vec<i32>,
    pub draws: Vec<DrawRecord>,
}

#[derive(Debug, Default, Deserialize)]
pub struct BacktestQuery {
    pub front: Option<String>,
    pub back: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportResponse {
    pub rows: usize,
    pub accepted: usize,
    pub skipped: usize,
    pub added: usize,
    pub updated: usize,
    pub version: u64,
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// GET /api/status
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let snapshot = state.orchestrator.store().snapshot();
    let sync = state.orchestrator.status();

    Json(StatusResponse {
        history_version: snapshot.version,
        draws: snapshot.len(),
        latest: snapshot.latest().cloned(),
        updated_at: snapshot.updated_at,
        syncing: sync.syncing,
        last_sync: sync.last_report,
        advisor_enabled: state.advisor.is_some(),
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
    })
}

/// GET /api/history?year=&q=&limit=
pub async fn get_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Json<HistoryResponse> {
    let snapshot = state.orchestrator.store().snapshot();
    let matched = filter_history(&snapshot.draws, query.year.as_deref(), query.q.as_deref());
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);

    Json(HistoryResponse {
        version: snapshot.version,
        total: snapshot.len(),
        matched: matched.len(),
        years: years(&snapshot.draws),
        draws: matched.into_iter().take(limit).cloned().collect(),
    })
}

/// GET /api/backtest?front=a,b,c,d,e&back=x,y
pub async fn get_backtest(
    State(state): State<AppState>,
    Query(query): Query<BacktestQuery>,
) -> Result<Json<BacktestSummary>, ApiError> {
    let ticket = parse_ticket(&query).map_err(ApiError::bad_request)?;
    let snapshot = state.orchestrator.store().snapshot();
    Ok(Json(summarise(&ticket, &snapshot.draws, snapshot.version)))
}

fn parse_ticket(query: &BacktestQuery) -> Result<Ticket, String> {
    let front = parse_number_list(query.front.as_deref().unwrap_or_default()).map_err(|e| e.to_string())?;
    let back = parse_number_list(query.back.as_deref().unwrap_or_default()).map_err(|e| e.to_string())?;
    Ticket::new(&front, &back).map_err(|e| e.to_string())
}

/// GET /api/stats
pub async fn get_stats(State(state): State<AppState>) -> Json<HistoryStats> {
    let snapshot = state.orchestrator.store().snapshot();
    Json(HistoryStats::compute(&snapshot.draws))
}

/// GET /api/export.csv
pub async fn export_csv(State(state): State<AppState>) -> Result<Response, ApiError> {
    let snapshot = state.orchestrator.store().snapshot();
    let body = to_csv(&snapshot.draws).map_err(|e| ApiError::internal(e.to_string()))?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"dlt_history.csv\""),
        ],
        body,
    )
        .into_response())
}

/// POST /api/sync
pub async fn post_sync(State(state): State<AppState>) -> Json<SyncReport> {
    Json(state.orchestrator.sync().await)
}

/// POST /api/import (CSV body)
pub async fn post_import(State(state): State<AppState>, body: String) -> Result<Json<ImportResponse>, ApiError> {
    let report = parse_csv(&body);
    if report.draws.is_empty() {
        return Err(ApiError::bad_request(format!(
            "no valid draws found ({} rows, {} skipped)",
            report.rows, report.skipped
        )));
    }

    let outcome = state
        .orchestrator
        .import(&report.draws)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    Ok(Json(ImportResponse {
        rows: report.rows,
        accepted: report.draws.len(),
        skipped: report.skipped,
        added: outcome.added,
        updated: outcome.updated,
        version: outcome.snapshot.version,
    }))
}

/// POST /api/import/text: free-form text parsed by the advisor.
pub async fn post_import_text(
    State(state): State<AppState>,
    body: String,
) -> Result<Json<ImportResponse>, ApiError> {
    let advisor = state.advisor.as_ref().ok_or_else(advisor_disabled)?;
    let draws = advisor.parse_history(&body).await.map_err(|e| {
        warn!(error = %e, "Advisor history parse failed");
        ApiError::internal(format!("{e:#}"))
    })?;
    if draws.is_empty() {
        return Err(ApiError::bad_request("no valid draws found in text"));
    }

    let outcome = state
        .orchestrator
        .import(&draws)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;
    info!(draws = draws.len(), "Imported advisor-parsed history");

    Ok(Json(ImportResponse {
        rows: draws.len(),
        accepted: draws.len(),
        skipped: 0,
        added: outcome.added,
        updated: outcome.updated,
        version: outcome.snapshot.version,
    }))
}

/// POST /api/advice
pub async fn post_advice(State(state): State<AppState>) -> Result<Json<Advice>, ApiError> {
    let advisor = state.advisor.as_ref().ok_or_else(advisor_disabled)?;
    let snapshot = state.orchestrator.store().snapshot();
    let advice = advise(&**advisor, &snapshot.draws).await.map_err(|e| {
        warn!(error = %e, "Advisor analysis failed");
        ApiError::internal(format!("{e:#}"))
    })?;
    Ok(Json(advice))
}

fn advisor_disabled() -> ApiError {
    ApiError {
        status: StatusCode::SERVICE_UNAVAILABLE,
        message: "advisor is not enabled".to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
