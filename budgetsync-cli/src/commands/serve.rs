//! Serve command - HTTP control API
//!
//! Every route goes through the same `ImportService` the CLI uses. The
//! pipeline is blocking, so it runs on the blocking thread pool.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

use budgetsync_core::services::{ImportSummary, QuickStatus, RunStatus};
use budgetsync_core::{BudgetSyncContext, SyncLogEntry};

use super::get_context;

pub struct AppState {
    pub context: BudgetSyncContext,
}

/// Errors returned to HTTP callers as `{"error": ...}`
#[derive(Debug)]
pub enum AppError {
    Conflict(String),
    Internal(String),
}

impl From<budgetsync_core::Error> for AppError {
    fn from(err: budgetsync_core::Error) -> Self {
        match err {
            budgetsync_core::Error::ImportInProgress => AppError::Conflict(err.to_string()),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Internal(format!("Background task failed: {}", err))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Internal(msg) => {
                error!("Request failed: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub filter: Option<String>,
    pub limit: Option<usize>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/sync-csv", post(sync_csv))
        .route("/sync-remote", post(sync_remote))
        .route("/sync-history", get(sync_history))
        .route("/quick-status", get(quick_status))
        .with_state(state)
}

pub fn run(bind: Option<String>) -> Result<()> {
    let context = get_context()?;
    let bind = bind.unwrap_or_else(|| context.config.bind.clone());
    let state = Arc::new(AppState { context });

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    runtime.block_on(async move {
        let listener = tokio::net::TcpListener::bind(&bind)
            .await
            .with_context(|| format!("Failed to bind {}", bind))?;
        info!("Listening on http://{}", bind);
        axum::serve(listener, router(state))
            .await
            .context("Server error")
    })
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn sync_csv(State(state): State<Arc<AppState>>) -> Result<Response, AppError> {
    run_import(state, false).await
}

async fn sync_remote(State(state): State<Arc<AppState>>) -> Result<Response, AppError> {
    run_import(state, true).await
}

async fn run_import(state: Arc<AppState>, fetch: bool) -> Result<Response, AppError> {
    let summary: ImportSummary = tokio::task::spawn_blocking(move || {
        let mut options = state.context.import_options();
        options.fetch = fetch;
        state.context.import_service.run(&options)
    })
    .await??;

    let status = if summary.status == RunStatus::Failed {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    };
    Ok((status, Json(summary)).into_response())
}

async fn sync_history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let history: Vec<SyncLogEntry> = tokio::task::spawn_blocking(move || {
        state
            .context
            .sync_log_service
            .history(query.filter.as_deref(), query.limit)
    })
    .await??;
    Ok(Json(json!({ "history": history })))
}

async fn quick_status(State(state): State<Arc<AppState>>) -> Result<Json<QuickStatus>, AppError> {
    let status =
        tokio::task::spawn_blocking(move || state.context.status_service.quick_status()).await?;
    Ok(Json(status))
}
