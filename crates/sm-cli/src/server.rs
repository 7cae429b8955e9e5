//! HTTP adapter over the memory, trace, mutation, audit and drift
//! operations. Store calls are synchronous and run on the blocking pool.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use sm_core::{
    AuditLogEntry, DriftScore, MemorySnapshot, MutationSummary, RelevanceMatcher,
    RelevanceResult, SymbolicTrace, drift_over,
};
use sm_store::StoreError;

use crate::app::App;

const DEFAULT_AUDIT_LIMIT: i64 = 50;

#[derive(Clone)]
pub struct SmServer {
    app: Arc<App>,
}

impl SmServer {
    pub fn new(app: Arc<App>) -> Self {
        Self { app }
    }

    pub fn router(self) -> Router {
        Router::new()
            .route("/memory", get(get_memory))
            .route("/relevance", post(find_relevant))
            .route("/traces", post(save_trace))
            .route("/mutations", post(run_mutations))
            .route("/audit", get(recent_audit).post(log_audit))
            .route("/snapshots", post(take_snapshot))
            .route("/drift", get(get_drift))
            .layer(TraceLayer::new_for_http())
            .layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            )
            .with_state(self)
    }

    /// Run `f` against the app on the blocking pool.
    async fn blocking<T, F>(&self, f: F) -> ApiResult<T>
    where
        F: FnOnce(&App) -> sm_store::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let app = Arc::clone(&self.app);
        tokio::task::spawn_blocking(move || f(&app))
            .await
            .map_err(|e| ApiError::Internal(format!("store task failed: {e}")))?
            .map_err(ApiError::from)
    }
}

// --- Errors ---

#[derive(Debug)]
pub enum ApiError {
    Store(StoreError),
    BadRequest(String),
    Internal(String),
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Store(e) if e.is_not_found() => StatusCode::NOT_FOUND,
            ApiError::Store(StoreError::DuplicateTraceId(_) | StoreError::InvalidData(_)) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Store(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(&self) -> ErrorBody {
        let (kind, message) = match self {
            ApiError::Store(e) => (e.kind(), e.to_string()),
            ApiError::BadRequest(msg) => ("InvalidRequest", msg.clone()),
            ApiError::Internal(msg) => ("Internal", msg.clone()),
        };
        ErrorBody {
            kind: kind.to_string(),
            message,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Store(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("request failed: {}", self.body().message);
        }
        (status, Json(self.body())).into_response()
    }
}

/// Parse a request body ourselves so shape errors carry the same
/// `{kind, message}` body as every other failure.
fn parse_body<T: DeserializeOwned>(body: &Bytes) -> ApiResult<T> {
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("invalid body: {e}")))
}

// --- Request / response types ---

#[derive(Debug, Deserialize)]
pub struct RelevanceRequest {
    pub input: String,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationRequest {
    pub trace_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceCreated {
    pub trace_id: String,
}

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    pub limit: Option<i64>,
}

// --- Handlers ---

pub async fn get_memory(State(server): State<SmServer>) -> ApiResult<Json<MemorySnapshot>> {
    let snapshot = server.blocking(|app| app.memory.snapshot()).await?;
    Ok(Json(snapshot))
}

pub async fn find_relevant(
    State(server): State<SmServer>,
    body: Bytes,
) -> ApiResult<Json<Vec<RelevanceResult>>> {
    let req: RelevanceRequest = parse_body(&body)?;
    let results = server
        .blocking(move |app| {
            let nodes = app.memory.load()?.nodes;
            let mut config = app.config.relevance.clone();
            if req.limit.is_some() {
                config.limit = req.limit;
            }
            Ok(RelevanceMatcher::find_relevant_memories(
                &req.input, &nodes, &config,
            ))
        })
        .await?;
    Ok(Json(results))
}

pub async fn save_trace(
    State(server): State<SmServer>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<TraceCreated>)> {
    let trace: SymbolicTrace = parse_body(&body)?;
    let trace_id = trace.trace_id.clone();
    server.blocking(move |app| app.traces.save(&trace)).await?;
    tracing::info!(trace_id = %trace_id, "trace stored");
    Ok((StatusCode::CREATED, Json(TraceCreated { trace_id })))
}

pub async fn run_mutations(
    State(server): State<SmServer>,
    body: Bytes,
) -> ApiResult<Json<MutationSummary>> {
    let req: MutationRequest = parse_body(&body)?;
    let summary = server
        .blocking(move |app| app.run_mutation_cycle(&req.trace_id))
        .await?;
    Ok(Json(summary))
}

pub async fn log_audit(
    State(server): State<SmServer>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<AuditLogEntry>)> {
    let value: serde_json::Value = parse_body(&body)?;
    let entry = server
        .blocking(move |app| Ok(app.audit.log_self_audit(AuditLogEntry::from_value(value))))
        .await?;
    Ok((StatusCode::ACCEPTED, Json(entry)))
}

pub async fn recent_audit(
    State(server): State<SmServer>,
    query: Result<Query<AuditQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<AuditLogEntry>>> {
    let Query(query) =
        query.map_err(|e| ApiError::BadRequest(format!("invalid query: {}", e.body_text())))?;
    let limit = query.limit.unwrap_or(DEFAULT_AUDIT_LIMIT);
    let entries = server
        .blocking(move |app| Ok(app.audit.get_recent_audit_logs(limit)))
        .await?;
    Ok(Json(entries))
}

pub async fn take_snapshot(State(server): State<SmServer>) -> ApiResult<Json<MemorySnapshot>> {
    let snapshot = server
        .blocking(|app| {
            let snapshot = app.memory.snapshot()?;
            app.memory.save_snapshot(&snapshot)?;
            Ok(snapshot)
        })
        .await?;
    Ok(Json(snapshot))
}

pub async fn get_drift(State(server): State<SmServer>) -> ApiResult<Json<Vec<DriftScore>>> {
    let scores = server
        .blocking(|app| {
            let snapshots = app.memory.list_snapshots()?;
            Ok(drift_over(&snapshots, app.config.drift.trend_epsilon))
        })
        .await?;
    Ok(Json(scores))
}
