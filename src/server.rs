// SYNOID Narration API Server
// Copyright (c) 2026 Xing_The_Creator | SYNOID

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use uuid::Uuid;

use crate::narration::error::NarrationError;
use crate::narration::pipeline::{plan_narration, NarrationOptions, NarrationPlan};
use crate::narration::queue::{JobSnapshot, JobSummary, NarrationQueue, QueueCounts};

pub type AppState = NarrationQueue;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanRequest {
    pub analysis: serde_json::Value,
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRequest {
    pub analysis: serde_json::Value,
    #[serde(flatten)]
    pub options: NarrationOptions,
}

#[derive(Serialize, Deserialize)]
pub struct JobCreated {
    pub id: Uuid,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStatus {
    pub service: &'static str,
    pub version: &'static str,
    pub default_language: String,
    pub languages: Vec<String>,
    pub jobs: QueueCounts,
}

pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<NarrationError> for ApiError {
    fn from(err: NarrationError) -> Self {
        let status = match err {
            NarrationError::Validation(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/status", get(get_status))
        .route("/api/plan", post(plan))
        .route("/api/jobs", post(create_job).get(list_jobs))
        .route("/api/jobs/:id", get(get_job).delete(cancel_job))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

pub async fn start_server(port: u16, state: AppState) -> std::io::Result<()> {
    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("[SERVER] SYNOID Narrator API running on http://127.0.0.1:{}", port);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}

async fn get_status(State(queue): State<AppState>) -> Json<ServerStatus> {
    let config = queue.config();
    Json(ServerStatus {
        service: "synoid-narrator",
        version: env!("CARGO_PKG_VERSION"),
        default_language: config.default_language.clone(),
        languages: config.languages.iter().map(|l| l.code.clone()).collect(),
        jobs: queue.counts().await,
    })
}

async fn plan(
    State(queue): State<AppState>,
    Json(payload): Json<PlanRequest>,
) -> Result<Json<NarrationPlan>, ApiError> {
    let config = queue.config();
    let language = payload
        .language
        .unwrap_or_else(|| config.default_language.clone());
    let plan = plan_narration(&payload.analysis, &language, config)?;
    Ok(Json(plan))
}

async fn create_job(
    State(queue): State<AppState>,
    Json(payload): Json<JobRequest>,
) -> Result<(StatusCode, Json<JobCreated>), ApiError> {
    // Reject unusable analysis up front instead of queueing a job that fails.
    let language = payload
        .options
        .language
        .clone()
        .unwrap_or_else(|| queue.config().default_language.clone());
    if let Err(err) = plan_narration(&payload.analysis, &language, queue.config()) {
        warn!("[SERVER] Rejecting job: {}", err);
        return Err(err.into());
    }

    let id = queue.add_job(payload.analysis, payload.options).await;
    Ok((StatusCode::ACCEPTED, Json(JobCreated { id })))
}

async fn list_jobs(State(queue): State<AppState>) -> Json<Vec<JobSummary>> {
    Json(queue.list_jobs().await)
}

async fn get_job(State(queue): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<JobSnapshot>, ApiError> {
    queue
        .get_job(id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, format!("no job {}", id)))
}

async fn cancel_job(State(queue): State<AppState>, Path(id): Path<Uuid>) -> Result<StatusCode, ApiError> {
    match queue.cancel_job(id).await {
        Some(true) => Ok(StatusCode::ACCEPTED),
        Some(false) => Err(ApiError::new(StatusCode::CONFLICT, format!("job {} already finished", id))),
        None => Err(ApiError::new(StatusCode::NOT_FOUND, format!("no job {}", id))),
    }
}
