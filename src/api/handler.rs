use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use std::sync::Arc;
use tracing::info;

use super::models::*;
use crate::{
    error::{AppError, AppResult},
    jobs::{CacheSettings, JobStore, NewJob},
    middleware::validate_request,
    settlement::{PassOptions, PassReport, Reconciler},
};

#[derive(Clone)]
pub struct AppState {
    pub reconciler: Reconciler,
    pub jobs: Arc<dyn JobStore>,
    pub status_provider: &'static str,
}

/// Run one reconciliation pass
/// POST /api/v1/reconcile
pub async fn run_reconcile(
    State(state): State<AppState>,
    body: Option<Json<ReconcileRequest>>,
) -> AppResult<Json<PassReport>> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    validate_request(&request)?;

    info!("Reconciliation requested: {:?}", request);
    let report = state.reconciler.run_pass(PassOptions::from(&request)).await?;
    Ok(Json(report))
}

/// Most recent pass report
/// GET /api/v1/reconcile/last
pub async fn get_last_report(State(state): State<AppState>) -> AppResult<Json<PassReport>> {
    state
        .reconciler
        .last_report()
        .map(Json)
        .ok_or_else(|| AppError::NotFound("no reconciliation pass has run yet".to_string()))
}

/// GET /api/v1/jobs/unsettled
pub async fn list_unsettled_jobs(State(state): State<AppState>) -> AppResult<Json<UnsettledJobsResponse>> {
    let jobs = state.jobs.list_unsettled().await?;
    Ok(Json(UnsettledJobsResponse {
        count: jobs.len(),
        jobs,
    }))
}

/// Register an uploaded artifact for settlement
/// POST /api/v1/jobs
pub async fn create_job(
    State(state): State<AppState>,
    Json(request): Json<CreateJobRequest>,
) -> AppResult<(StatusCode, Json<CreateJobResponse>)> {
    validate_request(&request)?;

    let cache = request.cache_duration_minutes.map(|duration_minutes| CacheSettings {
        path: request.cache_path.clone().unwrap_or_default(),
        duration_minutes,
    });
    let job = NewJob::from_upload(&request.cid, &request.object_name, request.source_timestamp, cache)?;
    let cache_expiry = job.cache_expiry(Utc::now())?;

    state.jobs.create_job(&job).await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateJobResponse {
            cid: job.content_address.to_string(),
            cache_expiry,
            publisher: job.publisher,
        }),
    ))
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let last = state.reconciler.last_report();
    let degraded = last.as_ref().is_some_and(|r| !r.is_success());

    Json(HealthResponse {
        status: if degraded { "degraded" } else { "healthy" }.to_string(),
        timestamp: Utc::now(),
        status_provider: state.status_provider,
        last_pass: last.as_ref().map(LastPassSummary::from),
    })
}
