use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;
use validator::Validate;

use crate::jobs::{Job, Pub};
use crate::settlement::{PassOptions, PassReport};

/// Body of `POST /api/v1/reconcile`; every field is optional.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct ReconcileRequest {
    #[serde(default)]
    pub simulated: Option<bool>,
    #[serde(default)]
    #[validate(range(min = 1, max = 3600, message = "must be between 1 and 3600 seconds"))]
    pub deadline_secs: Option<u64>,
}

impl From<&ReconcileRequest> for PassOptions {
    fn from(request: &ReconcileRequest) -> Self {
        PassOptions {
            deadline: request.deadline_secs.map(Duration::from_secs),
            simulated: request.simulated,
        }
    }
}

/// Upload handed over by the archiving side
#[derive(Debug, Deserialize, Validate)]
pub struct CreateJobRequest {
    #[validate(length(min = 1, message = "cid is required"))]
    pub cid: String,
    /// Uploaded object path, `namespace/relation/file...`
    #[validate(length(min = 1, message = "object_name is required"))]
    pub object_name: String,
    pub source_timestamp: Option<i64>,
    pub cache_path: Option<String>,
    #[validate(range(min = 0, max = 5_256_000, message = "must be between 0 and 5256000 minutes (ten years)"))]
    pub cache_duration_minutes: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct CreateJobResponse {
    pub cid: String,
    pub publisher: Pub,
    pub cache_expiry: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct UnsettledJobsResponse {
    pub count: usize,
    pub jobs: Vec<Job>,
}

#[derive(Debug, Serialize)]
pub struct LastPassSummary {
    pub pass_id: Uuid,
    pub finished_at: DateTime<Utc>,
    pub jobs: usize,
    pub settled: usize,
    pub failed: usize,
}

impl From<&PassReport> for LastPassSummary {
    fn from(report: &PassReport) -> Self {
        Self {
            pass_id: report.pass_id,
            finished_at: report.finished_at,
            jobs: report.outcomes.len(),
            settled: report.settled_count(),
            failed: report.failures().count(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub status_provider: &'static str,
    pub last_pass: Option<LastPassSummary>,
}
