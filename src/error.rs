use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use sqlx::migrate::MigrateError;
use thiserror::Error;

use crate::settlement::report::{FailureKind, PassFailure};

/// Top-level error type for the entire application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Job error: {0}")]
    Job(#[from] JobError),

    #[error("Status provider error: {0}")]
    Status(#[from] StatusError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Pass deadline reached while {0}")]
    DeadlineExceeded(&'static str),

    #[error("Reconciliation pass failed: {0}")]
    PassFailed(PassFailure),
}

/// Malformed job data derived from upstream metadata
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    #[error("Invalid content address: {0}")]
    InvalidContentAddress(String),

    #[error("Invalid object name: {0}")]
    InvalidObjectName(String),

    #[error("Namespace not found: {0}")]
    NamespaceNotFound(String),

    #[error("Active deal without activation time for {0}")]
    MissingActivation(String),

    #[error("Invalid cache window: {0}")]
    InvalidCacheWindow(String),
}

/// Deal status service errors
#[derive(Error, Debug)]
pub enum StatusError {
    #[error("Status request for {cid} failed: {source}")]
    Transport {
        cid: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Status service returned HTTP {status} for {cid}")]
    HttpStatus { cid: String, status: u16 },

    #[error("Malformed status response for {cid}: {message}")]
    Decode { cid: String, message: String },
}

/// Ledger (smart contract) errors
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("RPC transport failure calling {method}: {source}")]
    Transport {
        method: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("RPC {method} returned error {code}: {message}")]
    Rpc {
        method: &'static str,
        code: i64,
        message: String,
    },

    #[error("Write rejected by ledger ({code}): {message}")]
    Rejected { code: i64, message: String },

    #[error("Transaction {tx_hash} reverted in block {block_number}")]
    Reverted { tx_hash: String, block_number: u64 },

    #[error("No receipt for {tx_hash} after {waited_secs}s")]
    ReceiptTimeout { tx_hash: String, waited_secs: u64 },

    #[error("Malformed RPC response for {method}: {message}")]
    Decode { method: &'static str, message: String },

    #[error("ABI error: {0}")]
    Abi(String),

    #[error("Signing error: {0}")]
    Signing(String),

    #[error("Sequence numbers exhausted: base {base} cannot cover {count} jobs")]
    SequenceOverflow { base: u64, count: usize },
}

impl AppError {
    /// Classify an error raised while reconciling a single job.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            AppError::Job(_) | AppError::InvalidInput(_) => FailureKind::DataShape,
            AppError::Ledger(
                LedgerError::Rejected { .. }
                | LedgerError::Reverted { .. }
                | LedgerError::SequenceOverflow { .. },
            ) => FailureKind::LedgerRejection,
            AppError::Ledger(LedgerError::ReceiptTimeout { .. }) => FailureKind::ReceiptMissing,
            _ => FailureKind::Transient,
        }
    }
}

/// API error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, message, details) = match self {
            AppError::PassFailed(failure) => (
                StatusCode::BAD_GATEWAY,
                "PASS_FAILED",
                failure.to_string(),
                serde_json::to_value(&failure).ok(),
            ),
            AppError::InvalidInput(message) => {
                (StatusCode::BAD_REQUEST, "INVALID_INPUT", message, None)
            }
            AppError::Job(err) => (StatusCode::BAD_REQUEST, "INVALID_JOB", err.to_string(), None),
            AppError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("Not found: {}", what),
                None,
            ),
            AppError::Status(err) => (
                StatusCode::BAD_GATEWAY,
                "STATUS_PROVIDER_ERROR",
                err.to_string(),
                None,
            ),
            AppError::Ledger(err) => (StatusCode::BAD_GATEWAY, "LEDGER_ERROR", err.to_string(), None),
            AppError::DeadlineExceeded(stage) => (
                StatusCode::GATEWAY_TIMEOUT,
                "PASS_DEADLINE_EXCEEDED",
                format!("Pass deadline reached while {}", stage),
                None,
            ),
            AppError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "DATABASE_ERROR",
                "A database error occurred".to_string(),
                None,
            ),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
                None,
            ),
        };

        let body = Json(ErrorResponse {
            error: message,
            error_code: error_code.to_string(),
            details,
        });

        (status, body).into_response()
    }
}

impl From<MigrateError> for AppError {
    fn from(error: MigrateError) -> Self {
        AppError::Internal(format!("Migration error: {:?}", error))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(error: config::ConfigError) -> Self {
        AppError::Config(error.to_string())
    }
}

/// Result type alias for the application
pub type AppResult<T> = Result<T, AppError>;
