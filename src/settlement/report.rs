use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

use crate::error::AppError;
use crate::jobs::{ContentAddress, Pub};

/// Why a job ended a pass without reaching its terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Network or RPC trouble talking to a collaborator
    Transient,
    /// Upstream data the engine cannot interpret
    DataShape,
    /// The ledger refused or reverted the write
    LedgerRejection,
    /// The write was submitted but never confirmed within the wait budget
    ReceiptMissing,
    /// The pass deadline elapsed first
    Cancelled,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FailureKind::Transient => "transient",
            FailureKind::DataShape => "data_shape",
            FailureKind::LedgerRejection => "ledger_rejection",
            FailureKind::ReceiptMissing => "receipt_missing",
            FailureKind::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// Result of one job within one pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobOutcome {
    /// Left unsettled, nothing active yet
    NoActiveDeals,
    /// Every active fact was already on the ledger
    SettledWithoutWrite { activation: DateTime<Utc> },
    SettledAfterWrite {
        activation: DateTime<Utc>,
        tx_hash: String,
        facts: usize,
    },
    Failed { kind: FailureKind, message: String },
}

impl JobOutcome {
    pub fn from_error(error: &AppError) -> Self {
        JobOutcome::Failed {
            kind: error.failure_kind(),
            message: error.to_string(),
        }
    }

    pub fn cancelled() -> Self {
        JobOutcome::Failed {
            kind: FailureKind::Cancelled,
            message: "pass deadline elapsed before the job finished".to_string(),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, JobOutcome::Failed { .. })
    }

    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            JobOutcome::SettledWithoutWrite { .. } | JobOutcome::SettledAfterWrite { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobReport {
    pub content_address: ContentAddress,
    pub publisher: Pub,
    /// Sequence slot reserved for this job, consumed only on a write
    pub sequence: u64,
    pub outcome: JobOutcome,
}

/// Summary of one reconciliation pass
#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    pub pass_id: Uuid,
    pub simulated: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// `None` when there was nothing to reconcile
    pub base_sequence: Option<u64>,
    pub outcomes: Vec<JobReport>,
}

impl PassReport {
    pub fn failures(&self) -> impl Iterator<Item = &JobReport> {
        self.outcomes.iter().filter(|r| r.outcome.is_failure())
    }

    pub fn settled_count(&self) -> usize {
        self.outcomes.iter().filter(|r| r.outcome.is_settled()).count()
    }

    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }

    /// Succeeds only if no job ended in a failure. Settled jobs stay
    /// settled either way.
    pub fn into_result(self) -> Result<PassReport, PassFailure> {
        if self.is_success() {
            return Ok(self);
        }
        let total = self.outcomes.len();
        let settled = self.settled_count();
        Err(PassFailure {
            pass_id: self.pass_id,
            total,
            settled,
            failed: self
                .outcomes
                .into_iter()
                .filter(|r| r.outcome.is_failure())
                .collect(),
        })
    }
}

/// Aggregate error of a pass in which at least one job failed.
#[derive(Debug, Clone, Serialize)]
pub struct PassFailure {
    pub pass_id: Uuid,
    pub total: usize,
    pub settled: usize,
    pub failed: Vec<JobReport>,
}

impl fmt::Display for PassFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of {} job(s) failed", self.failed.len(), self.total)?;
        for (i, report) in self.failed.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            if let JobOutcome::Failed { kind, message } = &report.outcome {
                write!(f, "{}{} [{}] {}", sep, report.content_address, kind, message)?;
            }
        }
        Ok(())
    }
}
