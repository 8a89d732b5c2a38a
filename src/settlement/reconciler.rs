use chrono::Utc;
use futures::future::join_all;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time::{timeout_at, Instant};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::dedup::dedup_against_ledger;
use super::nonce::SequencePlan;
use super::report::{JobOutcome, JobReport, PassReport};
use super::selection::{earliest_activation, select_facts};
use super::submitter::Submitter;
use crate::config::Config;
use crate::deals::StatusProvider;
use crate::error::{AppError, AppResult, JobError};
use crate::jobs::{Job, JobStore};
use crate::ledger::{FeePolicy, LedgerClient};

#[derive(Debug, Clone, Copy)]
pub struct ReconcilerSettings {
    /// How many recent ledger facts are consulted for dedup
    pub recent_facts_window: u64,
    pub fee_policy: FeePolicy,
    pub pass_deadline: Duration,
    pub simulated: bool,
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self {
            recent_facts_window: 10,
            fee_policy: FeePolicy::default(),
            pass_deadline: Duration::from_secs(3300),
            simulated: false,
        }
    }
}

impl From<&Config> for ReconcilerSettings {
    fn from(config: &Config) -> Self {
        Self {
            recent_facts_window: config.recent_facts_window,
            fee_policy: FeePolicy {
                priority_fee_multiplier: config.priority_fee_multiplier,
                gas_limit_multiplier: config.gas_limit_multiplier,
            },
            pass_deadline: config.pass_deadline(),
            simulated: config.simulated,
        }
    }
}

/// Per-invocation overrides of the configured settings
#[derive(Debug, Clone, Copy, Default)]
pub struct PassOptions {
    pub deadline: Option<Duration>,
    pub simulated: Option<bool>,
}

/// Drives unsettled jobs towards settlement, one pass at a time.
#[derive(Clone)]
pub struct Reconciler {
    jobs: Arc<dyn JobStore>,
    status: Arc<dyn StatusProvider>,
    ledger: Arc<dyn LedgerClient>,
    submitter: Submitter,
    settings: ReconcilerSettings,
    pass_lock: Arc<Mutex<()>>,
    last_report: Arc<RwLock<Option<PassReport>>>,
}

impl Reconciler {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        status: Arc<dyn StatusProvider>,
        ledger: Arc<dyn LedgerClient>,
        settings: ReconcilerSettings,
    ) -> Self {
        Self {
            jobs,
            status,
            submitter: Submitter::new(ledger.clone(), settings.fee_policy),
            ledger,
            settings,
            pass_lock: Arc::new(Mutex::new(())),
            last_report: Arc::new(RwLock::new(None)),
        }
    }

    pub fn last_report(&self) -> Option<PassReport> {
        self.last_report.read().clone()
    }

    /// Run one pass. Fails with [`AppError::PassFailed`] if any job ended
    /// in a failure; jobs settled during the pass stay settled.
    pub async fn run_pass(&self, options: PassOptions) -> AppResult<PassReport> {
        self.execute_pass(options)
            .await?
            .into_result()
            .map_err(AppError::PassFailed)
    }

    /// Run one pass and return the full report. Only pass-level problems
    /// (listing jobs, reading the sequence number) are errors here, and both
    /// are bounded by the pass deadline.
    pub async fn execute_pass(&self, options: PassOptions) -> AppResult<PassReport> {
        // Passes never overlap, so sequence slots are never handed out twice.
        let _guard = self.pass_lock.lock().await;

        let pass_id = Uuid::new_v4();
        let started_at = Utc::now();
        let deadline = Instant::now() + options.deadline.unwrap_or(self.settings.pass_deadline);
        let simulated = options.simulated.unwrap_or(self.settings.simulated);

        let jobs = timeout_at(deadline, self.jobs.list_unsettled())
            .await
            .map_err(|_| AppError::DeadlineExceeded("listing unsettled jobs"))??;
        info!("🔄 Pass {} started: {} unsettled job(s), simulated={}", pass_id, jobs.len(), simulated);

        if jobs.is_empty() {
            return Ok(self.store_report(PassReport {
                pass_id,
                simulated,
                started_at,
                finished_at: Utc::now(),
                base_sequence: None,
                outcomes: Vec::new(),
            }));
        }

        let base = timeout_at(deadline, self.ledger.pending_sequence_number())
            .await
            .map_err(|_| AppError::DeadlineExceeded("reading the pending sequence number"))??;
        let plan = SequencePlan::new(base, jobs.len())?;

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let watchdog = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let _ = cancel_tx.send(true);
        });

        let mut meta = Vec::with_capacity(jobs.len());
        let mut tasks = Vec::with_capacity(jobs.len());
        for (job, sequence) in jobs.into_iter().zip(plan.slots()) {
            meta.push((job.content_address.clone(), job.publisher.clone(), sequence));

            let reconciler = self.clone();
            let mut cancel = cancel_rx.clone();
            tasks.push(tokio::spawn(async move {
                tokio::select! {
                    result = reconciler.process_job(&job, sequence, simulated) => match result {
                        Ok(outcome) => outcome,
                        Err(e) => {
                            error!("❌ Job {} failed: {}", job.content_address, e);
                            JobOutcome::from_error(&e)
                        }
                    },
                    _ = cancelled(&mut cancel) => {
                        warn!("⏱️ Job {} abandoned at pass deadline", job.content_address);
                        JobOutcome::cancelled()
                    }
                }
            }));
        }

        let results = join_all(tasks).await;
        watchdog.abort();

        let outcomes: Vec<JobReport> = meta
            .into_iter()
            .zip(results)
            .map(|((content_address, publisher, sequence), joined)| JobReport {
                content_address,
                publisher,
                sequence,
                outcome: joined.unwrap_or_else(|e| {
                    JobOutcome::from_error(&AppError::Internal(format!("job task aborted: {}", e)))
                }),
            })
            .collect();

        let report = PassReport {
            pass_id,
            simulated,
            started_at,
            finished_at: Utc::now(),
            base_sequence: Some(plan.base()),
            outcomes,
        };
        info!(
            "✓ Pass {} finished: {} settled, {} failed, {} total",
            pass_id,
            report.settled_count(),
            report.failures().count(),
            report.outcomes.len()
        );
        Ok(self.store_report(report))
    }

    fn store_report(&self, report: PassReport) -> PassReport {
        *self.last_report.write() = Some(report.clone());
        report
    }

    #[instrument(
        skip(self, job),
        fields(job = %job.content_address, publisher = %job.publisher)
    )]
    async fn process_job(&self, job: &Job, sequence: u64, simulated: bool) -> AppResult<JobOutcome> {
        let deals = self.status.deal_status(&job.content_address).await?;

        let facts = select_facts(&deals);
        if facts.is_empty() {
            info!("No active deals yet ({} reported), leaving unsettled", deals.len());
            return Ok(JobOutcome::NoActiveDeals);
        }

        let activation = earliest_activation(&deals)
            .ok_or_else(|| JobError::MissingActivation(job.content_address.to_string()))?;

        let facts = if simulated {
            facts
        } else {
            dedup_against_ledger(
                self.ledger.as_ref(),
                &job.publisher,
                facts,
                self.settings.recent_facts_window,
            )
            .await
        };

        let outcome = if facts.is_empty() {
            info!("All active deals already recorded, settling without a write");
            JobOutcome::SettledWithoutWrite { activation }
        } else {
            let receipt = self.submitter.submit(&job.publisher, &facts, sequence).await?;
            JobOutcome::SettledAfterWrite {
                activation,
                tx_hash: receipt.tx_hash,
                facts: facts.len(),
            }
        };

        self.jobs.settle_job(&job.content_address, activation).await?;
        info!("✅ Settled at {}", activation);
        Ok(outcome)
    }
}

/// Resolves once the pass deadline has fired.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
