//! In-memory collaborators that record what the reconciler asks of them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::deals::{Deal, DealId, DealStatus, StatusProvider};
use crate::error::{AppResult, LedgerError, StatusError};
use crate::jobs::{ContentAddress, Job, JobStore, NewJob, Pub};
use crate::ledger::{FeeEstimate, FeeParams, LedgerClient, LedgerFact, Receipt, TxHandle};

pub fn job(name: &str, publisher: Pub) -> Job {
    Job {
        publisher,
        content_address: cid(name),
        source_timestamp: None,
        cache_expiry: None,
        settled_at: None,
    }
}

pub fn cid(name: &str) -> ContentAddress {
    ContentAddress::from_bytes(name.as_bytes().to_vec())
}

pub fn active(id: u64, activation: DateTime<Utc>) -> Deal {
    Deal {
        deal_id: DealId(id),
        selector_path: format!("Links/{}/Hash", id),
        status: DealStatus::Active,
        activation: Some(activation),
    }
}

pub fn queued(id: u64) -> Deal {
    Deal {
        deal_id: DealId(id),
        selector_path: format!("Links/{}/Hash", id),
        status: DealStatus::Queued,
        activation: None,
    }
}

#[derive(Default)]
pub struct FakeJobStore {
    jobs: Mutex<Vec<Job>>,
    settlements: Mutex<Vec<(ContentAddress, DateTime<Utc>)>>,
    hang_listing: bool,
}

impl FakeJobStore {
    pub fn new(jobs: Vec<Job>) -> Self {
        Self {
            jobs: Mutex::new(jobs),
            ..Self::default()
        }
    }

    /// `list_unsettled` never completes.
    pub fn hanging(mut self) -> Self {
        self.hang_listing = true;
        self
    }

    /// Every `settle_job` call, in call order.
    pub fn settlements(&self) -> Vec<(ContentAddress, DateTime<Utc>)> {
        self.settlements.lock().clone()
    }

    pub fn settled_at(&self, content_address: &ContentAddress) -> Option<DateTime<Utc>> {
        self.jobs
            .lock()
            .iter()
            .find(|j| &j.content_address == content_address)
            .and_then(|j| j.settled_at)
    }
}

#[async_trait]
impl JobStore for FakeJobStore {
    async fn create_job(&self, job: &NewJob) -> AppResult<()> {
        self.jobs.lock().push(Job {
            publisher: job.publisher.clone(),
            content_address: job.content_address.clone(),
            source_timestamp: job.source_timestamp,
            cache_expiry: job.cache_expiry(Utc::now())?,
            settled_at: None,
        });
        Ok(())
    }

    async fn list_unsettled(&self) -> AppResult<Vec<Job>> {
        if self.hang_listing {
            std::future::pending::<()>().await;
        }
        Ok(self
            .jobs
            .lock()
            .iter()
            .filter(|j| j.settled_at.is_none())
            .cloned()
            .collect())
    }

    async fn settle_job(&self, content_address: &ContentAddress, activation: DateTime<Utc>) -> AppResult<()> {
        self.settlements.lock().push((content_address.clone(), activation));
        if let Some(job) = self
            .jobs
            .lock()
            .iter_mut()
            .find(|j| &j.content_address == content_address && j.settled_at.is_none())
        {
            job.settled_at = Some(activation);
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeStatusProvider {
    deals: Mutex<HashMap<ContentAddress, Vec<Deal>>>,
    failing: HashSet<ContentAddress>,
    hanging: HashSet<ContentAddress>,
    calls: AtomicUsize,
}

impl FakeStatusProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deals(self, content_address: ContentAddress, deals: Vec<Deal>) -> Self {
        self.deals.lock().insert(content_address, deals);
        self
    }

    pub fn failing_for(mut self, content_address: ContentAddress) -> Self {
        self.failing.insert(content_address);
        self
    }

    /// Requests for this address never complete.
    pub fn hanging_for(mut self, content_address: ContentAddress) -> Self {
        self.hanging.insert(content_address);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StatusProvider for FakeStatusProvider {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn deal_status(&self, content_address: &ContentAddress) -> AppResult<Vec<Deal>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.hanging.contains(content_address) {
            std::future::pending::<()>().await;
        }
        if self.failing.contains(content_address) {
            return Err(StatusError::HttpStatus {
                cid: content_address.to_string(),
                status: 503,
            }
            .into());
        }
        Ok(self.deals.lock().get(content_address).cloned().unwrap_or_default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteCall {
    pub publisher: Pub,
    pub facts: Vec<LedgerFact>,
    pub sequence: u64,
    pub fees: FeeParams,
}

/// Ledger whose writes land immediately unless configured otherwise.
pub struct FakeLedger {
    base_sequence: u64,
    recorded: Mutex<HashMap<Pub, Vec<DealId>>>,
    writes: Mutex<Vec<WriteCall>>,
    sequence_reads: AtomicUsize,
    recent_reads: AtomicUsize,
    fail_recent: bool,
    reject_writes: bool,
    revert: bool,
    lose_receipts: bool,
    hang_sequence_reads: bool,
}

impl FakeLedger {
    pub fn new(base_sequence: u64) -> Self {
        Self {
            base_sequence,
            recorded: Mutex::default(),
            writes: Mutex::default(),
            sequence_reads: AtomicUsize::new(0),
            recent_reads: AtomicUsize::new(0),
            fail_recent: false,
            reject_writes: false,
            revert: false,
            lose_receipts: false,
            hang_sequence_reads: false,
        }
    }

    /// `pending_sequence_number` never completes.
    pub fn hanging_sequence_reads(mut self) -> Self {
        self.hang_sequence_reads = true;
        self
    }

    pub fn failing_recent_facts(mut self) -> Self {
        self.fail_recent = true;
        self
    }

    pub fn rejecting_writes(mut self) -> Self {
        self.reject_writes = true;
        self
    }

    pub fn reverting(mut self) -> Self {
        self.revert = true;
        self
    }

    pub fn losing_receipts(mut self) -> Self {
        self.lose_receipts = true;
        self
    }

    /// Seed facts as if an earlier write had landed.
    pub fn record(&self, publisher: &Pub, facts: &[LedgerFact]) {
        self.recorded
            .lock()
            .entry(publisher.clone())
            .or_default()
            .extend(facts.iter().map(|f| f.deal_id));
    }

    pub fn writes(&self) -> Vec<WriteCall> {
        self.writes.lock().clone()
    }

    pub fn write_sequences(&self) -> Vec<u64> {
        let mut sequences: Vec<u64> = self.writes.lock().iter().map(|w| w.sequence).collect();
        sequences.sort_unstable();
        sequences
    }

    pub fn sequence_reads(&self) -> usize {
        self.sequence_reads.load(Ordering::SeqCst)
    }

    pub fn recent_reads(&self) -> usize {
        self.recent_reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LedgerClient for FakeLedger {
    async fn estimate_fee(&self, _publisher: &Pub, _facts: &[LedgerFact]) -> AppResult<FeeEstimate> {
        Ok(FeeEstimate {
            priority_fee_per_gas: 1,
            base_fee_per_gas: 1_000,
            gas_limit: 100_000,
        })
    }

    async fn pending_sequence_number(&self) -> AppResult<u64> {
        self.sequence_reads.fetch_add(1, Ordering::SeqCst);
        if self.hang_sequence_reads {
            std::future::pending::<()>().await;
        }
        Ok(self.base_sequence + self.writes.lock().len() as u64)
    }

    async fn recent_facts(&self, publisher: &Pub, k: u64) -> AppResult<HashSet<DealId>> {
        self.recent_reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_recent {
            return Err(LedgerError::Rpc {
                method: "eth_call",
                code: -32000,
                message: "header not found".into(),
            }
            .into());
        }
        let recorded = self.recorded.lock();
        let ids = recorded.get(publisher).map(Vec::as_slice).unwrap_or_default();
        let skip = ids.len().saturating_sub(k as usize);
        Ok(ids[skip..].iter().copied().collect())
    }

    async fn write_facts(
        &self,
        publisher: &Pub,
        facts: &[LedgerFact],
        sequence: u64,
        fees: &FeeParams,
    ) -> AppResult<TxHandle> {
        if self.reject_writes {
            return Err(LedgerError::Rejected {
                code: -32000,
                message: "replacement transaction underpriced".into(),
            }
            .into());
        }
        self.writes.lock().push(WriteCall {
            publisher: publisher.clone(),
            facts: facts.to_vec(),
            sequence,
            fees: *fees,
        });
        if !self.revert {
            self.record(publisher, facts);
        }
        Ok(TxHandle {
            tx_hash: format!("0x{:064x}", sequence),
            sequence,
        })
    }

    async fn await_receipt(&self, handle: &TxHandle) -> AppResult<Receipt> {
        if self.lose_receipts {
            return Err(LedgerError::ReceiptTimeout {
                tx_hash: handle.tx_hash.clone(),
                waited_secs: 150,
            }
            .into());
        }
        Ok(Receipt {
            tx_hash: handle.tx_hash.clone(),
            block_number: 100 + handle.sequence,
            succeeded: !self.revert,
            gas_used: 21_000,
        })
    }
}
