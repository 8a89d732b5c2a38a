use async_trait::async_trait;
use std::collections::HashSet;

use super::models::{FeeEstimate, FeeParams, LedgerFact, Receipt, TxHandle};
use crate::deals::DealId;
use crate::error::AppResult;
use crate::jobs::Pub;

/// Append-only deal ledger reached through a single sending identity.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Network fee suggestion for recording `facts` under `publisher`.
    async fn estimate_fee(&self, publisher: &Pub, facts: &[LedgerFact]) -> AppResult<FeeEstimate>;

    /// Next sequence number of the sender, counting pending writes.
    async fn pending_sequence_number(&self) -> AppResult<u64>;

    /// Deal ids among the `k` most recent facts recorded under `publisher`.
    async fn recent_facts(&self, publisher: &Pub, k: u64) -> AppResult<HashSet<DealId>>;

    async fn write_facts(
        &self,
        publisher: &Pub,
        facts: &[LedgerFact],
        sequence: u64,
        fees: &FeeParams,
    ) -> AppResult<TxHandle>;

    /// Block until the write is included or the client's wait budget runs out.
    async fn await_receipt(&self, handle: &TxHandle) -> AppResult<Receipt>;
}
