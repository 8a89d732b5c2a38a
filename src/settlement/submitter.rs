use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{AppResult, LedgerError};
use crate::jobs::Pub;
use crate::ledger::{FeePolicy, LedgerClient, LedgerFact, Receipt};

/// Estimates, writes and confirms one batch of facts.
#[derive(Clone)]
pub struct Submitter {
    ledger: Arc<dyn LedgerClient>,
    policy: FeePolicy,
}

impl Submitter {
    pub fn new(ledger: Arc<dyn LedgerClient>, policy: FeePolicy) -> Self {
        Self { ledger, policy }
    }

    /// Returns only once the write is included. A receipt that reports
    /// failure is a rejection.
    pub async fn submit(&self, publisher: &Pub, facts: &[LedgerFact], sequence: u64) -> AppResult<Receipt> {
        let estimate = self.ledger.estimate_fee(publisher, facts).await?;
        let fees = estimate.apply(&self.policy);

        let handle = self.ledger.write_facts(publisher, facts, sequence, &fees).await?;
        let receipt = self.ledger.await_receipt(&handle).await?;

        if !receipt.succeeded {
            warn!("❌ Write {} for {} reverted", receipt.tx_hash, publisher);
            return Err(LedgerError::Reverted {
                tx_hash: receipt.tx_hash,
                block_number: receipt.block_number,
            }
            .into());
        }

        info!(
            "✅ {} fact(s) for {} included in block {}",
            facts.len(),
            publisher,
            receipt.block_number
        );
        Ok(receipt)
    }
}
