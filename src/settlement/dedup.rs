use std::collections::HashSet;
use tracing::{debug, warn};

use crate::deals::DealId;
use crate::jobs::Pub;
use crate::ledger::{LedgerClient, LedgerFact};

pub fn remove_recorded(facts: Vec<LedgerFact>, recorded: &HashSet<DealId>) -> Vec<LedgerFact> {
    facts
        .into_iter()
        .filter(|fact| !recorded.contains(&fact.deal_id))
        .collect()
}

/// Drop facts already among the `window` most recent ledger entries for
/// `publisher`. Best effort: if the ledger cannot be read the facts are
/// returned untouched and the contract is left to reject duplicates.
pub async fn dedup_against_ledger(
    ledger: &dyn LedgerClient,
    publisher: &Pub,
    facts: Vec<LedgerFact>,
    window: u64,
) -> Vec<LedgerFact> {
    match ledger.recent_facts(publisher, window).await {
        Ok(recorded) => {
            let before = facts.len();
            let remaining = remove_recorded(facts, &recorded);
            debug!(
                "Dedup for {}: {} candidate(s), {} already recorded",
                publisher,
                before,
                before - remaining.len()
            );
            remaining
        }
        Err(e) => {
            warn!("⚠️ Could not read recent facts for {}, submitting all: {}", publisher, e);
            facts
        }
    }
}
