use chrono::{DateTime, Utc};

use crate::deals::Deal;
use crate::ledger::LedgerFact;

/// Facts for the active deals, in the order the provider reported them.
pub fn select_facts(deals: &[Deal]) -> Vec<LedgerFact> {
    deals
        .iter()
        .filter(|deal| deal.is_active())
        .map(LedgerFact::from)
        .collect()
}

/// Earliest activation among active deals. Equal timestamps fall back to
/// the lower deal id so the choice does not depend on response order.
pub fn earliest_activation(deals: &[Deal]) -> Option<DateTime<Utc>> {
    deals
        .iter()
        .filter(|deal| deal.is_active())
        .filter_map(|deal| deal.activation.map(|at| (at, deal.deal_id)))
        .min()
        .map(|(at, _)| at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deals::{DealId, DealStatus};
    use chrono::TimeZone;

    fn deal(id: u64, status: DealStatus, activation: Option<DateTime<Utc>>) -> Deal {
        Deal {
            deal_id: DealId(id),
            selector_path: format!("Links/{}/Hash", id),
            status,
            activation,
        }
    }

    #[test]
    fn test_select_facts_keeps_only_active() {
        let t0 = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
        let deals = vec![
            deal(3, DealStatus::Active, Some(t0)),
            deal(4, DealStatus::Queued, None),
            deal(5, DealStatus::Published, None),
            deal(1, DealStatus::Active, Some(t0)),
            deal(6, DealStatus::Other, None),
        ];

        let facts = select_facts(&deals);
        let ids: Vec<DealId> = facts.iter().map(|f| f.deal_id).collect();
        assert_eq!(ids, vec![DealId(3), DealId(1)]);
        assert_eq!(facts[0].selector_path, "Links/3/Hash");
    }

    #[test]
    fn test_select_facts_empty() {
        assert!(select_facts(&[]).is_empty());
        assert!(select_facts(&[deal(5, DealStatus::Queued, None)]).is_empty());
    }

    #[test]
    fn test_earliest_activation() {
        let t1 = Utc.with_ymd_and_hms(2021, 1, 5, 3, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2021, 1, 5, 5, 0, 0).unwrap();
        let deals = vec![
            deal(2, DealStatus::Active, Some(t2)),
            deal(9, DealStatus::Queued, None),
            deal(1, DealStatus::Active, Some(t1)),
        ];
        assert_eq!(earliest_activation(&deals), Some(t1));
    }

    #[test]
    fn test_earliest_activation_ignores_inactive_deals() {
        let t_old = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
        let deals = vec![
            deal(7, DealStatus::Published, Some(t_old)),
            deal(8, DealStatus::Active, Some(t1)),
        ];
        assert_eq!(earliest_activation(&deals), Some(t1));
        assert_eq!(earliest_activation(&[deal(8, DealStatus::Active, None)]), None);
    }
}
