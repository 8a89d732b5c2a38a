use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Deal identifier assigned by the storage network.
///
/// Unique within the network at a point in time, but the same id may show
/// up again for an unrelated content address later on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DealId(pub u64);

impl fmt::Display for DealId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state reported for a deal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DealStatus {
    Queued,
    Published,
    Active,
    Other,
}

impl DealStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "queued" => DealStatus::Queued,
            "published" => DealStatus::Published,
            "active" => DealStatus::Active,
            _ => DealStatus::Other,
        }
    }
}

/// Storage commitment reported by the status provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deal {
    pub deal_id: DealId,
    pub selector_path: String,
    pub status: DealStatus,
    /// Present once the deal is active
    pub activation: Option<DateTime<Utc>>,
}

impl Deal {
    pub fn is_active(&self) -> bool {
        self.status == DealStatus::Active
    }
}
