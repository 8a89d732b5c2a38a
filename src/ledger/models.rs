use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::deals::{Deal, DealId};

/// 20-byte account or contract address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address(pub [u8; 20]);

impl FromStr for Address {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(digits).map_err(|e| format!("invalid address {}: {}", s, e))?;
        let raw: [u8; 20] = bytes
            .try_into()
            .map_err(|_| format!("invalid address {}: expected 20 bytes", s))?;
        Ok(Address(raw))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// On-chain projection of an active deal, recorded against a publisher.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LedgerFact {
    pub deal_id: DealId,
    pub selector_path: String,
}

impl From<&Deal> for LedgerFact {
    fn from(deal: &Deal) -> Self {
        Self {
            deal_id: deal.deal_id,
            selector_path: deal.selector_path.clone(),
        }
    }
}

/// Raw fee suggestion from the network, before any policy is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeEstimate {
    pub priority_fee_per_gas: u128,
    pub base_fee_per_gas: u128,
    pub gas_limit: u64,
}

/// How suggested fees are inflated before submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeePolicy {
    pub priority_fee_multiplier: u128,
    pub gas_limit_multiplier: u64,
}

impl Default for FeePolicy {
    fn default() -> Self {
        Self {
            priority_fee_multiplier: 500,
            gas_limit_multiplier: 4,
        }
    }
}

/// Fee parameters attached to a write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FeeParams {
    pub max_priority_fee_per_gas: u128,
    pub max_fee_per_gas: u128,
    pub gas_limit: u64,
}

impl FeeEstimate {
    /// Scale the tip and gas limit by the policy multipliers. The fee cap
    /// leaves room for the base fee to double.
    pub fn apply(&self, policy: &FeePolicy) -> FeeParams {
        let tip = self
            .priority_fee_per_gas
            .saturating_mul(policy.priority_fee_multiplier);
        FeeParams {
            max_priority_fee_per_gas: tip,
            max_fee_per_gas: self.base_fee_per_gas.saturating_mul(2).saturating_add(tip),
            gas_limit: self.gas_limit.saturating_mul(policy.gas_limit_multiplier),
        }
    }
}

/// Handle of a submitted write
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TxHandle {
    pub tx_hash: String,
    pub sequence: u64,
}

/// Inclusion receipt of a write
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Receipt {
    pub tx_hash: String,
    pub block_number: u64,
    pub succeeded: bool,
    pub gas_used: u64,
}
