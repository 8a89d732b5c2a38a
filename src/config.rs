use std::str::FromStr;
use std::time::Duration;

use config::ConfigError;

use crate::ledger::models::Address;
use crate::ledger::TxSigner;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_address: String,
    pub status_api_url: String,
    pub status_api_token: String,
    pub ledger_rpc_url: String,
    pub contract_address: Address,
    /// Loaded from `LEDGER_PRIVATE_KEY`; the sender address is derived from it
    pub signer: TxSigner,
    pub chain_id: u64,
    /// Number of most recent on-chain facts consulted for dedup
    pub recent_facts_window: u64,
    pub priority_fee_multiplier: u128,
    pub gas_limit_multiplier: u64,
    pub receipt_timeout_secs: u64,
    pub receipt_poll_interval_secs: u64,
    pub pass_deadline_secs: u64,
    /// 0 disables the background scheduler
    pub schedule_interval_secs: u64,
    pub simulated: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let or_default = |key: &str, default: &str| {
            lookup(key).unwrap_or_else(|| default.to_string())
        };
        let required = |key: &str| lookup(key).ok_or_else(|| ConfigError::NotFound(key.to_string()));

        Ok(Self {
            database_url: or_default("DATABASE_URL", "postgresql://localhost/deal_settler"),
            bind_address: or_default("BIND_ADDRESS", "0.0.0.0:8080"),
            status_api_url: or_default("STATUS_API_URL", "https://api.web3.storage"),
            status_api_token: required("STATUS_API_TOKEN")?,
            ledger_rpc_url: required("LEDGER_RPC_URL")?,
            contract_address: parse_value("LEDGER_CONTRACT_ADDRESS", &required("LEDGER_CONTRACT_ADDRESS")?)?,
            signer: TxSigner::from_hex(&required("LEDGER_PRIVATE_KEY")?)
                .map_err(|e| ConfigError::Message(format!("LEDGER_PRIVATE_KEY is invalid: {}", e)))?,
            chain_id: parse_value("LEDGER_CHAIN_ID", &required("LEDGER_CHAIN_ID")?)?,
            recent_facts_window: parse_value("RECENT_FACTS_WINDOW", &or_default("RECENT_FACTS_WINDOW", "10"))?,
            priority_fee_multiplier: parse_value(
                "PRIORITY_FEE_MULTIPLIER",
                &or_default("PRIORITY_FEE_MULTIPLIER", "500"),
            )?,
            gas_limit_multiplier: parse_value("GAS_LIMIT_MULTIPLIER", &or_default("GAS_LIMIT_MULTIPLIER", "4"))?,
            receipt_timeout_secs: parse_value("RECEIPT_TIMEOUT_SECS", &or_default("RECEIPT_TIMEOUT_SECS", "150"))?,
            receipt_poll_interval_secs: parse_value(
                "RECEIPT_POLL_INTERVAL_SECS",
                &or_default("RECEIPT_POLL_INTERVAL_SECS", "5"),
            )?,
            pass_deadline_secs: parse_value("PASS_DEADLINE_SECS", &or_default("PASS_DEADLINE_SECS", "3300"))?,
            schedule_interval_secs: parse_value(
                "SCHEDULE_INTERVAL_SECS",
                &or_default("SCHEDULE_INTERVAL_SECS", "0"),
            )?,
            simulated: parse_value("SIMULATED", &or_default("SIMULATED", "false"))?,
        })
    }

    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_secs(self.receipt_timeout_secs)
    }

    pub fn receipt_poll_interval(&self) -> Duration {
        Duration::from_secs(self.receipt_poll_interval_secs.max(1))
    }

    pub fn pass_deadline(&self) -> Duration {
        Duration::from_secs(self.pass_deadline_secs)
    }

    pub fn schedule_interval(&self) -> Option<Duration> {
        (self.schedule_interval_secs > 0).then(|| Duration::from_secs(self.schedule_interval_secs))
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::Message(format!("{} has an invalid value {:?}: {}", key, raw, e)))
}
