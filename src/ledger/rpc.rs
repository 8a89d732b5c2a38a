use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::abi;
use super::client::LedgerClient;
use super::models::{Address, FeeEstimate, FeeParams, LedgerFact, Receipt, TxHandle};
use super::signer::{Eip1559Tx, TxSigner};
use crate::deals::DealId;
use crate::error::{AppResult, LedgerError};
use crate::jobs::Pub;

/// Node error messages that mean the write itself was refused.
const REJECTION_MARKERS: [&str; 5] = ["nonce", "underpriced", "revert", "already known", "replacement"];

#[derive(Debug, Clone)]
pub struct RpcLedgerConfig {
    pub rpc_url: String,
    pub contract: Address,
    /// Signs every write locally; its address is the sending account
    pub signer: TxSigner,
    pub chain_id: u64,
    pub receipt_timeout: Duration,
    pub receipt_poll_interval: Duration,
}

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlockHeader {
    base_fee_per_gas: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    transaction_hash: String,
    block_number: String,
    status: Option<String>,
    gas_used: String,
}

/// Deal registry contract reached over Ethereum-style JSON-RPC.
pub struct RpcLedgerClient {
    config: RpcLedgerConfig,
    client: Client,
    next_id: AtomicU64,
}

impl RpcLedgerClient {
    pub fn new(config: RpcLedgerConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            config,
            client,
            next_id: AtomicU64::new(1),
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: Value,
    ) -> Result<Option<T>, LedgerError> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };
        debug!("→ {} (id {})", method, request.id);

        let response: RpcResponse<T> = self
            .client
            .post(&self.config.rpc_url)
            .json(&request)
            .send()
            .await
            .map_err(|source| LedgerError::Transport { method, source })?
            .json()
            .await
            .map_err(|e| LedgerError::Decode {
                method,
                message: e.to_string(),
            })?;

        if let Some(error) = response.error {
            return Err(LedgerError::Rpc {
                method,
                code: error.code,
                message: error.message,
            });
        }
        Ok(response.result)
    }

    async fn call_required<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: Value,
    ) -> Result<T, LedgerError> {
        self.call(method, params).await?.ok_or_else(|| LedgerError::Decode {
            method,
            message: "missing result".to_string(),
        })
    }

    fn call_object(&self, data: &[u8]) -> Value {
        json!({
            "from": self.config.signer.address().to_string(),
            "to": self.config.contract.to_string(),
            "data": format!("0x{}", hex::encode(data)),
        })
    }
}

fn parse_quantity(method: &'static str, raw: &str) -> Result<u128, LedgerError> {
    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    if digits.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(digits, 16).map_err(|e| LedgerError::Decode {
        method,
        message: format!("bad quantity {:?}: {}", raw, e),
    })
}

fn parse_u64_quantity(method: &'static str, raw: &str) -> Result<u64, LedgerError> {
    let value = parse_quantity(method, raw)?;
    u64::try_from(value).map_err(|_| LedgerError::Decode {
        method,
        message: format!("quantity {} exceeds 64 bits", raw),
    })
}

fn classify_rejection(err: LedgerError) -> LedgerError {
    match err {
        LedgerError::Rpc {
            method,
            code,
            message,
        } => {
            let lowered = message.to_lowercase();
            if REJECTION_MARKERS.iter().any(|marker| lowered.contains(marker)) {
                LedgerError::Rejected { code, message }
            } else {
                LedgerError::Rpc {
                    method,
                    code,
                    message,
                }
            }
        }
        other => other,
    }
}

#[async_trait]
impl LedgerClient for RpcLedgerClient {
    async fn estimate_fee(&self, publisher: &Pub, facts: &[LedgerFact]) -> AppResult<FeeEstimate> {
        let data = abi::encode_add_deals(&publisher.ledger_key(), facts);
        let call = self.call_object(&data);

        let (tip, block, gas) = tokio::try_join!(
            self.call_required::<String>("eth_maxPriorityFeePerGas", json!([])),
            self.call_required::<BlockHeader>("eth_getBlockByNumber", json!(["latest", false])),
            async {
                self.call_required::<String>("eth_estimateGas", json!([call]))
                    .await
                    .map_err(classify_rejection)
            },
        )?;

        let base_fee = block.base_fee_per_gas.ok_or(LedgerError::Decode {
            method: "eth_getBlockByNumber",
            message: "block has no baseFeePerGas".to_string(),
        })?;

        Ok(FeeEstimate {
            priority_fee_per_gas: parse_quantity("eth_maxPriorityFeePerGas", &tip)?,
            base_fee_per_gas: parse_quantity("eth_getBlockByNumber", &base_fee)?,
            gas_limit: parse_u64_quantity("eth_estimateGas", &gas)?,
        })
    }

    async fn pending_sequence_number(&self) -> AppResult<u64> {
        let raw: String = self
            .call_required(
                "eth_getTransactionCount",
                json!([self.config.signer.address().to_string(), "pending"]),
            )
            .await?;
        Ok(parse_u64_quantity("eth_getTransactionCount", &raw)?)
    }

    async fn recent_facts(&self, publisher: &Pub, k: u64) -> AppResult<HashSet<DealId>> {
        let data = abi::encode_latest_n_deals(&publisher.ledger_key(), k);
        let raw: String = self
            .call_required("eth_call", json!([self.call_object(&data), "pending"]))
            .await?;

        let bytes = hex::decode(raw.trim_start_matches("0x")).map_err(|e| LedgerError::Decode {
            method: "eth_call",
            message: e.to_string(),
        })?;
        let facts = abi::decode_fact_array_output(&bytes)?;
        debug!("{} recent fact(s) on ledger for {}", facts.len(), publisher);

        Ok(facts.into_iter().map(|fact| fact.deal_id).collect())
    }

    async fn write_facts(
        &self,
        publisher: &Pub,
        facts: &[LedgerFact],
        sequence: u64,
        fees: &FeeParams,
    ) -> AppResult<TxHandle> {
        let tx = Eip1559Tx {
            chain_id: self.config.chain_id,
            nonce: sequence,
            max_priority_fee_per_gas: fees.max_priority_fee_per_gas,
            max_fee_per_gas: fees.max_fee_per_gas,
            gas_limit: fees.gas_limit,
            to: self.config.contract,
            value: 0,
            data: abi::encode_add_deals(&publisher.ledger_key(), facts),
        };
        let signed = self.config.signer.sign(&tx)?;

        let tx_hash: String = self
            .call_required("eth_sendRawTransaction", json!([signed.raw_hex()]))
            .await
            .map_err(classify_rejection)?;
        if !tx_hash.eq_ignore_ascii_case(&signed.hash_hex()) {
            warn!("Node reported tx {} for locally signed {}", tx_hash, signed.hash_hex());
        }

        info!(
            "📝 Submitted {} fact(s) for {} (sequence {}, tx {})",
            facts.len(),
            publisher,
            sequence,
            tx_hash
        );
        Ok(TxHandle { tx_hash, sequence })
    }

    async fn await_receipt(&self, handle: &TxHandle) -> AppResult<Receipt> {
        let started = Instant::now();

        loop {
            match self
                .call::<RawReceipt>("eth_getTransactionReceipt", json!([handle.tx_hash]))
                .await
            {
                Ok(Some(raw)) => {
                    let method = "eth_getTransactionReceipt";
                    return Ok(Receipt {
                        tx_hash: raw.transaction_hash,
                        block_number: parse_u64_quantity(method, &raw.block_number)?,
                        succeeded: raw.status.as_deref() == Some("0x1"),
                        gas_used: parse_u64_quantity(method, &raw.gas_used)?,
                    });
                }
                Ok(None) => debug!("Receipt for {} not available yet", handle.tx_hash),
                Err(e) => warn!("Receipt poll for {} failed: {}", handle.tx_hash, e),
            }

            if started.elapsed() >= self.config.receipt_timeout {
                return Err(LedgerError::ReceiptTimeout {
                    tx_hash: handle.tx_hash.clone(),
                    waited_secs: self.config.receipt_timeout.as_secs(),
                }
                .into());
            }
            tokio::time::sleep(self.config.receipt_poll_interval).await;
        }
    }
}
