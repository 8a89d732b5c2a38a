pub mod abi;
pub mod client;
pub mod models;
pub mod rpc;
pub mod signer;

pub use client::LedgerClient;
pub use models::{Address, FeeEstimate, FeeParams, FeePolicy, LedgerFact, Receipt, TxHandle};
pub use rpc::{RpcLedgerClient, RpcLedgerConfig};
pub use signer::TxSigner;
