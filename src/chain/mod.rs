//! Chain client capability
//!
//! Job strategies talk to the blockchain only through the [`ChainClient`] trait.
//! The worker owns a [`ChainConnector`] for its whole lifetime and asks it for a
//! client whenever a job is submitted, so the same strategy code runs against
//! the JSON-RPC transport in production and against [`mock::MockChain`] in tests.
//!
//! # Failure model
//!
//! Every call may fail with a [`ChainError`]. Strategies treat those failures as
//! recoverable per unit (one send, one block fetch) unless the call is part of
//! one-time job setup.

pub mod json_rpc;
pub mod mock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use thiserror::Error;

/// Protocol version attached to every envelope sent to the chain
pub const CURRENT_PROTOCOL_VERSION: &str = "0.1.0";

/// Errors returned by chain calls (the `UpstreamCallError` family)
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{method} returned error: {message}")]
    Rpc { method: String, message: String },

    #[error("{method}: unexpected response ({detail})")]
    Decode { method: String, detail: String },

    #[error("Transaction {tx_hash} was not finalized")]
    NotFinalized { tx_hash: String },

    #[error("{0}")]
    Unavailable(String),
}

/// Result of submitting one transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendResult {
    pub tx_hash: Option<String>,
    pub result: bool,
}

impl SendResult {
    /// The node returned a hash and reported success
    pub fn is_accepted(&self) -> bool {
        self.tx_hash.is_some() && self.result
    }
}

/// Block number and timestamp (ms) of a chain head
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub number: u64,
    pub timestamp: u64,
}

/// Transaction as it appears inside a block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainTransaction {
    pub hash: String,
    #[serde(default)]
    pub nonce: i64,
    #[serde(default)]
    pub timestamp: u64,
    #[serde(default)]
    pub operation: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl ChainTransaction {
    /// `operation.ref` of the transaction, if it has one
    pub fn operation_ref(&self) -> Option<&str> {
        self.operation.get("ref").and_then(Value::as_str)
    }
}

/// A block with (optionally) its transactions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub number: u64,
    pub timestamp: u64,
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub transactions: Vec<ChainTransaction>,
}

/// Finalization status of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionStatus {
    pub is_finalized: bool,
    pub finalized_at: Option<u64>,
}

/// A transaction wrapped in the envelope accepted by `send_signed_transaction`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub tx_hash: String,
    pub transaction: Value,
    pub signed_tx: Value,
}

/// Account used by strategies that write to the chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wallet {
    pub address: String,
    pub private_key: String,
}

/// The chain operations job strategies rely on
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Sign (when a wallet is configured) and submit one transaction
    async fn send_transaction(&self, tx: &Value) -> Result<SendResult, ChainError>;

    /// Submit several transactions in one request
    async fn send_transaction_batch(&self, txs: &[Value]) -> Result<Vec<SendResult>, ChainError>;

    /// Wrap a transaction in a submit envelope and compute its hash
    async fn sign_transaction(&self, tx: &Value) -> Result<SignedTransaction, ChainError>;

    /// Submit an envelope produced by [`ChainClient::sign_transaction`]
    async fn send_signed_transaction(&self, signed: &SignedTransaction) -> Result<SendResult, ChainError>;

    async fn get_block(&self, number: u64, include_txs: bool) -> Result<Block, ChainError>;

    async fn get_recent_block(&self) -> Result<BlockHeader, ChainError>;

    async fn get_last_block(&self) -> Result<BlockHeader, ChainError>;

    /// `None` when the node does not know the hash
    async fn get_transaction(&self, tx_hash: &str) -> Result<Option<TransactionStatus>, ChainError>;

    /// Whether `address` may write to `path`
    async fn eval_rule(&self, path: &str, address: &str) -> Result<bool, ChainError>;

    async fn get_value(&self, path: &str) -> Result<Value, ChainError>;
}

/// Builds chain clients for job configs
pub trait ChainConnector: Send + Sync {
    fn connect(&self, endpoint: &str, wallet: Option<Wallet>) -> Result<Arc<dyn ChainClient>, ChainError>;
}

/// Hash of a transaction: `0x` + hex(sha256(canonical JSON))
pub fn transaction_hash(tx: &Value) -> String {
    // serde_json keeps object keys sorted, which makes the encoding canonical
    let encoded = tx.to_string();
    let digest = Sha256::digest(encoded.as_bytes());
    format!("0x{}", hex::encode(digest))
}

/// Build the submit envelope for a transaction
///
/// Signature material is produced by the node-side wallet; the envelope only
/// names the sending address.
pub fn build_envelope(tx: &Value, address: Option<&str>) -> SignedTransaction {
    let mut signed_tx = json!({
        "protoVer": CURRENT_PROTOCOL_VERSION,
        "transaction": tx,
    });
    if let Some(address) = address {
        signed_tx["address"] = Value::String(address.to_string());
    }
    SignedTransaction {
        tx_hash: transaction_hash(tx),
        transaction: tx.clone(),
        signed_tx,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_hash_is_stable() {
        let a = json!({"operation": {"type": "SET_VALUE", "ref": "/apps/test"}, "nonce": -1});
        let b = json!({"nonce": -1, "operation": {"ref": "/apps/test", "type": "SET_VALUE"}});
        assert_eq!(transaction_hash(&a), transaction_hash(&b));
        assert!(transaction_hash(&a).starts_with("0x"));
        assert_eq!(transaction_hash(&a).len(), 2 + 64);
    }

    #[test]
    fn test_envelope_carries_address() {
        let tx = json!({"timestamp": 1});
        let signed = build_envelope(&tx, Some("0xabc"));
        assert_eq!(signed.signed_tx["address"], "0xabc");
        assert_eq!(signed.signed_tx["protoVer"], CURRENT_PROTOCOL_VERSION);
        assert_eq!(signed.transaction, tx);

        let anonymous = build_envelope(&tx, None);
        assert!(anonymous.signed_tx.get("address").is_none());
        assert_eq!(anonymous.tx_hash, signed.tx_hash);
    }

    #[test]
    fn test_send_result_acceptance() {
        assert!(SendResult { tx_hash: Some("0x1".into()), result: true }.is_accepted());
        assert!(!SendResult { tx_hash: Some("0x1".into()), result: false }.is_accepted());
        assert!(!SendResult { tx_hash: None, result: true }.is_accepted());
    }
}
