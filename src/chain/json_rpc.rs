//! JSON-RPC chain transport
//!
//! Posts `{jsonrpc, id, method, params}` requests to `{endpoint}/json-rpc`.
//! Node responses wrap the payload as `{result: {result: <payload>, protoVer}}`;
//! [`unwrap_result`] peels both layers.

use super::{
    build_envelope, Block, BlockHeader, ChainClient, ChainConnector, ChainError, SendResult,
    SignedTransaction, TransactionStatus, Wallet, CURRENT_PROTOCOL_VERSION,
};
use crate::util::time::now_ms;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Connector producing [`JsonRpcChainClient`]s with a shared request timeout
#[derive(Debug, Clone)]
pub struct JsonRpcConnector {
    timeout: Duration,
}

impl JsonRpcConnector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl ChainConnector for JsonRpcConnector {
    fn connect(&self, endpoint: &str, wallet: Option<Wallet>) -> Result<Arc<dyn ChainClient>, ChainError> {
        let client = JsonRpcChainClient::new(endpoint, wallet, self.timeout)?;
        Ok(Arc::new(client))
    }
}

pub struct JsonRpcChainClient {
    endpoint: String,
    http: reqwest::Client,
    wallet: Option<Wallet>,
    next_id: AtomicU64,
}

impl JsonRpcChainClient {
    pub fn new(endpoint: &str, wallet: Option<Wallet>, timeout: Duration) -> Result<Self, ChainError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| ChainError::Transport {
                endpoint: endpoint.to_string(),
                source,
            })?;

        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            http,
            wallet,
            next_id: AtomicU64::new(1),
        })
    }

    fn address(&self) -> Option<&str> {
        self.wallet.as_ref().map(|w| w.address.as_str())
    }

    async fn call(&self, method: &str, mut params: Value) -> Result<Value, ChainError> {
        if let Some(map) = params.as_object_mut() {
            map.insert("protoVer".to_string(), Value::from(CURRENT_PROTOCOL_VERSION));
        }
        let request = json!({
            "jsonrpc": "2.0",
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
            "method": method,
            "params": params,
        });

        debug!(endpoint = %self.endpoint, method, "json-rpc call");

        let response = self
            .http
            .post(format!("{}/json-rpc", self.endpoint))
            .json(&request)
            .send()
            .await
            .map_err(|source| self.transport(source))?;

        let status = response.status();
        let body: Value = response.json().await.map_err(|source| self.transport(source))?;

        if let Some(error) = body.get("error") {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            return Err(ChainError::Rpc {
                method: method.to_string(),
                message,
            });
        }
        if !status.is_success() {
            return Err(ChainError::Rpc {
                method: method.to_string(),
                message: format!("status: {}, data: {}", status.as_u16(), body),
            });
        }

        Ok(unwrap_result(body))
    }

    async fn call_as<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, ChainError> {
        let result = self.call(method, params).await?;
        decode(method, result)
    }

    fn transport(&self, source: reqwest::Error) -> ChainError {
        ChainError::Transport {
            endpoint: self.endpoint.clone(),
            source,
        }
    }
}

#[async_trait]
impl ChainClient for JsonRpcChainClient {
    async fn send_transaction(&self, tx: &Value) -> Result<SendResult, ChainError> {
        let signed = self.sign_transaction(tx).await?;
        self.send_signed_transaction(&signed).await
    }

    async fn send_transaction_batch(&self, txs: &[Value]) -> Result<Vec<SendResult>, ChainError> {
        let tx_list: Vec<Value> = txs
            .iter()
            .map(|tx| build_envelope(tx, self.address()).signed_tx)
            .collect();
        let result = self
            .call("ain_sendSignedTransactionBatch", json!({ "tx_list": tx_list }))
            .await?;

        match result {
            Value::Array(items) => Ok(items.iter().map(parse_send_result).collect()),
            other => Err(ChainError::Decode {
                method: "ain_sendSignedTransactionBatch".to_string(),
                detail: format!("expected array, got {}", other),
            }),
        }
    }

    async fn sign_transaction(&self, tx: &Value) -> Result<SignedTransaction, ChainError> {
        Ok(build_envelope(tx, self.address()))
    }

    async fn send_signed_transaction(&self, signed: &SignedTransaction) -> Result<SendResult, ChainError> {
        let result = self
            .call("ain_sendSignedTransaction", signed.signed_tx.clone())
            .await?;
        Ok(parse_send_result(&result))
    }

    async fn get_block(&self, number: u64, include_txs: bool) -> Result<Block, ChainError> {
        let method = "ain_getBlockByNumber";
        let result = self
            .call(method, json!({ "number": number, "getFullTransactions": include_txs }))
            .await?;
        if result.is_null() {
            return Err(ChainError::Rpc {
                method: method.to_string(),
                message: format!("block {} not found", number),
            });
        }
        decode(method, result)
    }

    async fn get_recent_block(&self) -> Result<BlockHeader, ChainError> {
        self.call_as("ain_getRecentBlock", json!({})).await
    }

    async fn get_last_block(&self) -> Result<BlockHeader, ChainError> {
        self.call_as("ain_getLastBlock", json!({})).await
    }

    async fn get_transaction(&self, tx_hash: &str) -> Result<Option<TransactionStatus>, ChainError> {
        let result = self
            .call("ain_getTransactionByHash", json!({ "hash": tx_hash }))
            .await?;
        if result.is_null() {
            return Ok(None);
        }
        Ok(Some(TransactionStatus {
            is_finalized: result
                .get("is_finalized")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            finalized_at: result.get("finalized_at").and_then(Value::as_u64),
        }))
    }

    async fn eval_rule(&self, path: &str, address: &str) -> Result<bool, ChainError> {
        let params = json!({
            "ref": path,
            "value": null,
            "address": address,
            "timestamp": now_ms(),
        });
        self.call_as("ain_evalRule", params).await
    }

    async fn get_value(&self, path: &str) -> Result<Value, ChainError> {
        self.call("ain_get", json!({ "type": "GET_VALUE", "ref": path })).await
    }
}

/// Strip the `{result, protoVer}` wrapper of a node response
pub fn unwrap_result(body: Value) -> Value {
    let Some(result) = body.get("result") else {
        return Value::Null;
    };
    match result.get("result") {
        Some(inner) if result.get("protoVer").is_some() => inner.clone(),
        _ => result.clone(),
    }
}

/// `{tx_hash, result}` where `result` is either a bool or `{code, ...}`
fn parse_send_result(value: &Value) -> SendResult {
    let tx_hash = value.get("tx_hash").and_then(Value::as_str).map(str::to_string);
    let result = match value.get("result") {
        Some(Value::Bool(ok)) => *ok,
        Some(Value::Object(body)) => body.get("code").and_then(Value::as_i64).unwrap_or(0) == 0,
        Some(Value::Null) | None => false,
        Some(_) => true,
    };
    SendResult { tx_hash, result }
}

fn decode<T: DeserializeOwned>(method: &str, value: Value) -> Result<T, ChainError> {
    serde_json::from_value(value).map_err(|e| ChainError::Decode {
        method: method.to_string(),
        detail: e.to_string(),
    })
}
