//! In-memory chain for tests
//!
//! [`MockChain`] implements [`ChainClient`] without any network IO. Every
//! accepted transaction is committed in its own block and finalized at once,
//! which keeps block counts predictable in tests.
//!
//! # Features
//!
//! - Fail the first N sends (`fail_first_sends`)
//! - Slow down every single-transaction send (`delay_sends`)
//! - Fail fetches of specific blocks (`fail_block`)
//! - Fail the next N head lookups (`fail_recent_block`)
//! - Deny write rules (`deny_rules`)
//! - Relay check-ins as parent-chain transfers (`relay_checkins`)
//!
//! # Example
//!
//! ```
//! use shardbench::chain::mock::MockChain;
//!
//! let chain = MockChain::new();
//! chain.fail_first_sends(2);
//! assert_eq!(chain.tip(), 0);
//! ```

use super::{
    build_envelope, transaction_hash, Block, BlockHeader, ChainClient, ChainConnector, ChainError,
    ChainTransaction, SendResult, SignedTransaction, TransactionStatus, Wallet,
};
use crate::util::time::now_ms;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Default)]
struct MockState {
    blocks: Vec<Block>,
    finalized: HashMap<String, u64>,
    values: HashMap<String, Value>,
    sends: u64,
    fail_first_sends: u64,
    failing_blocks: HashSet<u64>,
    recent_block_failures: u32,
    deny_rules: bool,
    relay_delay_ms: Option<u64>,
    send_delay: Option<Duration>,
}

/// In-memory chain, cheap to clone (clones share state)
#[derive(Clone)]
pub struct MockChain {
    state: Arc<Mutex<MockState>>,
}

impl MockChain {
    /// A chain holding only the genesis block
    pub fn new() -> Self {
        let genesis = Block {
            number: 0,
            timestamp: now_ms(),
            hash: "0x0".to_string(),
            size: 0,
            transactions: Vec::new(),
        };
        Self {
            state: Arc::new(Mutex::new(MockState {
                blocks: vec![genesis],
                ..MockState::default()
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reject the first `count` single-transaction sends
    pub fn fail_first_sends(&self, count: u64) {
        self.state().fail_first_sends = count;
    }

    /// Hold every single-transaction send for `delay` before answering
    pub fn delay_sends(&self, delay: Duration) {
        self.state().send_delay = Some(delay);
    }

    /// Make `get_block(number, ..)` fail
    pub fn fail_block(&self, number: u64) {
        self.state().failing_blocks.insert(number);
    }

    /// Make the next `times` head lookups fail
    pub fn fail_recent_block(&self, times: u32) {
        self.state().recent_block_failures = times;
    }

    /// Report no write permission from `eval_rule`
    pub fn deny_rules(&self) {
        self.state().deny_rules = true;
    }

    pub fn set_value(&self, path: &str, value: Value) {
        self.state().values.insert(path.to_string(), value);
    }

    /// After each accepted check-in, commit the matching parent-chain transfer
    /// finalized `delay_ms` after the check-in timestamp
    pub fn relay_checkins(&self, delay_ms: u64) {
        self.state().relay_delay_ms = Some(delay_ms);
    }

    /// Commit a transaction in a new block, optionally finalized at `finalized_at`
    pub fn push_transaction(&self, tx: ChainTransaction, finalized_at: Option<u64>) -> u64 {
        let mut state = self.state();
        if let Some(at) = finalized_at {
            state.finalized.insert(tx.hash.clone(), at);
        }
        commit(&mut state, vec![tx])
    }

    /// Number of the last block
    pub fn tip(&self) -> u64 {
        self.state().blocks.last().map(|b| b.number).unwrap_or(0)
    }

    /// Single-transaction sends attempted so far
    pub fn send_attempts(&self) -> u64 {
        self.state().sends
    }

    /// All committed transactions, oldest first
    pub fn transactions(&self) -> Vec<ChainTransaction> {
        self.state()
            .blocks
            .iter()
            .flat_map(|b| b.transactions.iter().cloned())
            .collect()
    }

    fn accept(&self, tx: &Value) -> SendResult {
        let mut state = self.state();
        let committed = to_chain_transaction(tx);
        let hash = committed.hash.clone();
        let timestamp = committed.timestamp;
        let relay = state.relay_delay_ms.and_then(|delay| {
            checkin_transfer(&committed).map(|transfer| (transfer, timestamp + delay))
        });

        let now = now_ms();
        state.finalized.insert(hash.clone(), now);
        commit(&mut state, vec![committed]);

        if let Some((transfer, finalized_at)) = relay {
            state.finalized.insert(transfer.hash.clone(), finalized_at);
            commit(&mut state, vec![transfer]);
        }

        SendResult {
            tx_hash: Some(hash),
            result: true,
        }
    }
}

impl Default for MockChain {
    fn default() -> Self {
        Self::new()
    }
}

fn commit(state: &mut MockState, transactions: Vec<ChainTransaction>) -> u64 {
    let number = state.blocks.last().map(|b| b.number + 1).unwrap_or(0);
    state.blocks.push(Block {
        number,
        timestamp: now_ms(),
        hash: format!("0x{:x}", number),
        size: transactions.len() as u64,
        transactions,
    });
    number
}

fn to_chain_transaction(tx: &Value) -> ChainTransaction {
    ChainTransaction {
        hash: transaction_hash(tx),
        nonce: tx.get("nonce").and_then(Value::as_i64).unwrap_or(-1),
        timestamp: tx.get("timestamp").and_then(Value::as_u64).unwrap_or_else(now_ms),
        operation: tx.get("operation").cloned().unwrap_or(Value::Null),
        address: tx.get("address").and_then(Value::as_str).map(str::to_string),
    }
}

/// Parent-chain transfer for a check-in tx written under `.../checkin/...`
fn checkin_transfer(tx: &ChainTransaction) -> Option<ChainTransaction> {
    let path = tx.operation_ref()?;
    let (shard_path, _) = path.split_once("/checkin/")?;
    // payload ref: /transfer/{from}/{to}/{timestamp}/value
    let payload_ref = tx
        .operation
        .pointer("/value/payload/transaction/operation/ref")
        .and_then(Value::as_str)?;
    let mut segments = payload_ref.split('/').skip(2);
    let from = segments.next()?;
    let to = segments.next()?;
    let app = shard_path.trim_start_matches('/').split('/').nth(1).unwrap_or("shard");

    let transfer = json!({
        "operation": {
            "type": "SET_VALUE",
            "ref": format!("/apps/{}/transfer/{}/{}/checkin_{}/value", app, from, to, tx.timestamp),
            "value": 1,
        },
        "timestamp": tx.timestamp,
        "nonce": -1,
    });
    Some(to_chain_transaction(&transfer))
}

#[async_trait]
impl ChainClient for MockChain {
    async fn send_transaction(&self, tx: &Value) -> Result<SendResult, ChainError> {
        let delay = {
            let mut state = self.state();
            state.sends += 1;
            if state.sends <= state.fail_first_sends {
                return Err(ChainError::Unavailable(format!(
                    "mock send failure #{}",
                    state.sends
                )));
            }
            state.send_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.accept(tx))
    }

    async fn send_transaction_batch(&self, txs: &[Value]) -> Result<Vec<SendResult>, ChainError> {
        Ok(txs.iter().map(|tx| self.accept(tx)).collect())
    }

    async fn sign_transaction(&self, tx: &Value) -> Result<SignedTransaction, ChainError> {
        let address = tx.get("address").and_then(Value::as_str);
        Ok(build_envelope(tx, address))
    }

    async fn send_signed_transaction(&self, signed: &SignedTransaction) -> Result<SendResult, ChainError> {
        self.send_transaction(&signed.transaction).await
    }

    async fn get_block(&self, number: u64, include_txs: bool) -> Result<Block, ChainError> {
        let state = self.state();
        if state.failing_blocks.contains(&number) {
            return Err(ChainError::Unavailable(format!("mock block {} failure", number)));
        }
        let mut block = state
            .blocks
            .iter()
            .find(|b| b.number == number)
            .cloned()
            .ok_or_else(|| ChainError::Rpc {
                method: "ain_getBlockByNumber".to_string(),
                message: format!("block {} not found", number),
            })?;
        if !include_txs {
            block.transactions.clear();
        }
        Ok(block)
    }

    async fn get_recent_block(&self) -> Result<BlockHeader, ChainError> {
        let mut state = self.state();
        if state.recent_block_failures > 0 {
            state.recent_block_failures -= 1;
            return Err(ChainError::Unavailable("mock node is not ready".to_string()));
        }
        state
            .blocks
            .last()
            .map(|b| BlockHeader {
                number: b.number,
                timestamp: b.timestamp,
            })
            .ok_or_else(|| ChainError::Unavailable("empty chain".to_string()))
    }

    async fn get_last_block(&self) -> Result<BlockHeader, ChainError> {
        self.get_recent_block().await
    }

    async fn get_transaction(&self, tx_hash: &str) -> Result<Option<TransactionStatus>, ChainError> {
        Ok(self.state().finalized.get(tx_hash).map(|at| TransactionStatus {
            is_finalized: true,
            finalized_at: Some(*at),
        }))
    }

    async fn eval_rule(&self, _path: &str, _address: &str) -> Result<bool, ChainError> {
        Ok(!self.state().deny_rules)
    }

    async fn get_value(&self, path: &str) -> Result<Value, ChainError> {
        Ok(self.state().values.get(path).cloned().unwrap_or(Value::Null))
    }
}

/// Connector resolving endpoints to registered [`MockChain`]s
#[derive(Clone, Default)]
pub struct MockConnector {
    chains: Arc<Mutex<HashMap<String, MockChain>>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, endpoint: &str, chain: MockChain) {
        self.chains
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(endpoint.to_string(), chain);
    }
}

impl ChainConnector for MockConnector {
    fn connect(&self, endpoint: &str, _wallet: Option<Wallet>) -> Result<Arc<dyn ChainClient>, ChainError> {
        let chains = self.chains.lock().unwrap_or_else(PoisonError::into_inner);
        match chains.get(endpoint) {
            Some(chain) => Ok(Arc::new(chain.clone())),
            None => Err(ChainError::Unavailable(format!("unknown endpoint {}", endpoint))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set_value(i: u64) -> Value {
        json!({
            "operation": {"type": "SET_VALUE", "ref": "/apps/bench/tps", "value": i},
            "timestamp": 1000 + i,
            "nonce": -1,
        })
    }

    #[tokio::test]
    async fn test_each_send_commits_a_block() {
        let chain = MockChain::new();
        for i in 0..3 {
            let result = chain.send_transaction(&set_value(i)).await.unwrap();
            assert!(result.is_accepted());
        }
        assert_eq!(chain.tip(), 3);

        let block = chain.get_block(2, true).await.unwrap();
        assert_eq!(block.transactions.len(), 1);
        assert_eq!(block.transactions[0].timestamp, 1001);

        let hash = block.transactions[0].hash.clone();
        let status = chain.get_transaction(&hash).await.unwrap().unwrap();
        assert!(status.is_finalized);
    }

    #[tokio::test]
    async fn test_fail_first_sends() {
        let chain = MockChain::new();
        chain.fail_first_sends(2);
        assert!(chain.send_transaction(&set_value(0)).await.is_err());
        assert!(chain.send_transaction(&set_value(1)).await.is_err());
        assert!(chain.send_transaction(&set_value(2)).await.is_ok());
        assert_eq!(chain.send_attempts(), 3);
        assert_eq!(chain.tip(), 1);
    }

    #[tokio::test]
    async fn test_block_without_transactions() {
        let chain = MockChain::new();
        chain.send_transaction(&set_value(0)).await.unwrap();
        let block = chain.get_block(1, false).await.unwrap();
        assert!(block.transactions.is_empty());

        chain.fail_block(1);
        assert!(chain.get_block(1, true).await.is_err());
        assert!(chain.get_block(9, true).await.is_err());
    }

    #[tokio::test]
    async fn test_recent_block_failures() {
        let chain = MockChain::new();
        chain.fail_recent_block(1);
        assert!(chain.get_recent_block().await.is_err());
        assert_eq!(chain.get_recent_block().await.unwrap().number, 0);
    }

    #[test]
    fn test_connector_unknown_endpoint() {
        let connector = MockConnector::new();
        connector.register("http://a", MockChain::new());
        assert!(connector.connect("http://a", None).is_ok());
        assert!(connector.connect("http://b", None).is_err());
    }
}
