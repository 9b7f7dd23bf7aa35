//! Shared test helpers and utilities.
//!
//! Provides an in-memory [`ChainGateway`] and factory functions for blocks,
//! transactions and receipts with sensible defaults.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{address, Address, Bytes, B256, U256};
use alloy::sol_types::SolValue;
use async_trait::async_trait;
use profiler_data::signatures::TRANSFER_TOPIC;
use profiler_data::{
    Block, CancelFlag, ChainGateway, Log, ProfilerConfig, ProfilerError, Receipt, TraceMode,
    Transaction,
};
use profiler_scan::{ScanReport, Scanner};
use serde_json::Value;

pub const SENDER: Address = address!("f39fd6e51aad88f6f4ce6ab8827279cfffb92266");
pub const ALICE: Address = address!("70997970c51812e339d9b73b0245ad59e15ebbf9");
pub const ROUTER: Address = address!("7a250d5630b4cf539739df2c5dacb4c659f2488d");
pub const USDC: Address = address!("a0b86991c6218b36c1d19d4a2e9eb0ce3606eb48");

pub const GWEI: u128 = 1_000_000_000;
pub const ONE_ETH: u64 = 1_000_000_000_000_000_000;

/// `symbol()`, `name()`, `decimals()` selectors.
const SYMBOL_SELECTOR: [u8; 4] = [0x95, 0xd8, 0x9b, 0x41];
const NAME_SELECTOR: [u8; 4] = [0x06, 0xfd, 0xde, 0x03];

/// Per-method call counters.
#[derive(Debug, Default)]
pub struct CallCounts {
    pub blocks: AtomicU64,
    pub receipts: AtomicU64,
    pub logs: AtomicU64,
    pub code: AtomicU64,
    pub eth_call: AtomicU64,
    pub traces: AtomicU64,
}

pub fn count(counter: &AtomicU64) -> u64 {
    counter.load(Ordering::SeqCst)
}

/// Chain held entirely in memory.
///
/// Receipts are stored by transaction hash and their logs double as the
/// `eth_getLogs` source, so both scan passes see the same data.
#[derive(Debug, Default)]
pub struct MemoryGateway {
    chain_id: u64,
    blocks: BTreeMap<u64, Block>,
    receipts: HashMap<B256, Receipt>,
    contracts: HashSet<Address>,
    tokens: HashMap<Address, (String, String, u8)>,
    traces: HashMap<u64, Value>,
    failing_blocks: HashSet<u64>,
    failing_receipts: HashSet<B256>,
    failing_log_chunks: HashSet<u64>,
    slow_blocks: HashMap<u64, Duration>,
    cancel_on_block: Option<(u64, CancelFlag)>,
    pub calls: CallCounts,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self {
            chain_id: 1,
            ..Self::default()
        }
    }

    /// Adds a block; `receipts[i]` belongs to `block.transactions[i]`.
    pub fn with_block(mut self, block: Block, receipts: Vec<Receipt>) -> Self {
        assert_eq!(block.transactions.len(), receipts.len(), "one receipt per tx");
        for (tx, mut receipt) in block.transactions.iter().zip(receipts) {
            for log in &mut receipt.logs {
                log.transaction_hash = Some(tx.hash);
                log.block_number = Some(block.number);
            }
            self.receipts.insert(tx.hash, receipt);
        }
        self.blocks.insert(block.number, block);
        self
    }

    pub fn with_contract(mut self, address: Address) -> Self {
        self.contracts.insert(address);
        self
    }

    pub fn with_token(mut self, address: Address, symbol: &str, name: &str, decimals: u8) -> Self {
        self.tokens
            .insert(address, (symbol.to_string(), name.to_string(), decimals));
        self
    }

    pub fn with_trace(mut self, number: u64, trace: Value) -> Self {
        self.traces.insert(number, trace);
        self
    }

    /// `eth_getBlockByNumber(number)` fails with a network error.
    pub fn failing_block(mut self, number: u64) -> Self {
        self.failing_blocks.insert(number);
        self
    }

    /// `eth_getTransactionReceipt(hash)` fails with a network error.
    pub fn failing_receipt(mut self, hash: B256) -> Self {
        self.failing_receipts.insert(hash);
        self
    }

    /// `eth_getLogs` fails for the chunk starting at `from`.
    pub fn failing_log_chunk(mut self, from: u64) -> Self {
        self.failing_log_chunks.insert(from);
        self
    }

    /// `eth_getBlockByNumber(number)` answers only after `delay`.
    pub fn slow_block(mut self, number: u64, delay: Duration) -> Self {
        self.slow_blocks.insert(number, delay);
        self
    }

    /// Raises `cancel` as soon as block `number` is requested.
    pub fn cancel_on_block(mut self, number: u64, cancel: CancelFlag) -> Self {
        self.cancel_on_block = Some((number, cancel));
        self
    }
}

#[async_trait]
impl ChainGateway for MemoryGateway {
    async fn chain_id(&self) -> Result<u64, ProfilerError> {
        Ok(self.chain_id)
    }

    async fn fetch_block(&self, number: u64) -> Result<Block, ProfilerError> {
        self.calls.blocks.fetch_add(1, Ordering::SeqCst);
        if let Some((trigger, cancel)) = &self.cancel_on_block {
            if *trigger == number {
                cancel.cancel();
            }
        }
        if let Some(delay) = self.slow_blocks.get(&number) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing_blocks.contains(&number) {
            return Err(ProfilerError::network(format!("connection reset at block {number}")));
        }
        self.blocks
            .get(&number)
            .cloned()
            .ok_or_else(|| ProfilerError::decode(format!("block {number} not found")))
    }

    async fn fetch_receipt(&self, hash: B256) -> Result<Receipt, ProfilerError> {
        self.calls.receipts.fetch_add(1, Ordering::SeqCst);
        if self.failing_receipts.contains(&hash) {
            return Err(ProfilerError::network(format!("receipt {hash} timed out")));
        }
        self.receipts
            .get(&hash)
            .cloned()
            .ok_or_else(|| ProfilerError::decode(format!("receipt {hash} not found")))
    }

    async fn fetch_logs(
        &self,
        from: u64,
        to: u64,
        topics: &[B256],
    ) -> Result<Vec<Log>, ProfilerError> {
        self.calls.logs.fetch_add(1, Ordering::SeqCst);
        if self.failing_log_chunks.contains(&from) {
            return Err(ProfilerError::network(format!("eth_getLogs {from}..={to} rejected")));
        }
        let mut out = Vec::new();
        for block in self.blocks.range(from..=to).map(|(_, b)| b) {
            for tx in &block.transactions {
                let Some(receipt) = self.receipts.get(&tx.hash) else {
                    continue;
                };
                out.extend(
                    receipt
                        .logs
                        .iter()
                        .filter(|log| log.topic0().is_some_and(|t| topics.contains(t)))
                        .cloned(),
                );
            }
        }
        Ok(out)
    }

    async fn code_at(&self, address: Address) -> Result<Bytes, ProfilerError> {
        self.calls.code.fetch_add(1, Ordering::SeqCst);
        if self.contracts.contains(&address) || self.tokens.contains_key(&address) {
            Ok(Bytes::from_static(&[0x60, 0x80, 0x60, 0x40]))
        } else {
            Ok(Bytes::new())
        }
    }

    async fn call(&self, to: Address, calldata: Bytes) -> Result<Bytes, ProfilerError> {
        self.calls.eth_call.fetch_add(1, Ordering::SeqCst);
        let Some((symbol, name, decimals)) = self.tokens.get(&to) else {
            return Err(ProfilerError::network("execution reverted"));
        };
        let out = match calldata.get(..4) {
            Some(s) if s == SYMBOL_SELECTOR.as_slice() => symbol.clone().abi_encode(),
            Some(s) if s == NAME_SELECTOR.as_slice() => name.clone().abi_encode(),
            _ => U256::from(*decimals).abi_encode(),
        };
        Ok(Bytes::from(out))
    }

    async fn trace_block(&self, number: u64, mode: TraceMode) -> Result<Value, ProfilerError> {
        self.calls.traces.fetch_add(1, Ordering::SeqCst);
        if mode == TraceMode::None {
            return Ok(Value::Null);
        }
        self.traces
            .get(&number)
            .cloned()
            .ok_or_else(|| ProfilerError::network(format!("no trace for block {number}")))
    }
}

/// Transaction from [`SENDER`] with a hash derived from `id`, priced at 20 gwei.
pub fn tx(id: u8, to: Option<Address>, value_wei: u64) -> Transaction {
    Transaction {
        hash: B256::repeat_byte(id),
        from: SENDER,
        to,
        value: U256::from(value_wei),
        gas_price: 20 * GWEI,
    }
}

/// Block `number` with a 12-second cadence from a fixed genesis.
pub fn block(number: u64, transactions: Vec<Transaction>) -> Block {
    Block {
        number,
        timestamp: 1_700_000_000 + number * 12,
        gas_used: 21_000 * transactions.len() as u64,
        gas_limit: 30_000_000,
        transactions,
    }
}

pub fn receipt(gas_used: u64, logs: Vec<Log>) -> Receipt {
    Receipt { gas_used, logs }
}

/// ERC-20 style `Transfer`: amount in `data`.
pub fn erc20_transfer(token: Address, amount: u64) -> Log {
    Log {
        address: token,
        topics: vec![TRANSFER_TOPIC, SENDER.into_word(), ALICE.into_word()],
        data: Bytes::from(U256::from(amount).to_be_bytes::<32>().to_vec()),
        transaction_hash: None,
        block_number: None,
    }
}

/// ERC-721 style `Transfer`: token id indexed, `data` empty.
pub fn erc721_transfer(token: Address, token_id: u64) -> Log {
    Log {
        address: token,
        topics: vec![
            TRANSFER_TOPIC,
            SENDER.into_word(),
            ALICE.into_word(),
            B256::from(U256::from(token_id)),
        ],
        data: Bytes::new(),
        transaction_hash: None,
        block_number: None,
    }
}

pub fn config(start_block: u64, end_block: u64) -> ProfilerConfig {
    ProfilerConfig {
        rpc_url: "memory://".to_string(),
        start_block,
        end_block,
        page_size: 2,
        concurrency: 4,
        ..ProfilerConfig::default()
    }
}

/// Blocks 100..=102: a deployment, an ERC-20 transfer of [`USDC`], and a
/// zero-value call to [`ROUTER`].
pub fn three_block_chain() -> MemoryGateway {
    MemoryGateway::new()
        .with_block(block(100, vec![tx(0xa1, None, 0)]), vec![receipt(500_000, vec![])])
        .with_block(
            block(101, vec![tx(0xb1, Some(USDC), 0)]),
            vec![receipt(52_000, vec![erc20_transfer(USDC, 1_000_000)])],
        )
        .with_block(block(102, vec![tx(0xc1, Some(ROUTER), 0)]), vec![receipt(90_000, vec![])])
}

/// `count` plain ETH transfers per block over `[start, end]`.
pub fn eth_transfer_chain(start: u64, end: u64, count: u8) -> MemoryGateway {
    let mut gateway = MemoryGateway::new();
    for number in start..=end {
        let txs: Vec<Transaction> = (0..count)
            .map(|i| {
                let mut tx = tx(i, Some(ALICE), ONE_ETH);
                tx.hash = B256::from(U256::from(number * 1_000 + u64::from(i)));
                tx
            })
            .collect();
        let receipts = txs.iter().map(|_| receipt(21_000, vec![])).collect();
        gateway = gateway.with_block(block(number, txs), receipts);
    }
    gateway
}

pub async fn run(
    gateway: Arc<MemoryGateway>,
    config: ProfilerConfig,
    cancel: CancelFlag,
) -> ScanReport {
    Scanner::new(gateway, config, cancel)
        .expect("test config is valid")
        .run()
        .await
}
