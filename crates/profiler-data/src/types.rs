//! Type definitions for profiled chain data and run results.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Index, IndexMut};
use std::str::FromStr;

use alloy::primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

use crate::config::RunLimits;
use crate::error::{ProfilerError, ScanFailure};
use crate::units::format_gwei_average;

/// Block with full transaction objects.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    pub number: u64,
    /// Unix seconds.
    pub timestamp: u64,
    pub gas_used: u64,
    pub gas_limit: u64,
    pub transactions: Vec<Transaction>,
}

/// Transaction as carried inside a block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    pub hash: B256,
    pub from: Address,
    /// `None` for contract creation.
    pub to: Option<Address>,
    /// Wei.
    pub value: U256,
    /// Effective gas price in wei.
    pub gas_price: u128,
}

/// The parts of a receipt the classifier looks at.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Receipt {
    pub gas_used: u64,
    pub logs: Vec<Log>,
}

/// Event log entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Log {
    /// Emitting contract.
    pub address: Address,
    /// `topics[0]` is the event signature hash.
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub transaction_hash: Option<B256>,
    pub block_number: Option<u64>,
}

impl Log {
    pub fn topic0(&self) -> Option<&B256> {
        self.topics.first()
    }
}

/// Closed transaction taxonomy. Every transaction maps to exactly one variant.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TxType {
    EthTransfer,
    ContractCreation,
    Erc20Transfer,
    Erc721Transfer,
    Erc1155Transfer,
    MixedTokenActivity,
    OtherContractCall,
    OtherEoaCall,
}

impl TxType {
    pub const ALL: [TxType; 8] = [
        TxType::EthTransfer,
        TxType::ContractCreation,
        TxType::Erc20Transfer,
        TxType::Erc721Transfer,
        TxType::Erc1155Transfer,
        TxType::MixedTokenActivity,
        TxType::OtherContractCall,
        TxType::OtherEoaCall,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::EthTransfer => "eth_transfer",
            Self::ContractCreation => "contract_creation",
            Self::Erc20Transfer => "erc20_transfer",
            Self::Erc721Transfer => "erc721_transfer",
            Self::Erc1155Transfer => "erc1155_transfer",
            Self::MixedTokenActivity => "mixed_token_activity",
            Self::OtherContractCall => "other_contract_call",
            Self::OtherEoaCall => "other_eoa_call",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for TxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TxType {
    type Err = ProfilerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TxType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ProfilerError::format(format!("unknown transaction type {s:?}")))
    }
}

/// Per-type transaction counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TypeCounts([u64; 8]);

impl TypeCounts {
    pub fn total(&self) -> u64 {
        self.0.iter().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TxType, u64)> + '_ {
        TxType::ALL.into_iter().map(|t| (t, self[t]))
    }

    pub fn add(&mut self, other: &TypeCounts) {
        for t in TxType::ALL {
            self[t] += other[t];
        }
    }
}

impl Index<TxType> for TypeCounts {
    type Output = u64;

    fn index(&self, t: TxType) -> &u64 {
        &self.0[t.index()]
    }
}

impl IndexMut<TxType> for TypeCounts {
    fn index_mut(&mut self, t: TxType) -> &mut u64 {
        &mut self.0[t.index()]
    }
}

/// One row per scanned block.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PerBlockStat {
    pub block_number: u64,
    pub timestamp: u64,
    /// Transactions the block carries.
    pub tx_count: u64,
    pub counts: TypeCounts,
    pub gas_used: u64,
    pub gas_limit: u64,
}

/// Aggregate for one transaction type.
///
/// Wei sums are 256-bit so a mainnet-scale range cannot overflow them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TypeStat {
    pub count: u64,
    pub gas_used_sum: u128,
    pub gas_price_wei_sum: U256,
    pub eth_value_wei_sum: U256,
}

impl TypeStat {
    pub fn add(&mut self, other: &TypeStat) {
        self.count += other.count;
        self.gas_used_sum = self.gas_used_sum.saturating_add(other.gas_used_sum);
        self.gas_price_wei_sum = self
            .gas_price_wei_sum
            .saturating_add(other.gas_price_wei_sum);
        self.eth_value_wei_sum = self
            .eth_value_wei_sum
            .saturating_add(other.eth_value_wei_sum);
    }

    /// `gas_price_wei_sum / count / 1e9`, four decimals. Derived on demand.
    pub fn avg_gas_price_gwei(&self) -> String {
        format_gwei_average(self.gas_price_wei_sum, self.count)
    }
}

/// A discovered token contract.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenRecord {
    pub address: Address,
    /// Transfer-like logs observed from this address.
    pub tx_count: u64,
    pub symbol: Option<String>,
    pub name: Option<String>,
    pub decimals: Option<u8>,
    /// All three metadata reads succeeded.
    pub resolved: bool,
}

impl TokenRecord {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            tx_count: 0,
            symbol: None,
            name: None,
            decimals: None,
            resolved: false,
        }
    }
}

/// Whether a summary came from a live RPC scan or from re-ingested files.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    #[default]
    Live,
    Offline,
}

/// Aggregate root of a run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub start_block: u64,
    pub end_block: u64,
    pub chain_id: Option<u64>,
    pub block_count: u64,
    pub total_tx: u64,
    pub unique_senders: u64,
    pub unique_receivers: u64,
    pub total_eth_wei: U256,
    pub internal_value_wei: U256,
    /// Only types that were observed at least once.
    pub tx_types: BTreeMap<TxType, TypeStat>,
    pub top_contracts: Vec<(Address, u64)>,
    pub top_tokens: Vec<(Address, u64)>,
    pub mode: RunMode,
    pub partial: bool,
    pub cancelled: bool,
    pub notes: Vec<String>,
    pub failures: Vec<ScanFailure>,
    pub limits: Option<RunLimits>,
}

impl RunSummary {
    pub fn type_count(&self, t: TxType) -> u64 {
        self.tx_types.get(&t).map(|s| s.count).unwrap_or(0)
    }

    /// Checks that per-block rows and per-type totals agree for every type.
    pub fn consistent_with(&self, rows: &[PerBlockStat]) -> bool {
        let mut sums = TypeCounts::default();
        for row in rows {
            sums.add(&row.counts);
        }
        TxType::ALL
            .into_iter()
            .all(|t| sums[t] == self.type_count(t))
    }
}
