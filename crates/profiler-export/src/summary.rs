//! `summary.json` document.

use std::collections::BTreeMap;

use alloy::primitives::{Address, U256};
use profiler_data::units::{format_ether, parse_ether, parse_scaled_decimal};
use profiler_data::{ProfilerError, RunLimits, RunMode, RunSummary, TxType, TypeStat};
use serde::{Deserialize, Serialize};

/// Per-type block of the summary. Wei amounts are rendered as decimal ETH
/// strings so no JSON consumer rounds them through a float.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeStatDocument {
    pub count: u64,
    pub gas_used: u128,
    pub avg_gas_price_gwei: String,
    pub eth_value_sum_eth: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryDocument {
    pub start_block: u64,
    pub end_block: u64,
    pub chain_id: Option<u64>,
    pub block_count: u64,
    pub total_tx: u64,
    pub unique_senders: u64,
    pub unique_receivers: u64,
    pub total_eth_transferred_eth: String,
    #[serde(default = "zero_eth")]
    pub total_internal_value_eth: String,
    pub tx_types: BTreeMap<TxType, TypeStatDocument>,
    pub top_contracts_by_tx: Vec<(Address, u64)>,
    pub top_tokens_by_events: Vec<(Address, u64)>,
    #[serde(default)]
    pub notes: Vec<String>,
    #[serde(default)]
    pub mode: RunMode,
    #[serde(default)]
    pub partial: bool,
    #[serde(default)]
    pub cancelled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<RunLimits>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

fn zero_eth() -> String {
    "0".to_string()
}

pub fn summary_document(summary: &RunSummary) -> SummaryDocument {
    let tx_types = summary
        .tx_types
        .iter()
        .map(|(tx_type, stat)| {
            (
                *tx_type,
                TypeStatDocument {
                    count: stat.count,
                    gas_used: stat.gas_used_sum,
                    avg_gas_price_gwei: stat.avg_gas_price_gwei(),
                    eth_value_sum_eth: format_ether(stat.eth_value_wei_sum),
                },
            )
        })
        .collect();

    SummaryDocument {
        start_block: summary.start_block,
        end_block: summary.end_block,
        chain_id: summary.chain_id,
        block_count: summary.block_count,
        total_tx: summary.total_tx,
        unique_senders: summary.unique_senders,
        unique_receivers: summary.unique_receivers,
        total_eth_transferred_eth: format_ether(summary.total_eth_wei),
        total_internal_value_eth: format_ether(summary.internal_value_wei),
        tx_types,
        top_contracts_by_tx: summary.top_contracts.clone(),
        top_tokens_by_events: summary.top_tokens.clone(),
        notes: summary.notes.clone(),
        mode: summary.mode,
        partial: summary.partial,
        cancelled: summary.cancelled,
        limits: summary.limits.clone(),
        errors: summary.failures.iter().map(ToString::to_string).collect(),
    }
}

/// Pretty-printed `summary.json`.
pub fn summary_json(summary: &RunSummary) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&summary_document(summary))
}

impl SummaryDocument {
    /// Rebuilds the in-memory summary.
    ///
    /// The gas price sum is recovered from the rounded average, so it is exact
    /// only to the 4 decimals the document carries. The error log comes back
    /// as notes.
    ///
    /// # Errors
    /// Returns [`ProfilerError::Format`] when an amount is not a decimal number.
    pub fn into_run_summary(self) -> Result<RunSummary, ProfilerError> {
        let mut tx_types = BTreeMap::new();
        for (tx_type, doc) in self.tx_types {
            let avg_scaled = parse_scaled_decimal(&doc.avg_gas_price_gwei, 13).ok_or_else(|| {
                ProfilerError::format(format!(
                    "{tx_type}: avg_gas_price_gwei {:?} is not a number",
                    doc.avg_gas_price_gwei
                ))
            })?;
            // gwei with 4 decimals -> wei: scale 1e9 * 1e4, then divide the 1e4 back out
            let gas_price_wei_sum =
                avg_scaled.saturating_mul(U256::from(doc.count)) / U256::from(10_000u64);
            tx_types.insert(
                tx_type,
                TypeStat {
                    count: doc.count,
                    gas_used_sum: doc.gas_used,
                    gas_price_wei_sum,
                    eth_value_wei_sum: parse_eth_field(&doc.eth_value_sum_eth, "eth_value_sum_eth")?,
                },
            );
        }

        let mut notes = self.notes;
        notes.extend(self.errors.into_iter().map(|e| format!("error: {e}")));

        Ok(RunSummary {
            start_block: self.start_block,
            end_block: self.end_block,
            chain_id: self.chain_id,
            block_count: self.block_count,
            total_tx: self.total_tx,
            unique_senders: self.unique_senders,
            unique_receivers: self.unique_receivers,
            total_eth_wei: parse_eth_field(
                &self.total_eth_transferred_eth,
                "total_eth_transferred_eth",
            )?,
            internal_value_wei: parse_eth_field(
                &self.total_internal_value_eth,
                "total_internal_value_eth",
            )?,
            tx_types,
            top_contracts: self.top_contracts_by_tx,
            top_tokens: self.top_tokens_by_events,
            mode: self.mode,
            partial: self.partial,
            cancelled: self.cancelled,
            notes,
            failures: Vec::new(),
            limits: self.limits,
        })
    }
}

fn parse_eth_field(text: &str, field: &str) -> Result<U256, ProfilerError> {
    parse_ether(text)
        .ok_or_else(|| ProfilerError::format(format!("{field} {text:?} is not a decimal ETH amount")))
}
