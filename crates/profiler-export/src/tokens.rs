//! `tokens.json` document.

use alloy::primitives::Address;
use profiler_data::TokenRecord;
use serde::{Deserialize, Serialize};

/// Placeholder for a symbol or name that could not be read.
pub const UNRESOLVED: &str = "?";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenDocument {
    pub address: Address,
    pub tx_count: u64,
    pub symbol: String,
    pub name: String,
    pub decimals: Option<u8>,
    pub resolved: bool,
}

impl From<&TokenRecord> for TokenDocument {
    fn from(record: &TokenRecord) -> Self {
        Self {
            address: record.address,
            tx_count: record.tx_count,
            symbol: record.symbol.clone().unwrap_or_else(|| UNRESOLVED.to_string()),
            name: record.name.clone().unwrap_or_else(|| UNRESOLVED.to_string()),
            decimals: record.decimals,
            resolved: record.resolved,
        }
    }
}

pub fn tokens_document(records: &[TokenRecord]) -> Vec<TokenDocument> {
    records.iter().map(TokenDocument::from).collect()
}

pub fn tokens_json(records: &[TokenRecord]) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&tokens_document(records))
}
