//! Token registry and metadata resolver.
//!
//! The registry is written concurrently by log-scan and receipt workers. It
//! only ever inserts new addresses or bumps counters, so racing observers
//! cannot lose each other's updates.

use std::collections::BTreeMap;

use alloy::primitives::{Address, Bytes};
use alloy::sol;
use alloy::sol_types::SolCall;
use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use profiler_data::{CancelFlag, ChainGateway, ProfilerError, TokenRecord};

sol! {
    interface IERC20Metadata {
        function symbol() external view returns (string);
        function name() external view returns (string);
        function decimals() external view returns (uint8);
    }

    interface IERC20MetadataBytes32 {
        function symbol() external view returns (bytes32);
        function name() external view returns (bytes32);
    }
}

/// Deduplicated set of discovered token contracts.
#[derive(Debug, Default)]
pub struct TokenRegistry {
    records: DashMap<Address, TokenRecord>,
}

impl TokenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one transfer-like log from `address`. Returns true on first sight.
    pub fn observe(&self, address: Address) -> bool {
        self.observe_many(address, 1)
    }

    pub fn observe_many(&self, address: Address, count: u64) -> bool {
        let mut first = false;
        self.records
            .entry(address)
            .or_insert_with(|| {
                first = true;
                TokenRecord::new(address)
            })
            .tx_count += count;
        first
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, address: &Address) -> Option<TokenRecord> {
        self.records.get(address).map(|r| r.clone())
    }

    pub fn addresses(&self) -> Vec<Address> {
        let mut out: Vec<Address> = self.records.iter().map(|r| *r.key()).collect();
        out.sort();
        out
    }

    /// All records, most active first, ties by address.
    pub fn snapshot(&self) -> Vec<TokenRecord> {
        let mut out: Vec<TokenRecord> = self.records.iter().map(|r| r.value().clone()).collect();
        out.sort_by(|a, b| b.tx_count.cmp(&a.tx_count).then(a.address.cmp(&b.address)));
        out
    }

    /// `(address, events)` pairs for the summary's top token list.
    pub fn counts(&self) -> Vec<(Address, u64)> {
        self.records
            .iter()
            .map(|r| (*r.key(), r.value().tx_count))
            .collect()
    }

    /// Writes whatever metadata was read into the record. Failed fields stay as they were.
    fn apply(&self, metadata: TokenMetadata) -> Option<TokenRecord> {
        let mut record = self.records.get_mut(&metadata.address)?;
        if let Ok(symbol) = metadata.symbol {
            record.symbol = Some(symbol);
        }
        if let Ok(name) = metadata.name {
            record.name = Some(name);
        }
        if let Ok(decimals) = metadata.decimals {
            record.decimals = Some(decimals);
        }
        record.resolved =
            record.symbol.is_some() && record.name.is_some() && record.decimals.is_some();
        Some(record.clone())
    }
}

/// Outcome of the three metadata reads for one token, each independent.
#[derive(Debug)]
pub struct TokenMetadata {
    pub address: Address,
    pub symbol: Result<String, ProfilerError>,
    pub name: Result<String, ProfilerError>,
    pub decimals: Result<u8, ProfilerError>,
}

/// Reads `symbol()`, `name()` and `decimals()` for registry entries.
pub struct TokenResolver<'a> {
    gateway: &'a dyn ChainGateway,
    concurrency: usize,
    cancel: CancelFlag,
}

impl<'a> TokenResolver<'a> {
    pub fn new(gateway: &'a dyn ChainGateway, concurrency: usize, cancel: CancelFlag) -> Self {
        Self {
            gateway,
            concurrency: concurrency.max(1),
            cancel,
        }
    }

    /// Enriches `addresses` in place in `registry` and returns their updated records.
    ///
    /// Addresses not yet in the registry are skipped. Once cancelled, remaining
    /// addresses are left untouched.
    #[tracing::instrument(skip_all, fields(tokens = addresses.len()))]
    pub async fn resolve(
        &self,
        registry: &TokenRegistry,
        addresses: Vec<Address>,
    ) -> BTreeMap<Address, TokenRecord> {
        let results: Vec<TokenMetadata> = stream::iter(addresses)
            .map(|address| async move {
                if self.cancel.is_cancelled() {
                    return None;
                }
                Some(self.fetch(address).await)
            })
            .buffer_unordered(self.concurrency)
            .filter_map(|m| async move { m })
            .collect()
            .await;

        let mut resolved = BTreeMap::new();
        for metadata in results {
            for err in [
                metadata.symbol.as_ref().err(),
                metadata.name.as_ref().err(),
                metadata.decimals.as_ref().err(),
            ]
            .into_iter()
            .flatten()
            {
                tracing::debug!(error = %err, "token metadata field unresolved");
            }
            if let Some(record) = registry.apply(metadata) {
                resolved.insert(record.address, record);
            }
        }

        tracing::info!(
            resolved = resolved.values().filter(|r| r.resolved).count(),
            attempted = resolved.len(),
            "token metadata resolution finished"
        );
        resolved
    }

    /// Issues the three reads concurrently; none of them affects the others.
    pub async fn fetch(&self, address: Address) -> TokenMetadata {
        let (symbol, name, decimals) = futures::join!(
            self.read_text(address, "symbol", true),
            self.read_text(address, "name", false),
            self.read_decimals(address),
        );
        TokenMetadata {
            address,
            symbol,
            name,
            decimals,
        }
    }

    async fn raw_call(
        &self,
        token: Address,
        field: &'static str,
        calldata: Vec<u8>,
    ) -> Result<Bytes, ProfilerError> {
        self.gateway
            .call(token, Bytes::from(calldata))
            .await
            .map_err(|e| ProfilerError::MetadataCall {
                token,
                field,
                cause: e.to_string(),
            })
    }

    async fn read_text(
        &self,
        token: Address,
        field: &'static str,
        is_symbol: bool,
    ) -> Result<String, ProfilerError> {
        let calldata = if is_symbol {
            IERC20Metadata::symbolCall {}.abi_encode()
        } else {
            IERC20Metadata::nameCall {}.abi_encode()
        };
        let output = self.raw_call(token, field, calldata).await?;
        decode_text(&output, is_symbol).ok_or_else(|| ProfilerError::MetadataCall {
            token,
            field,
            cause: format!(
                "undecodable return data 0x{}",
                alloy::primitives::hex::encode(&output)
            ),
        })
    }

    async fn read_decimals(&self, token: Address) -> Result<u8, ProfilerError> {
        let output = self
            .raw_call(token, "decimals", IERC20Metadata::decimalsCall {}.abi_encode())
            .await?;
        IERC20Metadata::decimalsCall::abi_decode_returns(&output, true)
            .map(|ret| ret._0)
            .map_err(|e| ProfilerError::MetadataCall {
                token,
                field: "decimals",
                cause: e.to_string(),
            })
    }
}

/// Decodes an ABI `string` return, falling back to the legacy `bytes32` form.
fn decode_text(output: &[u8], is_symbol: bool) -> Option<String> {
    let as_string = if is_symbol {
        IERC20Metadata::symbolCall::abi_decode_returns(output, true).map(|r| r._0)
    } else {
        IERC20Metadata::nameCall::abi_decode_returns(output, true).map(|r| r._0)
    };
    if let Ok(text) = as_string {
        return Some(text);
    }

    let word = if is_symbol {
        IERC20MetadataBytes32::symbolCall::abi_decode_returns(output, true).map(|r| r._0)
    } else {
        IERC20MetadataBytes32::nameCall::abi_decode_returns(output, true).map(|r| r._0)
    }
    .ok()?;
    let end = word.iter().position(|b| *b == 0).unwrap_or(word.len());
    String::from_utf8(word[..end].to_vec()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{address, B256, U256};
    use alloy::sol_types::SolValue;
    use async_trait::async_trait;
    use profiler_data::{Block, Log, Receipt, TraceMode};
    use serde_json::Value;

    const USDC: Address = address!("a0b86991c6218b36c1d19d4a2e9eb0ce3606eb48");
    const MKR: Address = address!("9f8f72aa9304c8b593d555f12ef6589cc3a579a2");
    const BROKEN: Address = address!("00000000000000000000000000000000000000bb");

    /// `eth_call` only: USDC is well-formed, MKR answers bytes32, BROKEN
    /// reverts on `name()` and returns garbage for `decimals()`.
    struct MetadataNode;

    #[async_trait]
    impl ChainGateway for MetadataNode {
        async fn chain_id(&self) -> Result<u64, ProfilerError> {
            Ok(1)
        }
        async fn fetch_block(&self, number: u64) -> Result<Block, ProfilerError> {
            Err(ProfilerError::network(format!("no block {number}")))
        }
        async fn fetch_receipt(&self, _hash: B256) -> Result<Receipt, ProfilerError> {
            Ok(Receipt::default())
        }
        async fn fetch_logs(
            &self,
            _from: u64,
            _to: u64,
            _topics: &[B256],
        ) -> Result<Vec<Log>, ProfilerError> {
            Ok(Vec::new())
        }
        async fn code_at(&self, _address: Address) -> Result<Bytes, ProfilerError> {
            Ok(Bytes::new())
        }
        async fn call(&self, to: Address, calldata: Bytes) -> Result<Bytes, ProfilerError> {
            let selector: [u8; 4] = calldata[..4].try_into().expect("selector");
            let symbol = selector == IERC20Metadata::symbolCall::SELECTOR;
            let name = selector == IERC20Metadata::nameCall::SELECTOR;
            let out = if to == USDC {
                if symbol {
                    "USDC".to_string().abi_encode()
                } else if name {
                    "USD Coin".to_string().abi_encode()
                } else {
                    U256::from(6u8).abi_encode()
                }
            } else if to == MKR {
                if symbol {
                    B256::right_padding_from(b"MKR").abi_encode()
                } else if name {
                    B256::right_padding_from(b"Maker").abi_encode()
                } else {
                    U256::from(18u8).abi_encode()
                }
            } else if symbol {
                "BRK".to_string().abi_encode()
            } else if name {
                return Err(ProfilerError::network("execution reverted"));
            } else {
                vec![0xde, 0xad]
            };
            Ok(Bytes::from(out))
        }
        async fn trace_block(
            &self,
            _number: u64,
            _mode: TraceMode,
        ) -> Result<Value, ProfilerError> {
            Ok(Value::Null)
        }
    }

    #[test]
    fn observe_deduplicates_and_counts() {
        let registry = TokenRegistry::new();
        assert!(registry.observe(USDC));
        assert!(!registry.observe(USDC));
        assert!(registry.observe_many(MKR, 3));

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(&USDC).map(|r| r.tx_count), Some(2));

        let snapshot = registry.snapshot();
        assert_eq!(snapshot[0].address, MKR);
        assert_eq!(snapshot[1].address, USDC);
    }

    #[tokio::test]
    async fn resolves_string_and_bytes32_tokens() {
        let registry = TokenRegistry::new();
        registry.observe(USDC);
        registry.observe(MKR);

        let resolver = TokenResolver::new(&MetadataNode, 4, CancelFlag::new());
        let out = resolver.resolve(&registry, registry.addresses()).await;

        let usdc = &out[&USDC];
        assert_eq!(usdc.symbol.as_deref(), Some("USDC"));
        assert_eq!(usdc.name.as_deref(), Some("USD Coin"));
        assert_eq!(usdc.decimals, Some(6));
        assert!(usdc.resolved);

        let mkr = registry.get(&MKR).expect("MKR stays registered");
        assert_eq!(mkr.symbol.as_deref(), Some("MKR"));
        assert_eq!(mkr.name.as_deref(), Some("Maker"));
        assert!(mkr.resolved);
    }

    #[tokio::test]
    async fn failed_fields_are_isolated() {
        let registry = TokenRegistry::new();
        registry.observe(BROKEN);
        registry.observe(USDC);

        let resolver = TokenResolver::new(&MetadataNode, 2, CancelFlag::new());
        let out = resolver.resolve(&registry, registry.addresses()).await;

        let broken = &out[&BROKEN];
        assert_eq!(broken.symbol.as_deref(), Some("BRK"));
        assert_eq!(broken.name, None);
        assert_eq!(broken.decimals, None);
        assert!(!broken.resolved);
        assert!(out[&USDC].resolved);
    }

    #[tokio::test]
    async fn cancelled_resolver_leaves_records_untouched() {
        let registry = TokenRegistry::new();
        registry.observe(USDC);
        let cancel = CancelFlag::new();
        cancel.cancel();

        let resolver = TokenResolver::new(&MetadataNode, 2, cancel);
        let out = resolver.resolve(&registry, registry.addresses()).await;

        assert!(out.is_empty());
        assert_eq!(registry.get(&USDC).and_then(|r| r.symbol), None);
    }
}
