//! Alloy RPC provider integration for fetching on-chain data.
//!
//! [`ChainGateway`] is the seam the scanner talks to; [`AlloyGateway`] is the
//! HTTP implementation. Every call runs under its own timeout and a timeout
//! is reported exactly like a transport failure. Nothing here retries: the
//! caller decides whether to skip the unit.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use alloy::consensus::Transaction as ConsensusTx;
use alloy::network::{Ethereum, TransactionResponse};
use alloy::primitives::{Address, Bytes, B256};
use alloy::providers::fillers::FillProvider;
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::eth::{BlockId, BlockNumberOrTag, Filter};
use alloy::transports::{RpcError, TransportErrorKind};
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::TraceMode;
use crate::error::ProfilerError;
use crate::types::{Block, Log, Receipt, Transaction};

type ProviderType = FillProvider<
    alloy::providers::fillers::JoinFill<
        alloy::providers::Identity,
        alloy::providers::fillers::JoinFill<
            alloy::providers::fillers::GasFiller,
            alloy::providers::fillers::JoinFill<
                alloy::providers::fillers::BlobGasFiller,
                alloy::providers::fillers::JoinFill<
                    alloy::providers::fillers::NonceFiller,
                    alloy::providers::fillers::ChainIdFiller,
                >,
            >,
        >,
    >,
    alloy::providers::RootProvider<Ethereum>,
>;

/// Read-only JSON-RPC surface used by the profiler.
#[async_trait]
pub trait ChainGateway: Send + Sync {
    /// `eth_chainId`.
    async fn chain_id(&self) -> Result<u64, ProfilerError>;

    /// `eth_getBlockByNumber(number, true)`.
    async fn fetch_block(&self, number: u64) -> Result<Block, ProfilerError>;

    /// `eth_getTransactionReceipt(hash)`.
    async fn fetch_receipt(&self, hash: B256) -> Result<Receipt, ProfilerError>;

    /// `eth_getLogs` over `[from, to]` with `topic0` in `topics`.
    async fn fetch_logs(&self, from: u64, to: u64, topics: &[B256])
        -> Result<Vec<Log>, ProfilerError>;

    /// `eth_getCode(address, latest)`.
    async fn code_at(&self, address: Address) -> Result<Bytes, ProfilerError>;

    /// `eth_call` against `latest` with raw calldata.
    async fn call(&self, to: Address, calldata: Bytes) -> Result<Bytes, ProfilerError>;

    /// Raw `trace_block` / `debug_traceBlockByNumber` output for one block.
    async fn trace_block(&self, number: u64, mode: TraceMode) -> Result<Value, ProfilerError>;
}

/// Whether deployed code is present. A lone `0x00` byte counts as empty.
pub fn has_code(code: &[u8]) -> bool {
    !code.is_empty() && code != [0u8]
}

/// HTTP gateway over an Alloy provider.
pub struct AlloyGateway {
    /// Alloy FillProvider with gas, nonce, chain_id, blob_gas fillers
    provider: Arc<ProviderType>,
    timeout: Duration,
}

impl AlloyGateway {
    /// Builds the provider without touching the network.
    ///
    /// # Errors
    /// Returns [`ProfilerError::InputValidation`] if the URL does not parse.
    pub fn new(rpc_url: &str, timeout: Duration) -> Result<Self, ProfilerError> {
        let url = rpc_url
            .parse()
            .map_err(|e| ProfilerError::invalid(format!("invalid RPC URL {rpc_url:?}: {e}")))?;
        let provider = ProviderBuilder::new().on_http(url);

        Ok(Self {
            provider: Arc::new(provider),
            timeout,
        })
    }

    /// Builds the gateway and tests connectivity with `eth_chainId`.
    ///
    /// # Errors
    /// Returns an input error for a malformed URL, or the network error of the probe.
    #[tracing::instrument(skip_all, fields(rpc_url = %rpc_url))]
    pub async fn connect(rpc_url: &str, timeout: Duration) -> Result<Self, ProfilerError> {
        let gateway = Self::new(rpc_url, timeout)?;
        let chain_id = gateway.chain_id().await?;

        tracing::info!(rpc_url = %rpc_url, chain_id, "RPC connection successful");

        Ok(gateway)
    }

    async fn bounded<T, F>(&self, method: &'static str, call: F) -> Result<T, ProfilerError>
    where
        F: Future<Output = Result<T, RpcError<TransportErrorKind>>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(map_transport_error(method, e)),
            Err(_) => Err(ProfilerError::network(format!(
                "{method} timed out after {}s",
                self.timeout.as_secs_f64()
            ))),
        }
    }
}

fn map_transport_error(method: &str, error: RpcError<TransportErrorKind>) -> ProfilerError {
    match error {
        RpcError::DeserError { err, .. } => ProfilerError::decode(format!("{method}: {err}")),
        RpcError::SerError(err) => ProfilerError::decode(format!("{method}: {err}")),
        other => ProfilerError::network(format!("{method}: {other}")),
    }
}

fn map_log(log: &alloy::rpc::types::Log) -> Log {
    Log {
        address: log.address(),
        topics: log.topics().to_vec(),
        data: log.data().data.clone(),
        transaction_hash: log.transaction_hash,
        block_number: log.block_number,
    }
}

#[async_trait]
impl ChainGateway for AlloyGateway {
    async fn chain_id(&self) -> Result<u64, ProfilerError> {
        self.bounded("eth_chainId", async { self.provider.get_chain_id().await })
            .await
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_block(&self, number: u64) -> Result<Block, ProfilerError> {
        let block = self
            .bounded("eth_getBlockByNumber", async {
                self.provider
                    .get_block(BlockId::Number(BlockNumberOrTag::Number(number)))
                    .full()
                    .await
            })
            .await?
            .ok_or_else(|| ProfilerError::decode(format!("block {number} not returned by node")))?;

        let base_fee = block.header.base_fee_per_gas;
        let transactions = block
            .transactions
            .txns()
            .map(|tx| Transaction {
                hash: TransactionResponse::tx_hash(tx),
                from: TransactionResponse::from(tx),
                to: ConsensusTx::to(tx),
                value: ConsensusTx::value(tx),
                gas_price: ConsensusTx::effective_gas_price(tx, base_fee),
            })
            .collect();

        Ok(Block {
            number: block.header.number,
            timestamp: block.header.timestamp,
            gas_used: block.header.gas_used,
            gas_limit: block.header.gas_limit,
            transactions,
        })
    }

    async fn fetch_receipt(&self, hash: B256) -> Result<Receipt, ProfilerError> {
        let receipt = self
            .bounded("eth_getTransactionReceipt", async {
                self.provider.get_transaction_receipt(hash).await
            })
            .await?
            .ok_or_else(|| ProfilerError::decode(format!("receipt {hash} not returned by node")))?;

        Ok(Receipt {
            gas_used: receipt.gas_used,
            logs: receipt.inner.logs().iter().map(map_log).collect(),
        })
    }

    #[tracing::instrument(skip(self, topics))]
    async fn fetch_logs(
        &self,
        from: u64,
        to: u64,
        topics: &[B256],
    ) -> Result<Vec<Log>, ProfilerError> {
        let filter = Filter::new()
            .from_block(from)
            .to_block(to)
            .event_signature(topics.to_vec());

        let logs = self
            .bounded("eth_getLogs", async { self.provider.get_logs(&filter).await })
            .await?;

        Ok(logs.iter().map(map_log).collect())
    }

    async fn code_at(&self, address: Address) -> Result<Bytes, ProfilerError> {
        self.bounded("eth_getCode", async {
            self.provider.get_code_at(address).await
        })
        .await
    }

    async fn call(&self, to: Address, calldata: Bytes) -> Result<Bytes, ProfilerError> {
        let request = json!({ "to": to, "data": calldata });
        self.bounded("eth_call", async {
            self.provider
                .raw_request::<_, Bytes>("eth_call".into(), (request, BlockNumberOrTag::Latest))
                .await
        })
        .await
    }

    async fn trace_block(&self, number: u64, mode: TraceMode) -> Result<Value, ProfilerError> {
        let tag = BlockNumberOrTag::Number(number);
        match mode {
            TraceMode::None => Ok(Value::Null),
            TraceMode::Erigon => {
                self.bounded("trace_block", async {
                    self.provider
                        .raw_request::<_, Value>("trace_block".into(), (tag,))
                        .await
                })
                .await
            }
            TraceMode::Geth => {
                let options = json!({ "tracer": "callTracer" });
                self.bounded("debug_traceBlockByNumber", async {
                    self.provider
                        .raw_request::<_, Value>(
                            "debug_traceBlockByNumber".into(),
                            (tag, options),
                        )
                        .await
                })
                .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;
    use std::io::Write;

    fn rpc_result(result: &str) -> String {
        format!(r#"{{"jsonrpc":"2.0","id":0,"result":{result}}}"#)
    }

    #[test]
    fn new_rejects_invalid_url() {
        let result = AlloyGateway::new("not a url", Duration::from_secs(1));
        assert!(matches!(result, Err(ProfilerError::InputValidation(_))));
    }

    #[test]
    fn has_code_treats_single_zero_byte_as_empty() {
        assert!(!has_code(&[]));
        assert!(!has_code(&[0u8]));
        assert!(has_code(&[0x60, 0x80]));
    }

    #[tokio::test]
    async fn chain_id_parses_hex_quantity() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .match_body(mockito::Matcher::PartialJsonString(
                r#"{"method":"eth_chainId"}"#.to_string(),
            ))
            .with_header("content-type", "application/json")
            .with_body(rpc_result(r#""0x1""#))
            .create_async()
            .await;

        let gateway = AlloyGateway::new(&server.url(), Duration::from_secs(5))
            .expect("mock server URL should parse");
        let chain_id = gateway.chain_id().await.expect("chain id should decode");

        assert_eq!(chain_id, 1);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn server_error_surfaces_as_network_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/")
            .with_status(500)
            .create_async()
            .await;

        let gateway = AlloyGateway::new(&server.url(), Duration::from_secs(5))
            .expect("mock server URL should parse");
        let err = gateway.chain_id().await.unwrap_err();

        assert!(matches!(err, ProfilerError::Network { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn slow_response_times_out_as_network_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/")
            .with_header("content-type", "application/json")
            .with_chunked_body(|w| {
                std::thread::sleep(Duration::from_millis(1_500));
                w.write_all(rpc_result(r#""0x1""#).as_bytes())
            })
            .create_async()
            .await;

        let gateway = AlloyGateway::new(&server.url(), Duration::from_secs(1))
            .expect("mock server URL should parse");
        let err = gateway.chain_id().await.unwrap_err();

        match err {
            ProfilerError::Network { cause } => {
                assert!(cause.contains("eth_chainId timed out"), "got {cause}")
            }
            other => panic!("expected a network error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn null_receipt_is_a_decode_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/")
            .with_header("content-type", "application/json")
            .with_body(rpc_result("null"))
            .create_async()
            .await;

        let gateway = AlloyGateway::new(&server.url(), Duration::from_secs(5))
            .expect("mock server URL should parse");
        let err = gateway.fetch_receipt(B256::ZERO).await.unwrap_err();

        assert!(matches!(err, ProfilerError::Decode { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn empty_code_is_returned_as_empty_bytes() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/")
            .match_body(mockito::Matcher::PartialJsonString(
                r#"{"method":"eth_getCode"}"#.to_string(),
            ))
            .with_header("content-type", "application/json")
            .with_body(rpc_result(r#""0x""#))
            .create_async()
            .await;

        let gateway = AlloyGateway::new(&server.url(), Duration::from_secs(5))
            .expect("mock server URL should parse");
        let code = gateway
            .code_at(Address::ZERO)
            .await
            .expect("empty code should decode");

        assert!(!has_code(&code));
    }
}
