//! profiler-data crate
//!
//! Chain data model, configuration, typed errors and the JSON-RPC gateway
//! shared by the scanning and export crates.

pub mod cache;
pub mod cancel;
pub mod config;
pub mod error;
pub mod rpc;
pub mod signatures;
pub mod types;
pub mod units;

pub use cache::ContractCache;
pub use cancel::CancelFlag;
pub use config::{ProfilerConfig, RunLimits, TraceMode};
pub use error::{ProfilerError, ScanFailure, ScanUnit};
pub use rpc::{AlloyGateway, ChainGateway};
pub use types::{
    Block, Log, PerBlockStat, Receipt, RunMode, RunSummary, TokenRecord, Transaction, TxType,
    TypeCounts, TypeStat,
};
