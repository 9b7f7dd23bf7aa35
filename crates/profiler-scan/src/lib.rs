//! profiler-scan crate
//!
//! Classification, aggregation, token discovery and the concurrent scanning
//! engine that ties them to a [`profiler_data::ChainGateway`].

pub mod aggregate;
pub mod classify;
pub mod logscan;
pub mod notes;
pub mod scanner;
pub mod tokens;
pub mod trace;

pub use aggregate::{Aggregator, BlockOutcome, RunMeta, TxOutcome};
pub use classify::{classify, code_lookup_target, Classification, CodePresence};
pub use logscan::{LogScanReport, LogScanner};
pub use scanner::{ScanReport, Scanner, TxBudget};
pub use tokens::{TokenRegistry, TokenResolver};
