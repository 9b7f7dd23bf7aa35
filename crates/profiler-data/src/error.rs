//! Error kinds surfaced by the profiler.
//!
//! `Network` and `Decode` are soft failures: the scanner records them against
//! the unit of work that failed and keeps going. `InputValidation` is raised
//! before any RPC call is issued. `Format` only ever fails an offline load.

use std::fmt;

use alloy::primitives::{Address, B256};
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ProfilerError {
    /// RPC transport failure or per-call timeout.
    #[error("network error: {cause}")]
    Network { cause: String },

    /// The endpoint answered with something we could not map onto the data model.
    #[error("decode error: {cause}")]
    Decode { cause: String },

    /// A token metadata read (`symbol()`, `name()`, `decimals()`) reverted or did not decode.
    #[error("metadata call {field}() failed for {token}: {cause}")]
    MetadataCall {
        token: Address,
        field: &'static str,
        cause: String,
    },

    /// Configuration rejected before the run starts.
    #[error("invalid input: {0}")]
    InputValidation(String),

    /// Malformed offline CSV or JSON.
    #[error("malformed input: {0}")]
    Format(String),
}

impl ProfilerError {
    pub fn network(cause: impl fmt::Display) -> Self {
        Self::Network {
            cause: cause.to_string(),
        }
    }

    pub fn decode(cause: impl fmt::Display) -> Self {
        Self::Decode {
            cause: cause.to_string(),
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InputValidation(msg.into())
    }

    pub fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }

    /// Whether the run may continue past this error by skipping the unit.
    pub fn is_soft(&self) -> bool {
        matches!(
            self,
            Self::Network { .. } | Self::Decode { .. } | Self::MetadataCall { .. }
        )
    }
}

/// The unit of work a failure is attributed to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScanUnit {
    ChainId,
    Block { number: u64 },
    Receipt { block: u64, tx_hash: B256 },
    LogChunk { from: u64, to: u64 },
    Code { address: Address },
    Trace { number: u64 },
}

impl ScanUnit {
    /// Failures on these units drop data from the run and flag it partial.
    /// Code lookups and traces degrade a field but never lose a transaction.
    pub fn affects_completeness(&self) -> bool {
        matches!(
            self,
            Self::Block { .. } | Self::Receipt { .. } | Self::LogChunk { .. }
        )
    }
}

impl fmt::Display for ScanUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChainId => write!(f, "eth_chainId"),
            Self::Block { number } => write!(f, "block {number}"),
            Self::Receipt { block, tx_hash } => write!(f, "receipt {tx_hash} (block {block})"),
            Self::LogChunk { from, to } => write!(f, "logs {from}..={to}"),
            Self::Code { address } => write!(f, "code {address}"),
            Self::Trace { number } => write!(f, "trace {number}"),
        }
    }
}

/// One entry of a run's error log.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScanFailure {
    pub unit: ScanUnit,
    pub error: ProfilerError,
}

impl ScanFailure {
    pub fn new(unit: ScanUnit, error: ProfilerError) -> Self {
        Self { unit, error }
    }
}

impl fmt::Display for ScanFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.unit, self.error)
    }
}
