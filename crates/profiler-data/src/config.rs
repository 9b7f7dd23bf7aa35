//! Run configuration handed to the scanner.
//!
//! Values arrive from the outside (CLI flags, env, a config file) and are
//! checked once by [`ProfilerConfig::validate`] before any RPC call.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ProfilerError;

/// Optional internal-value tracing backend.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceMode {
    /// No tracing; only `tx.value` is summed.
    #[default]
    None,
    /// Erigon/OpenEthereum `trace_block`.
    Erigon,
    /// Geth `debug_traceBlockByNumber` with `callTracer`.
    Geth,
}

impl fmt::Display for TraceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Erigon => write!(f, "erigon"),
            Self::Geth => write!(f, "geth"),
        }
    }
}

impl FromStr for TraceMode {
    type Err = ProfilerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "erigon" => Ok(Self::Erigon),
            "geth" => Ok(Self::Geth),
            other => Err(ProfilerError::invalid(format!(
                "unknown trace mode {other:?}, expected none|erigon|geth"
            ))),
        }
    }
}

/// Everything a live run needs to know.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilerConfig {
    pub rpc_url: String,
    /// First block, inclusive.
    pub start_block: u64,
    /// Last block, inclusive.
    pub end_block: u64,
    /// Blocks dispatched per page.
    pub page_size: u64,
    /// In-flight requests per phase.
    pub concurrency: usize,
    pub skip_contract_check: bool,
    pub dual_pass: bool,
    /// Blocks per `eth_getLogs` chunk in dual-pass mode.
    pub log_step: u64,
    /// Hard stop after this many transactions.
    pub tx_cap: Option<u64>,
    pub rpc_timeout_secs: u64,
    pub trace_mode: TraceMode,
    /// Look up `symbol()`/`name()`/`decimals()` for discovered tokens.
    pub resolve_tokens: bool,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            rpc_url: String::new(),
            start_block: 0,
            end_block: 0,
            page_size: 50,
            concurrency: 8,
            skip_contract_check: false,
            dual_pass: false,
            log_step: 10,
            tx_cap: None,
            rpc_timeout_secs: 60,
            trace_mode: TraceMode::None,
            resolve_tokens: true,
        }
    }
}

impl ProfilerConfig {
    /// Rejects ranges and sizes the scanner cannot work with.
    ///
    /// # Errors
    /// Returns [`ProfilerError::InputValidation`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ProfilerError> {
        if self.end_block < self.start_block {
            return Err(ProfilerError::invalid(format!(
                "end block {} is before start block {}",
                self.end_block, self.start_block
            )));
        }
        if self.page_size == 0 {
            return Err(ProfilerError::invalid("page size must be positive"));
        }
        if self.concurrency == 0 {
            return Err(ProfilerError::invalid("concurrency must be positive"));
        }
        if self.dual_pass && self.log_step == 0 {
            return Err(ProfilerError::invalid("log scan step must be positive"));
        }
        if self.tx_cap == Some(0) {
            return Err(ProfilerError::invalid("tx cap must be positive when set"));
        }
        if self.rpc_timeout_secs == 0 {
            return Err(ProfilerError::invalid("RPC timeout must be positive"));
        }
        Ok(())
    }

    pub fn block_count(&self) -> u64 {
        self.end_block.saturating_sub(self.start_block).saturating_add(1)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }

    /// Splits `[start, end]` into inclusive `(from, to)` windows of at most `step` blocks.
    pub fn windows(start: u64, end: u64, step: u64) -> Vec<(u64, u64)> {
        let step = step.max(1);
        let mut out = Vec::new();
        let mut cur = start;
        while cur <= end {
            let to = cur.saturating_add(step - 1).min(end);
            out.push((cur, to));
            if to == u64::MAX {
                break;
            }
            cur = to + 1;
        }
        out
    }
}

/// The knobs a run was executed with, echoed into the summary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunLimits {
    pub tx_cap: Option<u64>,
    pub skip_contract_check: bool,
    pub concurrency: usize,
    pub chunk_size: u64,
    pub trace_mode: TraceMode,
    pub dual_pass: bool,
    pub log_step: u64,
}

impl From<&ProfilerConfig> for RunLimits {
    fn from(config: &ProfilerConfig) -> Self {
        Self {
            tx_cap: config.tx_cap,
            skip_contract_check: config.skip_contract_check,
            concurrency: config.concurrency,
            chunk_size: config.page_size,
            trace_mode: config.trace_mode,
            dual_pass: config.dual_pass,
            log_step: config.log_step,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(start: u64, end: u64) -> ProfilerConfig {
        ProfilerConfig {
            rpc_url: "http://localhost:8545".to_string(),
            start_block: start,
            end_block: end,
            ..ProfilerConfig::default()
        }
    }

    #[test]
    fn rejects_inverted_range() {
        let err = config(10, 9).validate().unwrap_err();
        assert!(matches!(err, ProfilerError::InputValidation(_)));
        assert!(err.to_string().contains("before start block"));
    }

    #[test]
    fn block_count_saturates_on_the_full_range() {
        assert_eq!(config(5, 5).block_count(), 1);
        assert_eq!(config(0, u64::MAX).block_count(), u64::MAX);
    }

    #[test]
    fn rejects_non_positive_sizes() {
        let mut cfg = config(1, 2);
        cfg.page_size = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = config(1, 2);
        cfg.concurrency = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = config(1, 2);
        cfg.dual_pass = true;
        cfg.log_step = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn single_block_range_is_valid() {
        let cfg = config(7, 7);
        cfg.validate().expect("single block range is fine");
        assert_eq!(cfg.block_count(), 1);
    }

    #[test]
    fn windows_cover_range_inclusively() {
        assert_eq!(
            ProfilerConfig::windows(10, 34, 10),
            vec![(10, 19), (20, 29), (30, 34)]
        );
        assert_eq!(ProfilerConfig::windows(5, 5, 50), vec![(5, 5)]);
    }

    #[test]
    fn trace_mode_parses_case_insensitively() {
        assert_eq!("Geth".parse::<TraceMode>().unwrap(), TraceMode::Geth);
        assert_eq!("none".parse::<TraceMode>().unwrap(), TraceMode::None);
        assert!("parity".parse::<TraceMode>().is_err());
    }

    #[test]
    fn deserializes_with_defaults() {
        let cfg: ProfilerConfig = serde_json::from_str(
            r#"{"rpc_url":"http://node","start_block":1,"end_block":3,"dual_pass":true}"#,
        )
        .expect("partial config should deserialize");
        assert_eq!(cfg.page_size, 50);
        assert_eq!(cfg.concurrency, 8);
        assert!(cfg.dual_pass);
        assert_eq!(cfg.trace_mode, TraceMode::None);
    }
}
