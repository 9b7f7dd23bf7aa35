//! Spamoor load-test scenarios derived from an observed traffic mix.
//!
//! Each transaction type folds into one of four scenario kinds. Throughput
//! is the observed count spread over the slots the scanned blocks span, and
//! the base fee is the observed average gas price minus the tip.

use std::fmt;

use alloy::primitives::U256;
use profiler_data::units::gwei_average;
use profiler_data::{PerBlockStat, RunSummary, TxType};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScenarioKind {
    Eoatx,
    Erctx,
    Deploytx,
    Calltx,
}

impl ScenarioKind {
    pub const ALL: [ScenarioKind; 4] = [
        ScenarioKind::Eoatx,
        ScenarioKind::Erctx,
        ScenarioKind::Deploytx,
        ScenarioKind::Calltx,
    ];

    pub fn for_tx_type(tx_type: TxType) -> Self {
        match tx_type {
            TxType::EthTransfer => Self::Eoatx,
            TxType::Erc20Transfer => Self::Erctx,
            TxType::ContractCreation => Self::Deploytx,
            _ => Self::Calltx,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eoatx => "eoatx",
            Self::Erctx => "erctx",
            Self::Deploytx => "deploytx",
            Self::Calltx => "calltx",
        }
    }

    /// `spamoor_<kind>.yaml`
    pub fn file_name(self) -> String {
        format!("spamoor_{}.yaml", self.as_str())
    }
}

impl fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Constants the derivation assumes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioDefaults {
    pub slot_seconds: u64,
    pub tip_gwei: u64,
    /// Lowest base fee ever emitted.
    pub base_fee_floor_gwei: u64,
    pub refill: RefillConfig,
    pub wallet: WalletConfig,
    pub pending: PendingConfig,
}

impl Default for ScenarioDefaults {
    fn default() -> Self {
        Self {
            slot_seconds: 12,
            tip_gwei: 2,
            base_fee_floor_gwei: 1,
            refill: RefillConfig {
                amount_eth: "5".to_string(),
                balance_eth: "10".to_string(),
                interval_secs: 600,
            },
            wallet: WalletConfig { max_wallets: 50 },
            pending: PendingConfig {
                max_pending: 100,
                rebroadcast: 30,
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefillConfig {
    pub amount_eth: String,
    pub balance_eth: String,
    pub interval_secs: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletConfig {
    pub max_wallets: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingConfig {
    pub max_pending: u64,
    pub rebroadcast: u64,
}

/// One scenario document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioSpec {
    pub kind: ScenarioKind,
    /// Gwei.
    pub base_fee: u64,
    /// Gwei.
    pub tip_fee: u64,
    /// Transactions per slot.
    pub estimated_throughput: u64,
    pub observed_tx: u64,
    pub refill: RefillConfig,
    pub wallet: WalletConfig,
    pub pending: PendingConfig,
}

/// Slots covered by the scanned blocks, at least 1.
///
/// Falls back to the summary's block count when no rows are available.
pub fn observed_slots(summary: &RunSummary, rows: &[PerBlockStat], slot_seconds: u64) -> u64 {
    let first = rows.iter().map(|r| r.timestamp).min();
    let last = rows.iter().map(|r| r.timestamp).max();
    let slots = match (first, last) {
        (Some(first), Some(last)) => (last - first) / slot_seconds.max(1),
        _ => summary.block_count,
    };
    slots.max(1)
}

/// One spec per scenario kind with a non-zero observed count, in kind order.
pub fn scenario_specs(
    summary: &RunSummary,
    rows: &[PerBlockStat],
    defaults: &ScenarioDefaults,
) -> Vec<ScenarioSpec> {
    let slots = observed_slots(summary, rows, defaults.slot_seconds);

    ScenarioKind::ALL
        .into_iter()
        .filter_map(|kind| {
            let (count, gas_price_wei_sum) = summary
                .tx_types
                .iter()
                .filter(|(tx_type, _)| ScenarioKind::for_tx_type(**tx_type) == kind)
                .fold((0u64, U256::ZERO), |(n, sum), (_, stat)| {
                    (n + stat.count, sum.saturating_add(stat.gas_price_wei_sum))
                });
            if count == 0 {
                return None;
            }

            let avg_gwei = gwei_average(gas_price_wei_sum, count);
            let base_fee = avg_gwei
                .saturating_sub(defaults.tip_gwei)
                .max(defaults.base_fee_floor_gwei);

            Some(ScenarioSpec {
                kind,
                base_fee,
                tip_fee: defaults.tip_gwei,
                estimated_throughput: count.div_ceil(slots),
                observed_tx: count,
                refill: defaults.refill.clone(),
                wallet: defaults.wallet.clone(),
                pending: defaults.pending.clone(),
            })
        })
        .collect()
}

/// Combined document: a YAML sequence of every spec.
pub fn scenarios_yaml(specs: &[ScenarioSpec]) -> Result<String, serde_yaml::Error> {
    serde_yaml::to_string(specs)
}

pub fn scenario_yaml(spec: &ScenarioSpec) -> Result<String, serde_yaml::Error> {
    serde_yaml::to_string(spec)
}
