//! Human-readable caveats attached to every summary.

use profiler_data::{ProfilerConfig, TraceMode};

pub const ERC_HEURISTIC_NOTE: &str =
    "ERC20 vs ERC721 inferred from Transfer event payload (amount vs none).";
pub const MIXED_ACTIVITY_NOTE: &str =
    "Mixed token activity indicates multiple token standards in a single tx.";
pub const TX_VALUE_NOTE: &str =
    "ETH transferred sums only tx.value; internal transfers via traces (optional).";
pub const DUAL_PASS_NOTE: &str = "Dual-pass: receipts fetched only for transactions with token events; \
     other transactions were classified from to/value alone and report gas_used 0.";
pub const PARTIAL_NOTE: &str = "Partial run: some blocks, receipts or log chunks failed; see errors.";
pub const CANCELLED_NOTE: &str = "Cancelled before completion; totals cover scanned blocks only.";
pub const TX_CAP_NOTE: &str = "Transaction cap reached; later blocks were not scanned.";
pub const TRACE_ROOT_NOTE: &str =
    "Internal value counts nested call frames only; each top-level tx.value is excluded.";
pub const OFFLINE_NOTE: &str =
    "Offline summary rebuilt from per-block CSV; gas, value and address totals are unavailable.";

/// Offline rows whose `tx_count` exceeds their typed counts. `other_eoa_call`
/// is not a `per_block.csv` column, so those transactions land here.
pub fn unattributed_note(unattributed: u64) -> String {
    format!(
        "{unattributed} transactions in tx_count are not attributed to any type; \
         per_block.csv has no other_eoa_call column."
    )
}

pub fn standard_notes() -> Vec<String> {
    [ERC_HEURISTIC_NOTE, MIXED_ACTIVITY_NOTE, TX_VALUE_NOTE]
        .iter()
        .map(|note| note.to_string())
        .collect()
}

pub fn live_notes(
    config: &ProfilerConfig,
    partial: bool,
    cancelled: bool,
    cap_reached: bool,
) -> Vec<String> {
    let mut notes = standard_notes();
    if config.dual_pass {
        notes.push(DUAL_PASS_NOTE.to_string());
    }
    if config.trace_mode != TraceMode::None {
        notes.push(TRACE_ROOT_NOTE.to_string());
    }
    if cap_reached {
        notes.push(TX_CAP_NOTE.to_string());
    }
    if cancelled {
        notes.push(CANCELLED_NOTE.to_string());
    } else if partial {
        notes.push(PARTIAL_NOTE.to_string());
    }
    notes
}
