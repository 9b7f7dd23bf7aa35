//! Internal value transfer totals from node trace output.
//!
//! Top-level frames repeat `tx.value`, which the aggregator already sums, so
//! only nested calls are counted here.

use alloy::primitives::U256;
use profiler_data::TraceMode;
use serde_json::Value;

/// Sums internal call value in one block's raw trace output.
pub fn internal_value(mode: TraceMode, trace: &Value) -> U256 {
    match mode {
        TraceMode::None => U256::ZERO,
        TraceMode::Erigon => erigon_internal_value(trace),
        TraceMode::Geth => geth_internal_value(trace),
    }
}

fn hex_quantity(value: Option<&Value>) -> U256 {
    value
        .and_then(Value::as_str)
        .and_then(|s| s.strip_prefix("0x"))
        .and_then(|hex| U256::from_str_radix(hex, 16).ok())
        .unwrap_or(U256::ZERO)
}

/// `trace_block`: a flat list of frames; `traceAddress == []` marks the root.
pub fn erigon_internal_value(trace: &Value) -> U256 {
    let Some(frames) = trace.as_array() else {
        return U256::ZERO;
    };
    frames
        .iter()
        .filter(|frame| frame.get("type").and_then(Value::as_str) == Some("call"))
        .filter(|frame| {
            frame
                .get("traceAddress")
                .and_then(Value::as_array)
                .is_some_and(|path| !path.is_empty())
        })
        .map(|frame| hex_quantity(frame.get("action").and_then(|a| a.get("value"))))
        .fold(U256::ZERO, U256::saturating_add)
}

/// `debug_traceBlockByNumber` with `callTracer`: one call tree per transaction.
pub fn geth_internal_value(trace: &Value) -> U256 {
    let Some(txs) = trace.as_array() else {
        return U256::ZERO;
    };
    let mut total = U256::ZERO;
    for tx in txs {
        let root = tx.get("result").unwrap_or(tx);
        for child in children(root) {
            total = total.saturating_add(subtree_value(child));
        }
    }
    total
}

fn children(frame: &Value) -> impl Iterator<Item = &Value> {
    frame
        .get("calls")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

fn subtree_value(frame: &Value) -> U256 {
    children(frame).fold(hex_quantity(frame.get("value")), |acc, child| {
        acc.saturating_add(subtree_value(child))
    })
}
