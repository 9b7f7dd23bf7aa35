//! Offline ingestion of previously exported artifacts.
//!
//! The CSV loader matches columns by name, so column order does not matter
//! and unknown columns are ignored. Only `block_number`, `timestamp` and
//! `tx_count` are required; every other known column defaults to 0.

use std::collections::{BTreeMap, HashMap};
use std::io::Read;

use profiler_data::{PerBlockStat, ProfilerError, RunMode, RunSummary, TxType, TypeStat};
use profiler_scan::notes;

use crate::summary::SummaryDocument;

const REQUIRED_COLUMNS: [&str; 3] = ["block_number", "timestamp", "tx_count"];

/// Parses a per-block CSV into rows ordered by block number.
///
/// # Errors
/// Returns [`ProfilerError::Format`] for a missing required column, a
/// non-integer cell, or a block number that appears twice.
pub fn load_per_block_csv<R: Read>(reader: R) -> Result<Vec<PerBlockStat>, ProfilerError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = csv_reader
        .headers()
        .map_err(|e| ProfilerError::format(format!("cannot read CSV header: {e}")))?
        .clone();
    let columns: HashMap<&str, usize> = headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (name, idx))
        .collect();

    for required in REQUIRED_COLUMNS {
        if !columns.contains_key(required) {
            return Err(ProfilerError::format(format!(
                "missing required column {required:?}"
            )));
        }
    }

    let mut rows: BTreeMap<u64, PerBlockStat> = BTreeMap::new();
    for (line, record) in csv_reader.records().enumerate() {
        // header is line 1
        let line = line + 2;
        let record =
            record.map_err(|e| ProfilerError::format(format!("line {line}: {e}")))?;

        let cell = |name: &str| -> Result<u64, ProfilerError> {
            let Some(&idx) = columns.get(name) else {
                return Ok(0);
            };
            match record.get(idx) {
                None | Some("") => Ok(0),
                Some(text) => text.parse::<u64>().map_err(|_| {
                    ProfilerError::format(format!("line {line}: {name} {text:?} is not an integer"))
                }),
            }
        };

        let mut row = PerBlockStat {
            block_number: cell("block_number")?,
            timestamp: cell("timestamp")?,
            tx_count: cell("tx_count")?,
            gas_used: cell("block_gas_used")?,
            gas_limit: cell("block_gas_limit")?,
            ..PerBlockStat::default()
        };
        for tx_type in TxType::ALL {
            row.counts[tx_type] = cell(tx_type.as_str())?;
        }

        if rows.insert(row.block_number, row).is_some() {
            return Err(ProfilerError::format(format!(
                "line {line}: duplicate block number"
            )));
        }
    }

    tracing::debug!(rows = rows.len(), "per-block CSV loaded");
    Ok(rows.into_values().collect())
}

/// Rebuilds a summary from per-block rows alone.
///
/// Rows carry counts only, so gas, value and address figures stay zero and
/// the summary says so in its notes. Transactions a row carries but no typed
/// column accounts for are reported in a note rather than guessed.
pub fn summarize_rows(rows: &[PerBlockStat]) -> RunSummary {
    let mut tx_types: BTreeMap<TxType, TypeStat> = BTreeMap::new();
    for row in rows {
        for (tx_type, count) in row.counts.iter() {
            if count > 0 {
                tx_types.entry(tx_type).or_default().count += count;
            }
        }
    }

    let start_block = rows.iter().map(|r| r.block_number).min().unwrap_or(0);
    let end_block = rows.iter().map(|r| r.block_number).max().unwrap_or(0);
    let mut notes = notes::standard_notes();
    notes.push(notes::OFFLINE_NOTE.to_string());
    let unattributed: u64 = rows
        .iter()
        .map(|r| r.tx_count.saturating_sub(r.counts.total()))
        .sum();
    if unattributed > 0 {
        notes.push(notes::unattributed_note(unattributed));
    }

    RunSummary {
        start_block,
        end_block,
        block_count: rows.len() as u64,
        total_tx: tx_types.values().map(|s| s.count).sum(),
        tx_types,
        mode: RunMode::Offline,
        notes,
        ..RunSummary::default()
    }
}

/// Reads a `summary.json` back; the result is marked offline.
///
/// # Errors
/// Returns [`ProfilerError::Format`] for invalid JSON or malformed amounts.
pub fn load_summary_json<R: Read>(reader: R) -> Result<RunSummary, ProfilerError> {
    let doc: SummaryDocument = serde_json::from_reader(reader)
        .map_err(|e| ProfilerError::format(format!("invalid summary JSON: {e}")))?;
    let mut summary = doc.into_run_summary()?;
    summary.mode = RunMode::Offline;
    Ok(summary)
}
