//! `per_block.csv` writer.

use std::io::Write;

use profiler_data::{PerBlockStat, TxType};

/// Fixed column order. Offline ingestion matches on these names.
pub const PER_BLOCK_HEADER: [&str; 12] = [
    "block_number",
    "timestamp",
    "tx_count",
    "eth_transfer",
    "contract_creation",
    "erc20_transfer",
    "erc721_transfer",
    "erc1155_transfer",
    "mixed_token_activity",
    "other_contract_call",
    "block_gas_used",
    "block_gas_limit",
];

/// Type columns in header order. `other_eoa_call` has no column.
pub const TYPE_COLUMNS: [TxType; 7] = [
    TxType::EthTransfer,
    TxType::ContractCreation,
    TxType::Erc20Transfer,
    TxType::Erc721Transfer,
    TxType::Erc1155Transfer,
    TxType::MixedTokenActivity,
    TxType::OtherContractCall,
];

fn record(row: &PerBlockStat) -> Vec<String> {
    let mut fields = Vec::with_capacity(PER_BLOCK_HEADER.len());
    fields.push(row.block_number.to_string());
    fields.push(row.timestamp.to_string());
    fields.push(row.tx_count.to_string());
    fields.extend(TYPE_COLUMNS.iter().map(|t| row.counts[*t].to_string()));
    fields.push(row.gas_used.to_string());
    fields.push(row.gas_limit.to_string());
    fields
}

/// Writes the header and one record per row, in the order given.
pub fn write_per_block_csv<W: Write>(writer: W, rows: &[PerBlockStat]) -> Result<(), csv::Error> {
    let mut out = csv::Writer::from_writer(writer);
    out.write_record(PER_BLOCK_HEADER)?;
    for row in rows {
        out.write_record(record(row))?;
    }
    out.flush()?;
    Ok(())
}

pub fn per_block_csv(rows: &[PerBlockStat]) -> Result<String, csv::Error> {
    let mut buf = Vec::new();
    write_per_block_csv(&mut buf, rows)?;
    // every field is ASCII digits or header text
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
