//! Order-independent accumulation of per-block and per-type statistics.
//!
//! Blocks finish out of order, so rows land in an arena slot indexed by
//! `block_number - start` and are compacted in block order only at
//! [`Aggregator::finalize`]. Every counter is a sum or a set union, which makes
//! [`Aggregator::merge_block`] and [`Aggregator::merge`] commutative.

use std::collections::{BTreeMap, HashMap, HashSet};

use alloy::primitives::{Address, U256};
use profiler_data::{
    PerBlockStat, RunLimits, RunMode, RunSummary, ScanFailure, TxType, TypeCounts, TypeStat,
};

/// Entries kept in each top-N list.
pub const TOP_N: usize = 20;

/// One classified transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxOutcome {
    pub tx_type: TxType,
    pub from: Address,
    pub to: Option<Address>,
    /// Receipt gas; 0 when no receipt was fetched.
    pub gas_used: u64,
    pub gas_price: u128,
    pub value: U256,
    /// Dominant token emitter of the receipt.
    pub token: Option<Address>,
    /// Every token-event emitter of the receipt with its log count.
    pub token_emitters: Vec<(Address, u64)>,
}

/// One fully processed block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockOutcome {
    pub number: u64,
    pub timestamp: u64,
    /// Transactions the block carries, processed or not.
    pub tx_count: u64,
    pub gas_used: u64,
    pub gas_limit: u64,
    pub txs: Vec<TxOutcome>,
}

/// Run-level facts the aggregator does not observe itself.
#[derive(Clone, Debug, Default)]
pub struct RunMeta {
    pub chain_id: Option<u64>,
    pub mode: RunMode,
    pub cancelled: bool,
    pub notes: Vec<String>,
    pub limits: Option<RunLimits>,
}

#[derive(Debug, Default)]
pub struct Aggregator {
    start_block: u64,
    end_block: u64,
    slots: Vec<Option<PerBlockStat>>,
    types: BTreeMap<TxType, TypeStat>,
    senders: HashSet<Address>,
    receivers: HashSet<Address>,
    contracts: HashMap<Address, u64>,
    total_eth_wei: U256,
    internal_value_wei: U256,
    failures: Vec<ScanFailure>,
    partial: bool,
}

impl Aggregator {
    /// Arena for the inclusive range `[start_block, end_block]`. Slots grow on demand.
    pub fn new(start_block: u64, end_block: u64) -> Self {
        Self {
            start_block,
            end_block,
            ..Self::default()
        }
    }

    fn slot_index(&self, block_number: u64) -> Option<usize> {
        if block_number < self.start_block || block_number > self.end_block {
            tracing::warn!(
                block_number,
                start = self.start_block,
                end = self.end_block,
                "block outside aggregation range, dropping it"
            );
            return None;
        }
        usize::try_from(block_number - self.start_block).ok()
    }

    /// Folds one block in. Blocks outside the arena range are dropped whole.
    pub fn merge_block(&mut self, block: BlockOutcome) {
        let Some(index) = self.slot_index(block.number) else {
            return;
        };

        let mut counts = TypeCounts::default();
        for tx in &block.txs {
            counts[tx.tx_type] += 1;
            self.merge_tx(tx);
        }

        let row = PerBlockStat {
            block_number: block.number,
            timestamp: block.timestamp,
            tx_count: block.tx_count,
            counts,
            gas_used: block.gas_used,
            gas_limit: block.gas_limit,
        };
        self.place_row(index, row);
    }

    fn merge_tx(&mut self, tx: &TxOutcome) {
        let stat = self.types.entry(tx.tx_type).or_default();
        stat.add(&TypeStat {
            count: 1,
            gas_used_sum: u128::from(tx.gas_used),
            gas_price_wei_sum: U256::from(tx.gas_price),
            eth_value_wei_sum: tx.value,
        });

        self.senders.insert(tx.from);
        if let Some(to) = tx.to {
            self.receivers.insert(to);
            *self.contracts.entry(to).or_default() += 1;
        }
        self.total_eth_wei = self.total_eth_wei.saturating_add(tx.value);
    }

    fn place_row(&mut self, index: usize, row: PerBlockStat) {
        if index >= self.slots.len() {
            self.slots.resize(index + 1, None);
        }
        match &mut self.slots[index] {
            Some(existing) => existing.counts.add(&row.counts),
            slot @ None => *slot = Some(row),
        }
    }

    /// Folds another aggregator in. Rows are re-slotted by block number.
    pub fn merge(&mut self, other: Aggregator) {
        for row in other.slots.into_iter().flatten() {
            if let Some(index) = self.slot_index(row.block_number) {
                self.place_row(index, row);
            }
        }
        for (tx_type, stat) in other.types {
            self.types.entry(tx_type).or_default().add(&stat);
        }
        self.senders.extend(other.senders);
        self.receivers.extend(other.receivers);
        for (address, count) in other.contracts {
            *self.contracts.entry(address).or_default() += count;
        }
        self.total_eth_wei = self.total_eth_wei.saturating_add(other.total_eth_wei);
        self.internal_value_wei = self
            .internal_value_wei
            .saturating_add(other.internal_value_wei);
        self.failures.extend(other.failures);
        self.partial |= other.partial;
    }

    pub fn add_internal_value(&mut self, wei: U256) {
        self.internal_value_wei = self.internal_value_wei.saturating_add(wei);
    }

    /// Appends to the error log; data-losing failures flag the run partial.
    pub fn record_failure(&mut self, failure: ScanFailure) {
        if failure.unit.affects_completeness() {
            self.partial = true;
        }
        self.failures.push(failure);
    }

    pub fn mark_partial(&mut self) {
        self.partial = true;
    }

    pub fn is_partial(&self) -> bool {
        self.partial
    }

    pub fn total_tx(&self) -> u64 {
        self.types.values().map(|s| s.count).sum()
    }

    /// Numbers of the blocks that produced a row, ascending.
    pub fn block_numbers(&self) -> Vec<u64> {
        self.slots
            .iter()
            .flatten()
            .map(|row| row.block_number)
            .collect()
    }

    pub fn block_rows(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    /// Compacts the arena and builds the summary.
    ///
    /// `top_tokens` comes from the token registry and is truncated to [`TOP_N`].
    pub fn finalize(
        self,
        meta: RunMeta,
        top_tokens: Vec<(Address, u64)>,
    ) -> (RunSummary, Vec<PerBlockStat>) {
        let rows: Vec<PerBlockStat> = self.slots.into_iter().flatten().collect();
        let total_tx = self.types.values().map(|s| s.count).sum();

        let summary = RunSummary {
            start_block: self.start_block,
            end_block: self.end_block,
            chain_id: meta.chain_id,
            block_count: self
                .end_block
                .saturating_sub(self.start_block)
                .saturating_add(1),
            total_tx,
            unique_senders: self.senders.len() as u64,
            unique_receivers: self.receivers.len() as u64,
            total_eth_wei: self.total_eth_wei,
            internal_value_wei: self.internal_value_wei,
            tx_types: self.types,
            top_contracts: top_by_count(self.contracts),
            top_tokens: top_by_count(top_tokens),
            mode: meta.mode,
            partial: self.partial || meta.cancelled,
            cancelled: meta.cancelled,
            notes: meta.notes,
            failures: self.failures,
            limits: meta.limits,
        };

        (summary, rows)
    }
}

/// Count descending, then address ascending, capped at [`TOP_N`].
pub fn top_by_count(counts: impl IntoIterator<Item = (Address, u64)>) -> Vec<(Address, u64)> {
    let mut entries: Vec<(Address, u64)> = counts.into_iter().collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    entries.truncate(TOP_N);
    entries
}
