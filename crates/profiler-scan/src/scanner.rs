//! Block/receipt scanner: drives a whole profiling run.
//!
//! A run walks `[start, end]` page by page. Inside a page every block is a
//! spawned task; a block semaphore bounds how many are fetching at once and
//! a separate receipt semaphore bounds receipt fetches across all blocks.
//! Results come back in completion order; the single merge loop drops those
//! that finish after cancellation, sorts the rest by block number and folds
//! them into a per-page [`Aggregator`]. The `--tx-cap` budget is granted
//! there in block order, so a capped run is always an unbroken prefix of the
//! range.
//!
//! In dual-pass mode the [`LogScanner`] runs first and only its candidate
//! transactions get a receipt here.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use alloy::primitives::B256;
use futures::stream::{self, StreamExt};
use indicatif::ProgressBar;
use profiler_data::{
    Block, CancelFlag, ChainGateway, ContractCache, PerBlockStat, ProfilerConfig, ProfilerError,
    RunLimits, RunMode, RunSummary, ScanFailure, ScanUnit, TokenRecord, TraceMode, Transaction,
};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::aggregate::{Aggregator, BlockOutcome, RunMeta, TxOutcome};
use crate::classify::{classify, code_lookup_target, CodePresence, TokenLogTally};
use crate::logscan::LogScanner;
use crate::notes;
use crate::tokens::{TokenRegistry, TokenResolver};
use crate::trace::internal_value;

/// Everything a finished run hands to its consumers.
#[derive(Debug)]
pub struct ScanReport {
    pub summary: RunSummary,
    /// One row per scanned block, ascending.
    pub rows: Vec<PerBlockStat>,
    pub tokens: Vec<TokenRecord>,
}

/// Global transaction budget for `--tx-cap`.
///
/// Only the merge loop reserves from it, one block at a time in ascending
/// order.
#[derive(Debug)]
pub struct TxBudget {
    remaining: Option<AtomicU64>,
}

impl TxBudget {
    pub fn new(cap: Option<u64>) -> Self {
        Self {
            remaining: cap.map(AtomicU64::new),
        }
    }

    /// Takes up to `wanted` transactions. `None` once the budget is spent.
    pub fn reserve(&self, wanted: u64) -> Option<u64> {
        let Some(remaining) = &self.remaining else {
            return Some(wanted);
        };
        let mut granted = 0;
        remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| {
                if left == 0 {
                    return None;
                }
                granted = left.min(wanted);
                Some(left - granted)
            })
            .ok()
            .map(|_| granted)
    }

    /// What is left; `None` when uncapped.
    pub fn remaining(&self) -> Option<u64> {
        self.remaining
            .as_ref()
            .map(|left| left.load(Ordering::SeqCst))
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining
            .as_ref()
            .is_some_and(|left| left.load(Ordering::SeqCst) == 0)
    }
}

/// Per-run state shared with spawned block tasks.
struct ScanState {
    gateway: Arc<dyn ChainGateway>,
    cancel: CancelFlag,
    cache: ContractCache,
    budget: TxBudget,
    receipt_permits: Semaphore,
    skip_contract_check: bool,
    /// `Some` in dual-pass mode: the only hashes that get a receipt.
    candidates: Option<HashSet<B256>>,
    blocks_fetched: AtomicU64,
    receipts_fetched: AtomicU64,
    code_lookups: AtomicU64,
}

enum BlockTaskResult {
    Done(ScannedBlock),
    Failed { number: u64, failure: ScanFailure },
    /// Cancelled before fetching.
    Skipped,
}

impl BlockTaskResult {
    fn number(&self) -> Option<u64> {
        match self {
            Self::Done(block) => Some(block.number),
            Self::Failed { number, .. } => Some(*number),
            Self::Skipped => None,
        }
    }
}

/// A fetched block whose transactions are processed but not yet merged.
struct ScannedBlock {
    number: u64,
    timestamp: u64,
    gas_used: u64,
    gas_limit: u64,
    carried: u64,
    /// In block order.
    txs: Vec<TxTaskResult>,
}

impl ScannedBlock {
    /// Keeps the first `granted` transactions and returns the row outcome plus
    /// the soft failures of the kept ones.
    fn into_outcome(self, granted: u64) -> (BlockOutcome, Vec<ScanFailure>) {
        let kept = usize::try_from(granted).unwrap_or(usize::MAX);
        let mut txs = Vec::with_capacity(self.txs.len().min(kept));
        let mut failures = Vec::new();
        for result in self.txs.into_iter().take(kept) {
            match result {
                TxTaskResult::Classified(outcome, failure) => {
                    txs.push(outcome);
                    failures.extend(failure);
                }
                TxTaskResult::Failed(failure) => failures.push(failure),
                TxTaskResult::Skipped => {}
            }
        }
        let outcome = BlockOutcome {
            number: self.number,
            timestamp: self.timestamp,
            tx_count: self.carried,
            gas_used: self.gas_used,
            gas_limit: self.gas_limit,
            txs,
        };
        (outcome, failures)
    }
}

enum TxTaskResult {
    Classified(TxOutcome, Option<ScanFailure>),
    Failed(ScanFailure),
    Skipped,
}

pub struct Scanner {
    gateway: Arc<dyn ChainGateway>,
    config: ProfilerConfig,
    cancel: CancelFlag,
    progress: ProgressBar,
}

impl Scanner {
    /// Validates `config`; nothing touches the network before this passes.
    ///
    /// # Errors
    /// Returns [`ProfilerError::InputValidation`] for an unusable configuration.
    pub fn new(
        gateway: Arc<dyn ChainGateway>,
        config: ProfilerConfig,
        cancel: CancelFlag,
    ) -> Result<Self, ProfilerError> {
        config.validate()?;
        Ok(Self {
            gateway,
            config,
            cancel,
            progress: ProgressBar::hidden(),
        })
    }

    /// Reports scanned blocks on `progress`; its length is set by [`Scanner::run`].
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &ProfilerConfig {
        &self.config
    }

    /// Runs every phase and returns the finalized results.
    ///
    /// Soft failures and cancellation never turn into an error here; they
    /// show up as a partial summary with a populated error log.
    #[tracing::instrument(skip_all, fields(
        start = self.config.start_block,
        end = self.config.end_block,
        dual_pass = self.config.dual_pass
    ))]
    pub async fn run(&self) -> ScanReport {
        let config = &self.config;
        let registry = TokenRegistry::new();
        let mut agg = Aggregator::new(config.start_block, config.end_block);

        let chain_id = match self.gateway.chain_id().await {
            Ok(id) => Some(id),
            Err(error) => {
                tracing::warn!(error = %error, "eth_chainId failed");
                agg.record_failure(ScanFailure::new(ScanUnit::ChainId, error));
                None
            }
        };

        let candidates = if config.dual_pass && !self.cancel.is_cancelled() {
            let report = LogScanner::new(
                self.gateway.as_ref(),
                &registry,
                self.cancel.clone(),
                config.concurrency,
                config.log_step,
            )
            .run(config.start_block, config.end_block)
            .await;
            for failure in report.failures {
                agg.record_failure(failure);
            }
            Some(report.candidates)
        } else {
            None
        };

        let state = Arc::new(ScanState {
            gateway: Arc::clone(&self.gateway),
            cancel: self.cancel.clone(),
            cache: ContractCache::new(),
            budget: TxBudget::new(config.tx_cap),
            receipt_permits: Semaphore::new(config.concurrency),
            skip_contract_check: config.skip_contract_check,
            candidates,
            blocks_fetched: AtomicU64::new(0),
            receipts_fetched: AtomicU64::new(0),
            code_lookups: AtomicU64::new(0),
        });

        self.scan_blocks(&state, &registry, &mut agg).await;

        if config.trace_mode != TraceMode::None && !self.cancel.is_cancelled() {
            self.trace_internal_value(&mut agg).await;
        }

        if config.resolve_tokens && !registry.is_empty() && !self.cancel.is_cancelled() {
            TokenResolver::new(self.gateway.as_ref(), config.concurrency, self.cancel.clone())
                .resolve(&registry, registry.addresses())
                .await;
        }

        let cancelled = self.cancel.is_cancelled();
        let cap_reached = state.budget.is_exhausted();
        let meta = RunMeta {
            chain_id,
            mode: RunMode::Live,
            cancelled,
            notes: notes::live_notes(
                config,
                agg.is_partial() || cancelled,
                cancelled,
                cap_reached,
            ),
            limits: Some(RunLimits::from(config)),
        };

        tracing::info!(
            blocks = state.blocks_fetched.load(Ordering::Relaxed),
            receipts = state.receipts_fetched.load(Ordering::Relaxed),
            code_lookups = state.code_lookups.load(Ordering::Relaxed),
            cached_addresses = state.cache.len(),
            tokens = registry.len(),
            cancelled,
            "scan finished"
        );

        let (summary, rows) = agg.finalize(meta, registry.counts());
        ScanReport {
            summary,
            rows,
            tokens: registry.snapshot(),
        }
    }

    async fn scan_blocks(
        &self,
        state: &Arc<ScanState>,
        registry: &TokenRegistry,
        agg: &mut Aggregator,
    ) {
        let config = &self.config;
        let block_permits = Arc::new(Semaphore::new(config.concurrency));
        self.progress.set_length(config.block_count());

        for (page_start, page_end) in
            ProfilerConfig::windows(config.start_block, config.end_block, config.page_size)
        {
            if self.cancel.is_cancelled() {
                tracing::info!(page_start, "cancelled, not dispatching further pages");
                break;
            }
            if state.budget.is_exhausted() {
                tracing::info!(page_start, "tx cap reached, not dispatching further pages");
                break;
            }

            // no block in this page can be granted more than what is left now
            let allowance = state.budget.remaining();
            let mut tasks = JoinSet::new();
            for number in page_start..=page_end {
                let state = Arc::clone(state);
                let permits = Arc::clone(&block_permits);
                tasks.spawn(async move {
                    let _permit = permits.acquire_owned().await.ok();
                    scan_block(state, number, allowance).await
                });
            }

            let mut page = Aggregator::new(page_start, page_end);
            let mut finished = Vec::new();
            let mut discarded = 0usize;
            while let Some(joined) = tasks.join_next().await {
                let result = match joined {
                    Ok(result) => result,
                    Err(e) => {
                        tracing::error!(error = %e, "block task panicked");
                        page.mark_partial();
                        continue;
                    }
                };
                if self.cancel.is_cancelled() {
                    if !matches!(result, BlockTaskResult::Skipped) {
                        discarded += 1;
                    }
                    continue;
                }
                if let Some(number) = result.number() {
                    finished.push((number, result));
                }
            }
            finished.sort_unstable_by_key(|(number, _)| *number);

            let mut over_cap = 0usize;
            for (_, result) in finished {
                match result {
                    BlockTaskResult::Done(block) => {
                        let Some(granted) = state.budget.reserve(block.carried) else {
                            over_cap += 1;
                            continue;
                        };
                        let (outcome, failures) = block.into_outcome(granted);
                        if state.candidates.is_none() {
                            for tx in &outcome.txs {
                                for (token, count) in &tx.token_emitters {
                                    registry.observe_many(*token, *count);
                                }
                            }
                        }
                        for failure in failures {
                            page.record_failure(failure);
                        }
                        page.merge_block(outcome);
                        self.progress.inc(1);
                    }
                    BlockTaskResult::Failed { failure, .. } => {
                        if state.budget.is_exhausted() {
                            over_cap += 1;
                            continue;
                        }
                        page.record_failure(failure);
                        self.progress.inc(1);
                    }
                    BlockTaskResult::Skipped => {}
                }
            }

            if discarded > 0 {
                tracing::info!(discarded, "dropped block results that finished after cancellation");
            }
            if over_cap > 0 {
                tracing::info!(over_cap, "dropped blocks past the tx cap");
            }
            tracing::debug!(page_start, page_end, rows = page.block_rows(), "page merged");
            agg.merge(page);
        }

        self.progress.finish_and_clear();
    }

    async fn trace_internal_value(&self, agg: &mut Aggregator) {
        let mode = self.config.trace_mode;
        let numbers = agg.block_numbers();
        tracing::info!(%mode, blocks = numbers.len(), "tracing internal value");

        let mut traces = stream::iter(numbers)
            .map(|number| async move {
                if self.cancel.is_cancelled() {
                    return None;
                }
                Some((number, self.gateway.trace_block(number, mode).await))
            })
            .buffer_unordered(self.config.concurrency);

        while let Some(traced) = traces.next().await {
            let Some((number, result)) = traced else {
                continue;
            };
            if self.cancel.is_cancelled() {
                continue;
            }
            match result {
                Ok(trace) => agg.add_internal_value(internal_value(mode, &trace)),
                Err(error) => {
                    tracing::warn!(block_number = number, error = %error, "trace failed, counting 0");
                    agg.record_failure(ScanFailure::new(ScanUnit::Trace { number }, error));
                }
            }
        }
    }
}

/// Fetches block `number` and processes at most `allowance` of its
/// transactions. The budget itself is charged later, by the merge loop.
#[tracing::instrument(skip(state))]
async fn scan_block(
    state: Arc<ScanState>,
    number: u64,
    allowance: Option<u64>,
) -> BlockTaskResult {
    if state.cancel.is_cancelled() {
        return BlockTaskResult::Skipped;
    }

    let block = match state.gateway.fetch_block(number).await {
        Ok(block) => block,
        Err(error) => {
            tracing::warn!(block_number = number, error = %error, "block fetch failed, skipping");
            return BlockTaskResult::Failed {
                number,
                failure: ScanFailure::new(ScanUnit::Block { number }, error),
            };
        }
    };
    state.blocks_fetched.fetch_add(1, Ordering::Relaxed);

    let carried = block.transactions.len() as u64;
    let processed_count = allowance.map_or(carried, |left| left.min(carried));

    let Block {
        number,
        timestamp,
        gas_used,
        gas_limit,
        transactions,
    } = block;

    let processed = transactions
        .into_iter()
        .take(usize::try_from(processed_count).unwrap_or(usize::MAX));
    let txs = futures::future::join_all(
        processed.map(|tx| scan_tx(Arc::clone(&state), number, tx)),
    )
    .await;

    tracing::debug!(block_number = number, carried, processed = txs.len(), "block scanned");

    BlockTaskResult::Done(ScannedBlock {
        number,
        timestamp,
        gas_used,
        gas_limit,
        carried,
        txs,
    })
}

async fn scan_tx(state: Arc<ScanState>, block: u64, tx: Transaction) -> TxTaskResult {
    let wants_receipt = state
        .candidates
        .as_ref()
        .map_or(true, |candidates| candidates.contains(&tx.hash));

    let receipt = if wants_receipt {
        let _permit = state.receipt_permits.acquire().await.ok();
        if state.cancel.is_cancelled() {
            return TxTaskResult::Skipped;
        }
        match state.gateway.fetch_receipt(tx.hash).await {
            Ok(receipt) => {
                state.receipts_fetched.fetch_add(1, Ordering::Relaxed);
                Some(receipt)
            }
            Err(error) => {
                tracing::warn!(tx_hash = %tx.hash, error = %error, "receipt fetch failed, skipping tx");
                return TxTaskResult::Failed(ScanFailure::new(
                    ScanUnit::Receipt {
                        block,
                        tx_hash: tx.hash,
                    },
                    error,
                ));
            }
        }
    } else {
        None
    };

    let mut code_failure = None;
    let code = match code_lookup_target(&tx, receipt.as_ref()) {
        Some(address) if !state.skip_contract_check => {
            if state.cancel.is_cancelled() {
                return TxTaskResult::Skipped;
            }
            if state.cache.get(&address).is_none() {
                state.code_lookups.fetch_add(1, Ordering::Relaxed);
            }
            match state.cache.is_contract(state.gateway.as_ref(), address).await {
                Ok(true) => CodePresence::Contract,
                Ok(false) => CodePresence::NotContract,
                Err(error) => {
                    tracing::warn!(%address, error = %error, "code lookup failed, treating as EOA");
                    code_failure = Some(ScanFailure::new(ScanUnit::Code { address }, error));
                    CodePresence::NotContract
                }
            }
        }
        _ => CodePresence::Unchecked,
    };

    let classification = classify(&tx, receipt.as_ref(), code);
    let token_emitters = receipt
        .as_ref()
        .map(|r| TokenLogTally::from_logs(&r.logs).emitters().to_vec())
        .unwrap_or_default();

    TxTaskResult::Classified(
        TxOutcome {
            tx_type: classification.tx_type,
            from: tx.from,
            to: tx.to,
            gas_used: receipt.as_ref().map_or(0, |r| r.gas_used),
            gas_price: tx.gas_price,
            value: tx.value,
            token: classification.token,
            token_emitters,
        },
        code_failure,
    )
}
