//! Pass 1 of a dual-pass run: a chunked `eth_getLogs` sweep for token events.
//!
//! The sweep never touches receipts. It registers every emitting token and
//! collects the hashes of the transactions that emitted them; only those get
//! a receipt in pass 2.

use std::collections::HashSet;

use alloy::primitives::B256;
use futures::stream::{self, StreamExt};
use profiler_data::signatures::{token_event, TOKEN_EVENT_TOPICS};
use profiler_data::{
    CancelFlag, ChainGateway, Log, ProfilerConfig, ProfilerError, ScanFailure, ScanUnit,
};

use crate::tokens::TokenRegistry;

/// What pass 1 found.
#[derive(Debug, Default)]
pub struct LogScanReport {
    /// Transactions that emitted at least one token event.
    pub candidates: HashSet<B256>,
    pub token_logs: u64,
    pub chunks_scanned: usize,
    pub failures: Vec<ScanFailure>,
    pub cancelled: bool,
}

pub struct LogScanner<'a> {
    gateway: &'a dyn ChainGateway,
    registry: &'a TokenRegistry,
    cancel: CancelFlag,
    concurrency: usize,
    step: u64,
}

impl<'a> LogScanner<'a> {
    pub fn new(
        gateway: &'a dyn ChainGateway,
        registry: &'a TokenRegistry,
        cancel: CancelFlag,
        concurrency: usize,
        step: u64,
    ) -> Self {
        Self {
            gateway,
            registry,
            cancel,
            concurrency: concurrency.max(1),
            step: step.max(1),
        }
    }

    /// Sweeps `[start, end]` in `step`-block chunks, at most `concurrency` in flight.
    #[tracing::instrument(skip(self), fields(step = self.step))]
    pub async fn run(&self, start: u64, end: u64) -> LogScanReport {
        let windows = ProfilerConfig::windows(start, end, self.step);
        tracing::info!(chunks = windows.len(), "log scan started");

        let mut chunks = stream::iter(windows)
            .map(|(from, to)| async move {
                if self.cancel.is_cancelled() {
                    return None;
                }
                let result = self
                    .gateway
                    .fetch_logs(from, to, &TOKEN_EVENT_TOPICS)
                    .await;
                Some((from, to, result))
            })
            .buffer_unordered(self.concurrency);

        let mut report = LogScanReport::default();
        while let Some(chunk) = chunks.next().await {
            // finished after cancellation: drop it
            if self.cancel.is_cancelled() {
                report.cancelled = true;
                continue;
            }
            let Some((from, to, result)) = chunk else {
                continue;
            };
            match result {
                Ok(logs) => {
                    self.absorb(&logs, &mut report);
                    report.chunks_scanned += 1;
                    tracing::debug!(from, to, logs = logs.len(), "log chunk scanned");
                }
                Err(error) => self.record(&mut report, from, to, error),
            }
        }

        if self.cancel.is_cancelled() {
            report.cancelled = true;
        }
        tracing::info!(
            candidates = report.candidates.len(),
            tokens = self.registry.len(),
            token_logs = report.token_logs,
            failed_chunks = report.failures.len(),
            "log scan finished"
        );
        report
    }

    fn absorb(&self, logs: &[Log], report: &mut LogScanReport) {
        for log in logs {
            if token_event(log).is_none() {
                continue;
            }
            self.registry.observe(log.address);
            report.token_logs += 1;
            if let Some(hash) = log.transaction_hash {
                report.candidates.insert(hash);
            }
        }
    }

    fn record(&self, report: &mut LogScanReport, from: u64, to: u64, error: ProfilerError) {
        tracing::warn!(from, to, error = %error, "log chunk failed, skipping");
        report
            .failures
            .push(ScanFailure::new(ScanUnit::LogChunk { from, to }, error));
    }
}
