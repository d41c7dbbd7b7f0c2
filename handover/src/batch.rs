use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};

use crate::migration::processors::build_migrators;
use crate::migration::{
    MigrationController, MigrationError, MigrationPair, PairReport, PairState, ResourceMigrator,
    ResultCounts, RunOptions,
};
use crate::primitives::logger::{with_task_context, LogContext};
use crate::{EngineOptions, JiraClient};

/// Maximum number of pairs migrated per batch. Pairs at later input positions are
/// reported as skipped.
pub const MAX_BATCH_PAIRS: usize = 600;

/// Receives progress notifications while a batch runs.
///
/// Callbacks are invoked from the engine's tasks and must return quickly.
#[uniffi::export(with_foreign)]
pub trait ProgressListener: Send + Sync {
    /// A pair is about to be migrated.
    fn on_pair_started(&self, index: u32, pair: MigrationPair);

    /// A pair finished or was skipped.
    fn on_pair_finished(&self, report: PairReport);
}

/// Cooperative cancellation for a running batch.
///
/// Cancellation is checked before each pair starts; a pair that is already running
/// finishes normally.
#[derive(Debug, Default, uniffi::Object)]
pub struct CancellationToken {
    cancelled: AtomicBool,
}

#[crate::handover_export]
impl CancellationToken {
    /// Creates a token that is not cancelled.
    #[uniffi::constructor]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        crate::info!(
            "batch.cancel_requested timestamp={}",
            Utc::now().to_rfc3339()
        );
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Outcome of a whole batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, uniffi::Record)]
pub struct BatchReport {
    /// Whether the batch ran in dry-run mode
    pub dry_run: bool,
    /// Pairs whose migrators ran
    pub processed: u32,
    /// Pairs that were not migrated
    pub skipped: u32,
    /// Whether cancellation was requested during the run
    pub cancelled: bool,
    /// Counters summed over all pairs
    pub totals: ResultCounts,
    /// One report per input pair, in input order
    pub pairs: Vec<PairReport>,
}

impl BatchReport {
    /// Renders the report as pretty-printed JSON.
    ///
    /// # Errors
    /// - `MigrationError::JsonError` if serialization fails
    pub fn to_json(&self) -> Result<String, MigrationError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Runs a list of pairs against one server.
pub struct BatchRunner {
    client: Arc<JiraClient>,
    options: EngineOptions,
    listener: Option<Arc<dyn ProgressListener>>,
    cancellation: Arc<CancellationToken>,
}

impl BatchRunner {
    /// Creates a runner with no listener and a fresh cancellation token.
    #[must_use]
    pub fn new(client: Arc<JiraClient>, options: EngineOptions) -> Self {
        Self {
            client,
            options,
            listener: None,
            cancellation: Arc::new(CancellationToken::new()),
        }
    }

    /// Sets the progress listener.
    #[must_use]
    pub fn with_listener(mut self, listener: Arc<dyn ProgressListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Sets the cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, cancellation: Arc<CancellationToken>) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// Runs `pairs` with the resource types selected in `run_options`.
    ///
    /// Input files are read once, before the first pair.
    pub async fn run(&self, pairs: Vec<MigrationPair>, run_options: &RunOptions) -> BatchReport {
        let migrators = build_migrators(&run_options.features);
        self.run_with_migrators(pairs, run_options.dry_run, migrators)
            .await
    }

    /// Runs `pairs` with an explicit set of migrators.
    pub async fn run_with_migrators(
        &self,
        pairs: Vec<MigrationPair>,
        dry_run: bool,
        migrators: Vec<Arc<dyn ResourceMigrator>>,
    ) -> BatchReport {
        let batch_start_time = Utc::now();
        let controller = MigrationController::new(self.client.clone(), migrators);
        let concurrency = usize::try_from(self.options.max_concurrent_pairs.max(1)).unwrap_or(1);

        crate::info!(
            "batch.started pairs={} resource_types={} dry_run={} concurrency={} timestamp={}",
            pairs.len(),
            controller.migrator_count(),
            dry_run,
            concurrency,
            batch_start_time.to_rfc3339()
        );
        if pairs.len() > MAX_BATCH_PAIRS {
            crate::warn!(
                "batch.cap_exceeded pairs={} cap={} skipped={}",
                pairs.len(),
                MAX_BATCH_PAIRS,
                pairs.len() - MAX_BATCH_PAIRS
            );
        }

        // `buffered` keeps input order while running up to `concurrency` pairs at once
        let reports: Vec<PairReport> = stream::iter(pairs.into_iter().enumerate())
            .map(|(index, pair)| self.run_one(&controller, index, pair, dry_run))
            .buffered(concurrency)
            .collect()
            .await;

        let mut report = BatchReport {
            dry_run,
            processed: 0,
            skipped: 0,
            cancelled: self.cancellation.is_cancelled(),
            totals: ResultCounts::default(),
            pairs: reports,
        };
        for pair in &report.pairs {
            match pair.state {
                PairState::Skipped => report.skipped += 1,
                _ => report.processed += 1,
            }
            report.totals.merge(&pair.totals());
        }

        crate::info!(
            "batch.completed processed={} skipped={} attempted={} succeeded={} failed={} cancelled={} duration_ms={} timestamp={}",
            report.processed,
            report.skipped,
            report.totals.attempted,
            report.totals.succeeded,
            report.totals.failed,
            report.cancelled,
            (Utc::now() - batch_start_time).num_milliseconds(),
            Utc::now().to_rfc3339()
        );

        report
    }

    async fn run_one(
        &self,
        controller: &MigrationController,
        index: usize,
        pair: MigrationPair,
        dry_run: bool,
    ) -> PairReport {
        let position = u32::try_from(index).unwrap_or(u32::MAX);

        let skip_reason = if index >= MAX_BATCH_PAIRS {
            Some(format!("batch limit of {MAX_BATCH_PAIRS} pairs reached"))
        } else if let Some(reason) = pair.rejection() {
            Some(reason.to_string())
        } else if self.cancellation.is_cancelled() {
            Some("cancelled".to_string())
        } else {
            None
        };

        let report = if let Some(reason) = skip_reason {
            crate::info!(
                "pair.skipped index={} source={} target={} reason=\"{}\"",
                position,
                pair.source,
                pair.target,
                reason
            );
            PairReport::skipped(position, pair, reason)
        } else {
            if let Some(listener) = &self.listener {
                listener.on_pair_started(position, pair.clone());
            }
            with_task_context(async {
                let _handover_logger_ctx = LogContext::new(&pair.label());
                controller.run_pair(position, pair.clone(), dry_run).await
            })
            .await
        };

        if let Some(listener) = &self.listener {
            listener.on_pair_finished(report.clone());
        }
        report
    }
}
