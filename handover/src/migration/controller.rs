use std::sync::Arc;

use chrono::Utc;

use super::processor::{PairContext, ResourceMigrator};
use super::{MigrationPair, MigrationResult, PairReport, PairState};
use crate::primitives::logger::LogContext;
use crate::remote::JiraClient;

/// Runs the enabled migrators for one pair, in the fixed resource order.
///
/// A migrator that returns an error is reported as crashed and the remaining migrators
/// still run. The controller never stops a pair early.
pub struct MigrationController {
    client: Arc<JiraClient>,
    migrators: Vec<Arc<dyn ResourceMigrator>>,
}

impl MigrationController {
    /// Creates a controller. Migrators are sorted into execution order.
    #[must_use]
    pub fn new(client: Arc<JiraClient>, mut migrators: Vec<Arc<dyn ResourceMigrator>>) -> Self {
        migrators.sort_by_key(|migrator| migrator.resource_type());
        Self { client, migrators }
    }

    /// Number of resource types this controller runs per pair.
    #[must_use]
    pub fn migrator_count(&self) -> usize {
        self.migrators.len()
    }

    /// Migrates one pair.
    ///
    /// The pair must already have passed validation; the batch runner reports rejected
    /// pairs as skipped without calling this.
    pub async fn run_pair(&self, index: u32, pair: MigrationPair, dry_run: bool) -> PairReport {
        let pair_start_time = Utc::now();
        let mut report = PairReport {
            index,
            pair,
            state: PairState::Pending,
            skip_reason: None,
            results: Vec::with_capacity(self.migrators.len()),
        };

        report.state = PairState::Running;
        crate::info!(
            "pair.started index={} source={} target={} dry_run={} resource_types={} timestamp={}",
            index,
            report.pair.source,
            report.pair.target,
            dry_run,
            self.migrators.len(),
            pair_start_time.to_rfc3339()
        );

        let ctx = PairContext {
            pair: &report.pair,
            dry_run,
            client: &self.client,
        };
        let mut results = Vec::with_capacity(self.migrators.len());
        for migrator in &self.migrators {
            results.push(run_migrator(migrator.as_ref(), &ctx).await);
        }
        report.results = results;
        report.state = PairState::Completed;

        let totals = report.totals();
        crate::info!(
            "pair.completed index={} attempted={} succeeded={} skipped={} failed={} duration_ms={} timestamp={}",
            index,
            totals.attempted,
            totals.succeeded,
            totals.skipped,
            totals.failed,
            (Utc::now() - pair_start_time).num_milliseconds(),
            Utc::now().to_rfc3339()
        );

        report
    }
}

async fn run_migrator(migrator: &dyn ResourceMigrator, ctx: &PairContext<'_>) -> MigrationResult {
    let resource_type = migrator.resource_type();
    let _handover_logger_ctx = LogContext::new(resource_type.as_str());
    let start_time = Utc::now();

    let result = match migrator.migrate(ctx).await {
        Ok(result) => result,
        Err(e) => {
            crate::error!(
                "resource.crashed type={} error={:?} timestamp={}",
                resource_type.as_str(),
                e,
                Utc::now().to_rfc3339()
            );
            MigrationResult::crashed(resource_type, e.to_string())
        }
    };

    crate::info!(
        "resource.completed type={} outcome={} attempted={} succeeded={} skipped={} failed={} duration_ms={} timestamp={}",
        resource_type.as_str(),
        result.outcome.as_str(),
        result.attempted,
        result.succeeded,
        result.skipped,
        result.failed,
        (Utc::now() - start_time).num_milliseconds(),
        Utc::now().to_rfc3339()
    );

    result
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::migration::{MigrationError, ResourceOutcome, ResourceType, ResultRecorder};
    use crate::test_utils::InMemoryJira;
    use crate::RetryPolicy;

    struct RecordingMigrator {
        resource_type: ResourceType,
        calls: Arc<std::sync::Mutex<Vec<ResourceType>>>,
        fail: bool,
    }

    #[async_trait]
    impl ResourceMigrator for RecordingMigrator {
        fn resource_type(&self) -> ResourceType {
            self.resource_type
        }

        async fn migrate(&self, ctx: &PairContext<'_>) -> Result<MigrationResult, MigrationError> {
            self.calls.lock().unwrap().push(self.resource_type);
            if self.fail {
                return Err(MigrationError::InvalidOperation("boom".to_string()));
            }
            let mut recorder = ResultRecorder::new(self.resource_type);
            if ctx.dry_run {
                recorder.skipped("object", "dry-run");
            } else {
                recorder.succeeded("object");
            }
            Ok(recorder.finish(ResourceOutcome::Completed))
        }
    }

    struct CountingMigrator(AtomicUsize);

    #[async_trait]
    impl ResourceMigrator for CountingMigrator {
        fn resource_type(&self) -> ResourceType {
            ResourceType::GroupMembership
        }

        async fn migrate(&self, _ctx: &PairContext<'_>) -> Result<MigrationResult, MigrationError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            let recorder = ResultRecorder::new(ResourceType::GroupMembership);
            Ok(recorder.finish(ResourceOutcome::Completed))
        }
    }

    fn client() -> Arc<JiraClient> {
        let jira = Arc::new(InMemoryJira::new());
        Arc::new(JiraClient::new(jira.clone(), jira.base_url(), RetryPolicy::none()).unwrap())
    }

    #[tokio::test]
    async fn test_runs_in_resource_order_and_isolates_crashes() {
        let calls = Arc::new(std::sync::Mutex::new(Vec::new()));
        let migrator = |resource_type, fail| -> Arc<dyn ResourceMigrator> {
            Arc::new(RecordingMigrator {
                resource_type,
                calls: calls.clone(),
                fail,
            })
        };

        let controller = MigrationController::new(
            client(),
            vec![
                migrator(ResourceType::MultiPicker, false),
                migrator(ResourceType::RoleMembership, true),
                migrator(ResourceType::GroupMembership, false),
            ],
        );
        let report = controller
            .run_pair(3, MigrationPair::new("alice", "bob"), false)
            .await;

        assert_eq!(
            *calls.lock().unwrap(),
            vec![
                ResourceType::GroupMembership,
                ResourceType::RoleMembership,
                ResourceType::MultiPicker
            ]
        );
        assert_eq!(report.index, 3);
        assert_eq!(report.state, PairState::Completed);
        assert_eq!(report.results.len(), 3);

        let roles = report.result(ResourceType::RoleMembership).unwrap();
        assert!(matches!(roles.outcome, ResourceOutcome::Crashed { .. }));
        assert_eq!(roles.failed, 1);

        let pickers = report.result(ResourceType::MultiPicker).unwrap();
        assert_eq!(pickers.succeeded, 1);
    }

    #[tokio::test]
    async fn test_dry_run_is_passed_to_migrators() {
        let calls = Arc::new(std::sync::Mutex::new(Vec::new()));
        let controller = MigrationController::new(
            client(),
            vec![Arc::new(RecordingMigrator {
                resource_type: ResourceType::IssueReassignment,
                calls,
                fail: false,
            })],
        );

        let report = controller
            .run_pair(0, MigrationPair::new("alice", "bob"), true)
            .await;
        let totals = report.totals();
        assert_eq!(totals.attempted, 0);
        assert_eq!(totals.skipped, 1);
    }

    #[tokio::test]
    async fn test_each_pair_runs_every_migrator_once() {
        let counter = Arc::new(CountingMigrator(AtomicUsize::new(0)));
        let controller = MigrationController::new(client(), vec![counter.clone()]);
        assert_eq!(controller.migrator_count(), 1);

        controller
            .run_pair(0, MigrationPair::new("alice", "bob"), false)
            .await;
        controller
            .run_pair(1, MigrationPair::new("carol", "dave"), false)
            .await;
        assert_eq!(counter.0.load(Ordering::SeqCst), 2);
    }
}
