use serde::{Deserialize, Serialize};

use super::options::MigrationPair;

/// The kinds of footprint a pair migration moves.
///
/// Declaration order is execution order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, uniffi::Enum,
)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    /// Group memberships
    GroupMembership,
    /// Saved-filter ownership
    FilterOwnership,
    /// Issue assignee and reporter
    IssueReassignment,
    /// Project-role memberships
    RoleMembership,
    /// Single-user picker custom fields
    SinglePicker,
    /// Multi-user picker custom fields
    MultiPicker,
}

impl ResourceType {
    /// All resource types in execution order.
    pub const ALL: [Self; 6] = [
        Self::GroupMembership,
        Self::FilterOwnership,
        Self::IssueReassignment,
        Self::RoleMembership,
        Self::SinglePicker,
        Self::MultiPicker,
    ];

    /// Short name used in logs and reports.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::GroupMembership => "groups",
            Self::FilterOwnership => "filters",
            Self::IssueReassignment => "issues",
            Self::RoleMembership => "roles",
            Self::SinglePicker => "single_picker",
            Self::MultiPicker => "multi_picker",
        }
    }
}

/// How a migrator ended for one pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, uniffi::Enum)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourceOutcome {
    /// Discovery ran to the end
    Completed,
    /// A listing request failed; objects handled before that are still reported
    ListingAborted {
        /// The listing failure
        reason: String,
    },
    /// A required input was missing or unreadable; nothing was attempted
    NotConfigured {
        /// What is missing
        reason: String,
    },
    /// The migrator failed unexpectedly; counted as one failure
    Crashed {
        /// The unexpected error
        reason: String,
    },
}

impl ResourceOutcome {
    /// Short name used in logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::ListingAborted { .. } => "listing_aborted",
            Self::NotConfigured { .. } => "not_configured",
            Self::Crashed { .. } => "crashed",
        }
    }
}

/// An object that was skipped or failed, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, uniffi::Record)]
pub struct ObjectRecord {
    /// Group name, filter id, issue key, `project/role` or `issue:field`
    pub object_id: String,
    /// Why it was skipped or how it failed
    pub reason: String,
}

/// Result of one resource type for one pair.
///
/// `attempted` counts the mutations issued, so `attempted == succeeded + failed` always
/// holds. Skipped objects (excluded, dry-run, stale match) are not attempted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, uniffi::Record)]
pub struct MigrationResult {
    /// Resource type
    pub resource_type: ResourceType,
    /// How the migrator ended
    pub outcome: ResourceOutcome,
    /// Mutations issued
    pub attempted: u32,
    /// Mutations accepted, including "already a member" answers
    pub succeeded: u32,
    /// Objects discovered but intentionally not mutated
    pub skipped: u32,
    /// Mutations rejected or failed
    pub failed: u32,
    /// One record per failed object
    pub failures: Vec<ObjectRecord>,
    /// One record per skipped object
    pub skips: Vec<ObjectRecord>,
}

impl MigrationResult {
    /// A result for a resource type whose inputs were unusable.
    #[must_use]
    pub fn not_configured(resource_type: ResourceType, reason: impl Into<String>) -> Self {
        ResultRecorder::new(resource_type).finish(ResourceOutcome::NotConfigured {
            reason: reason.into(),
        })
    }

    /// A result for a migrator that failed with an unexpected error.
    #[must_use]
    pub fn crashed(resource_type: ResourceType, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        let mut recorder = ResultRecorder::new(resource_type);
        recorder.failed(resource_type.as_str(), reason.clone());
        recorder.finish(ResourceOutcome::Crashed { reason })
    }

    /// No failures and discovery completed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.outcome == ResourceOutcome::Completed
    }
}

/// Accumulates per-object results while a migrator runs.
#[derive(Debug)]
pub struct ResultRecorder {
    resource_type: ResourceType,
    succeeded: u32,
    failures: Vec<ObjectRecord>,
    skips: Vec<ObjectRecord>,
}

impl ResultRecorder {
    /// An empty recorder.
    #[must_use]
    pub const fn new(resource_type: ResourceType) -> Self {
        Self {
            resource_type,
            succeeded: 0,
            failures: Vec::new(),
            skips: Vec::new(),
        }
    }

    /// A mutation of `object_id` was accepted.
    pub fn succeeded(&mut self, object_id: &str) {
        self.succeeded = self.succeeded.saturating_add(1);
        crate::debug!(
            "object.migrated type={} object={object_id}",
            self.resource_type.as_str()
        );
    }

    /// `object_id` was discovered but not mutated.
    pub fn skipped(&mut self, object_id: &str, reason: impl Into<String>) {
        let reason = reason.into();
        crate::debug!(
            "object.skipped type={} object={object_id} reason=\"{reason}\"",
            self.resource_type.as_str()
        );
        self.skips.push(ObjectRecord {
            object_id: object_id.to_string(),
            reason,
        });
    }

    /// A mutation of `object_id` failed.
    pub fn failed(&mut self, object_id: &str, reason: impl Into<String>) {
        let reason = reason.into();
        crate::warn!(
            "object.failed type={} object={object_id} reason=\"{reason}\"",
            self.resource_type.as_str()
        );
        self.failures.push(ObjectRecord {
            object_id: object_id.to_string(),
            reason,
        });
    }

    /// Builds the final result.
    #[must_use]
    pub fn finish(self, outcome: ResourceOutcome) -> MigrationResult {
        let failed = count(&self.failures);
        MigrationResult {
            resource_type: self.resource_type,
            outcome,
            attempted: self.succeeded.saturating_add(failed),
            succeeded: self.succeeded,
            skipped: count(&self.skips),
            failed,
            failures: self.failures,
            skips: self.skips,
        }
    }
}

fn count(records: &[ObjectRecord]) -> u32 {
    u32::try_from(records.len()).unwrap_or(u32::MAX)
}

/// Lifecycle of a pair within a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, uniffi::Enum)]
#[serde(rename_all = "snake_case")]
pub enum PairState {
    /// Waiting to start
    Pending,
    /// Migrators are running
    Running,
    /// Every enabled migrator produced a result
    Completed,
    /// Not migrated: malformed, self-migration, over the batch cap or cancelled
    Skipped,
}

/// Counters summed over results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, uniffi::Record)]
pub struct ResultCounts {
    /// Mutations issued
    pub attempted: u32,
    /// Mutations accepted
    pub succeeded: u32,
    /// Objects skipped
    pub skipped: u32,
    /// Mutations failed
    pub failed: u32,
}

impl ResultCounts {
    /// Adds the counters of `result`.
    pub const fn add(&mut self, result: &MigrationResult) {
        self.attempted = self.attempted.saturating_add(result.attempted);
        self.succeeded = self.succeeded.saturating_add(result.succeeded);
        self.skipped = self.skipped.saturating_add(result.skipped);
        self.failed = self.failed.saturating_add(result.failed);
    }

    /// Adds another set of counters.
    pub const fn merge(&mut self, other: &Self) {
        self.attempted = self.attempted.saturating_add(other.attempted);
        self.succeeded = self.succeeded.saturating_add(other.succeeded);
        self.skipped = self.skipped.saturating_add(other.skipped);
        self.failed = self.failed.saturating_add(other.failed);
    }
}

/// Everything that happened to one pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, uniffi::Record)]
pub struct PairReport {
    /// Position of the pair in the batch input
    pub index: u32,
    /// The pair
    pub pair: MigrationPair,
    /// Final state
    pub state: PairState,
    /// Why the pair was skipped, for [`PairState::Skipped`]
    pub skip_reason: Option<String>,
    /// One result per enabled resource type, in execution order
    pub results: Vec<MigrationResult>,
}

impl PairReport {
    /// A report for a pair that will not run.
    #[must_use]
    pub fn skipped(index: u32, pair: MigrationPair, reason: impl Into<String>) -> Self {
        Self {
            index,
            pair,
            state: PairState::Skipped,
            skip_reason: Some(reason.into()),
            results: Vec::new(),
        }
    }

    /// Counters summed over all resource types.
    #[must_use]
    pub fn totals(&self) -> ResultCounts {
        let mut totals = ResultCounts::default();
        for result in &self.results {
            totals.add(result);
        }
        totals
    }

    /// The result for `resource_type`, if it ran.
    #[must_use]
    pub fn result(&self, resource_type: ResourceType) -> Option<&MigrationResult> {
        self.results
            .iter()
            .find(|result| result.resource_type == resource_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorder_keeps_attempted_consistent() {
        let mut recorder = ResultRecorder::new(ResourceType::GroupMembership);
        recorder.succeeded("developers");
        recorder.succeeded("testers");
        recorder.failed("admins", "403 forbidden");
        recorder.skipped("jira-users", "excluded");

        let result = recorder.finish(ResourceOutcome::Completed);
        assert_eq!(result.attempted, 3);
        assert_eq!(result.succeeded, 2);
        assert_eq!(result.failed, 1);
        assert_eq!(result.skipped, 1);
        assert_eq!(result.failures[0].object_id, "admins");
        assert_eq!(result.skips[0].reason, "excluded");
        assert!(!result.is_clean());
    }

    #[test]
    fn test_crashed_counts_one_failure() {
        let result = MigrationResult::crashed(ResourceType::RoleMembership, "boom");
        assert_eq!(result.failed, 1);
        assert_eq!(result.attempted, 1);
        assert_eq!(
            result.outcome,
            ResourceOutcome::Crashed {
                reason: "boom".to_string()
            }
        );
    }

    #[test]
    fn test_not_configured_attempts_nothing() {
        let result = MigrationResult::not_configured(ResourceType::FilterOwnership, "missing");
        assert_eq!(result.attempted, 0);
        assert_eq!(result.outcome.as_str(), "not_configured");
    }

    #[test]
    fn test_outcome_serializes_tagged() {
        let json = serde_json::to_value(ResourceOutcome::ListingAborted {
            reason: "503".to_string(),
        })
        .unwrap();
        assert_eq!(json["kind"], "listing_aborted");
        assert_eq!(json["reason"], "503");
    }

    #[test]
    fn test_pair_totals() {
        let mut groups = ResultRecorder::new(ResourceType::GroupMembership);
        groups.succeeded("developers");
        let mut issues = ResultRecorder::new(ResourceType::IssueReassignment);
        issues.skipped("OPS-1", "dry-run");
        issues.failed("OPS-2", "400");

        let report = PairReport {
            index: 0,
            pair: MigrationPair::new("alice", "bob"),
            state: PairState::Completed,
            skip_reason: None,
            results: vec![
                groups.finish(ResourceOutcome::Completed),
                issues.finish(ResourceOutcome::Completed),
            ],
        };
        let totals = report.totals();
        assert_eq!(totals.attempted, 2);
        assert_eq!(totals.skipped, 1);
        assert!(report.result(ResourceType::IssueReassignment).is_some());
        assert!(report.result(ResourceType::RoleMembership).is_none());
    }
}
