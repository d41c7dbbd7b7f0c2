use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::issue_search::IssueSearch;
use crate::migration::processor::{PairContext, ResourceMigrator};
use crate::migration::{
    MigrationError, MigrationResult, ResourceOutcome, ResourceType, ResultRecorder,
};
use crate::remote::jql;
use crate::remote::model::{IssueRecord, IssueUpdate, UserRef};

const USER_FIELDS: [&str; 2] = ["assignee", "reporter"];

/// Rewrites assignee and reporter from the source to the target.
///
/// Only the fields that currently hold the source are sent, so an issue assigned to the
/// source but reported by someone else keeps its reporter. Watchers are not notified.
pub struct IssueReassignmentMigrator {
    unresolved_only: bool,
}

impl IssueReassignmentMigrator {
    /// Creates the migrator.
    #[must_use]
    pub const fn new(unresolved_only: bool) -> Self {
        Self { unresolved_only }
    }
}

fn field_changes(issue: &IssueRecord, source: &str, target: &str) -> Map<String, Value> {
    USER_FIELDS
        .iter()
        .filter(|field| issue.user_field(field) == Some(source))
        .map(|field| ((*field).to_string(), json!(UserRef::new(target))))
        .collect()
}

#[async_trait]
impl ResourceMigrator for IssueReassignmentMigrator {
    fn resource_type(&self) -> ResourceType {
        ResourceType::IssueReassignment
    }

    async fn migrate(&self, ctx: &PairContext<'_>) -> Result<MigrationResult, MigrationError> {
        let mut recorder = ResultRecorder::new(ResourceType::IssueReassignment);
        let query = jql::assigned_or_reported_by(&ctx.pair.source, self.unresolved_only);
        let mut search = IssueSearch::new(ctx.client, &query, &USER_FIELDS);

        loop {
            let issues = match search.next_batch().await {
                Ok(Some(issues)) => issues,
                Ok(None) => break,
                Err(e) => {
                    crate::error!("issues.search_failed error=\"{e}\"");
                    return Ok(recorder.finish(ResourceOutcome::ListingAborted {
                        reason: e.to_string(),
                    }));
                }
            };

            let mut retired = 0_u32;
            for issue in issues {
                let changes = field_changes(&issue, &ctx.pair.source, &ctx.pair.target);
                if changes.is_empty() {
                    // Matched the query but the fields changed since
                    recorder.skipped(&issue.key, "no field references source");
                    continue;
                }
                if ctx.dry_run {
                    recorder.skipped(&issue.key, "dry-run");
                    continue;
                }

                let url = ctx.client.endpoint_with_query(
                    &["rest", "api", "2", "issue", &issue.key],
                    &[("notifyUsers", "false")],
                );
                match ctx.client.put(&url, Some(&IssueUpdate { fields: changes })).await {
                    Ok(()) => {
                        recorder.succeeded(&issue.key);
                        retired += 1;
                    }
                    Err(e) => recorder.failed(&issue.key, e.to_string()),
                }
            }
            search.retire(retired);
        }

        Ok(recorder.finish(ResourceOutcome::Completed))
    }
}
