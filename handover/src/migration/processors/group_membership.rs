use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::migration::processor::{PairContext, ResourceMigrator};
use crate::migration::{
    MigrationError, MigrationResult, ResourceOutcome, ResourceType, ResultRecorder,
};
use crate::remote::model::GroupEntry;
use crate::remote::{Continuation, JiraClient, ListingEndpoint, PageParams, Paginator, RemoteError};

const GROUP_PAGE_SIZE: u32 = 200;

/// Adds the target to every group the source belongs to.
///
/// Memberships of the source are not removed. The full group listing is read before the
/// first addition, so a listing failure leaves the target's memberships untouched.
pub struct GroupMembershipMigrator {
    excluded: BTreeSet<String>,
}

impl GroupMembershipMigrator {
    /// Creates the migrator. Excluded names are trimmed; blank entries are ignored.
    #[must_use]
    pub fn new(excluded_groups: &[String]) -> Self {
        Self {
            excluded: excluded_groups
                .iter()
                .map(|group| group.trim().to_string())
                .filter(|group| !group.is_empty())
                .collect(),
        }
    }

    async fn groups_of(client: &JiraClient, user: &str) -> Result<Vec<String>, RemoteError> {
        let endpoint = ListingEndpoint {
            url: client.endpoint_with_query(
                &["rest", "api", "user", "memberof"],
                &[("username", user)],
            ),
            params: PageParams::Query {
                offset: "start",
                limit: "limit",
            },
            items_field: "results",
            total_field: "size",
            continuation: Continuation::OffsetPlusLimit,
        };

        let mut pages = Paginator::<GroupEntry>::new(client, endpoint, GROUP_PAGE_SIZE);
        let mut groups = Vec::new();
        while let Some(page) = pages.next_page().await? {
            groups.extend(page.items.into_iter().map(|group| group.name));
        }
        Ok(groups)
    }
}

#[async_trait]
impl ResourceMigrator for GroupMembershipMigrator {
    fn resource_type(&self) -> ResourceType {
        ResourceType::GroupMembership
    }

    async fn migrate(&self, ctx: &PairContext<'_>) -> Result<MigrationResult, MigrationError> {
        let mut recorder = ResultRecorder::new(ResourceType::GroupMembership);

        let groups = match Self::groups_of(ctx.client, &ctx.pair.source).await {
            Ok(groups) => groups,
            Err(e) => {
                crate::error!("groups.listing_failed error=\"{e}\"");
                return Ok(recorder.finish(ResourceOutcome::ListingAborted {
                    reason: e.to_string(),
                }));
            }
        };
        crate::info!("groups.discovered count={}", groups.len());

        for group in groups {
            if self.excluded.contains(group.trim()) {
                recorder.skipped(&group, "excluded");
                continue;
            }
            if ctx.dry_run {
                recorder.skipped(&group, "dry-run");
                continue;
            }

            let url = ctx.client.endpoint(&[
                "rest",
                "api",
                "user",
                &ctx.pair.target,
                "group",
                &group,
            ]);
            match ctx.client.put::<()>(&url, None).await {
                Ok(()) => recorder.succeeded(&group),
                Err(e) if e.is_already_member() => recorder.succeeded(&group),
                Err(e) => recorder.failed(&group, e.to_string()),
            }
        }

        Ok(recorder.finish(ResourceOutcome::Completed))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::migration::MigrationPair;
    use crate::test_utils::InMemoryJira;
    use crate::{HttpMethod, RetryPolicy};

    fn setup() -> (Arc<InMemoryJira>, JiraClient) {
        let jira = Arc::new(InMemoryJira::new());
        let client = JiraClient::new(jira.clone(), jira.base_url(), RetryPolicy::none()).unwrap();
        (jira, client)
    }

    async fn run(
        migrator: &GroupMembershipMigrator,
        client: &JiraClient,
        dry_run: bool,
    ) -> MigrationResult {
        let pair = MigrationPair::new("alice", "bob");
        let ctx = PairContext {
            pair: &pair,
            dry_run,
            client,
        };
        migrator.migrate(&ctx).await.unwrap()
    }

    #[tokio::test]
    async fn test_adds_target_to_all_but_excluded() {
        let (jira, client) = setup();
        for group in ["developers", "jira-users", "testers"] {
            jira.add_group_member(group, "alice");
        }

        let migrator = GroupMembershipMigrator::new(&[" jira-users ".to_string()]);
        let result = run(&migrator, &client, false).await;

        assert_eq!(result.attempted, 2);
        assert_eq!(result.succeeded, 2);
        assert_eq!(result.skipped, 1);
        assert_eq!(result.skips[0].object_id, "jira-users");
        assert_eq!(jira.groups_of("bob"), vec!["developers", "testers"]);
        // The source keeps its memberships
        assert_eq!(jira.groups_of("alice").len(), 3);
    }

    #[tokio::test]
    async fn test_existing_membership_counts_as_success() {
        let (jira, client) = setup();
        jira.add_group_member("developers", "alice");
        jira.add_group_member("developers", "bob");

        let result = run(&GroupMembershipMigrator::new(&[]), &client, false).await;
        assert_eq!(result.succeeded, 1);
        assert_eq!(result.failed, 0);
        assert_eq!(jira.group_members("developers"), vec!["alice", "bob"]);
    }

    #[tokio::test]
    async fn test_listing_failure_mutates_nothing() {
        let (jira, client) = setup();
        for i in 0..250 {
            jira.add_group_member(&format!("group-{i:03}"), "alice");
        }
        // First page succeeds, second page fails
        jira.fail_requests(HttpMethod::Get, "start=200", 503);

        let result = run(&GroupMembershipMigrator::new(&[]), &client, false).await;
        assert!(matches!(result.outcome, ResourceOutcome::ListingAborted { .. }));
        assert_eq!(result.attempted, 0);
        assert_eq!(jira.mutation_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_addition_is_recorded() {
        let (jira, client) = setup();
        jira.add_group_member("developers", "alice");
        jira.add_group_member("admins", "alice");
        jira.fail_requests(HttpMethod::Put, "/group/admins", 403);

        let result = run(&GroupMembershipMigrator::new(&[]), &client, false).await;
        assert_eq!(result.attempted, 2);
        assert_eq!(result.succeeded, 1);
        assert_eq!(result.failed, 1);
        assert_eq!(result.failures[0].object_id, "admins");
        assert_eq!(result.outcome, ResourceOutcome::Completed);
    }

    #[tokio::test]
    async fn test_dry_run_lists_without_mutating() {
        let (jira, client) = setup();
        jira.add_group_member("developers", "alice");

        let result = run(&GroupMembershipMigrator::new(&[]), &client, true).await;
        assert_eq!(result.attempted, 0);
        assert_eq!(result.skips[0].reason, "dry-run");
        assert_eq!(jira.mutation_count(), 0);
    }
}
