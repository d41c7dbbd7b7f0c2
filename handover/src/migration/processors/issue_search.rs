use std::collections::HashSet;

use serde_json::json;

use crate::remote::model::{IssueRecord, SearchRequest};
use crate::remote::{Continuation, JiraClient, ListingEndpoint, PageParams, Paginator, RemoteError};

const SEARCH_PAGE_SIZE: u32 = 100;

/// Issue search that tolerates the match set shrinking while it is walked.
///
/// Updated issues stop matching the query, so callers report them with
/// [`IssueSearch::retire`]. Issues already returned are filtered out of later pages, and a
/// page holding nothing new ends the search.
pub(super) struct IssueSearch<'a> {
    pages: Paginator<'a, IssueRecord>,
    seen: HashSet<String>,
}

impl<'a> IssueSearch<'a> {
    pub(super) fn new(client: &'a JiraClient, jql: &str, fields: &[&str]) -> Self {
        let request = SearchRequest {
            jql: jql.to_string(),
            start_at: 0,
            max_results: SEARCH_PAGE_SIZE,
            fields: fields.iter().map(|field| (*field).to_string()).collect(),
        };
        let endpoint = ListingEndpoint {
            url: client.endpoint(&["rest", "api", "2", "search"]),
            params: PageParams::JsonBody {
                body: json!(request),
                offset: "startAt",
                limit: "maxResults",
            },
            items_field: "issues",
            total_field: "total",
            continuation: Continuation::ItemsSeen,
        };
        Self {
            pages: Paginator::new(client, endpoint, SEARCH_PAGE_SIZE),
            seen: HashSet::new(),
        }
    }

    /// The next batch of issues not returned before, or `None` when the search is done.
    pub(super) async fn next_batch(&mut self) -> Result<Option<Vec<IssueRecord>>, RemoteError> {
        let Some(page) = self.pages.next_page().await? else {
            return Ok(None);
        };
        if page.items.is_empty() {
            return Ok(None);
        }

        let fresh: Vec<IssueRecord> = page
            .items
            .into_iter()
            .filter(|issue| self.seen.insert(issue.key.clone()))
            .collect();
        if fresh.is_empty() {
            crate::debug!("search.no_new_issues seen={}", self.seen.len());
            return Ok(None);
        }
        Ok(Some(fresh))
    }

    pub(super) fn retire(&mut self, count: u32) {
        self.pages.retire(count);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::remote::jql;
    use crate::test_utils::{FakeIssue, InMemoryJira};
    use crate::RetryPolicy;

    #[tokio::test]
    async fn test_search_body_carries_query_and_fields() {
        let jira = Arc::new(InMemoryJira::new());
        let assigned = FakeIssue {
            assignee: Some("alice".to_string()),
            ..FakeIssue::default()
        };
        jira.add_issue("OPS-1", assigned);
        let client = JiraClient::new(jira.clone(), jira.base_url(), RetryPolicy::none()).unwrap();
        let query = jql::assigned_or_reported_by("alice", false);

        let mut search = IssueSearch::new(&client, &query, &["assignee", "reporter"]);
        let issues = search.next_batch().await.unwrap().unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].key, "OPS-1");
        // OPS-1 was not updated, so it is never returned twice
        assert!(search.next_batch().await.unwrap().is_none());

        let body = jira.requests()[0].body.clone().unwrap();
        assert_eq!(body["jql"], query);
        assert_eq!(body["startAt"], 0);
        assert_eq!(body["maxResults"], 100);
        assert_eq!(body["fields"], json!(["assignee", "reporter"]));
    }
}
