use std::marker::PhantomData;

use reqwest::Url;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::{JiraClient, RemoteError};

/// How the offset of the next page is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuation {
    /// `next = offset + page_size`, while `next < total`
    OffsetPlusLimit,
    /// `next = offset + items returned`, while `next < total`
    ItemsSeen,
}

/// Where the offset and page size go in a request.
#[derive(Debug, Clone)]
pub enum PageParams {
    /// As query parameters of a GET request
    Query {
        /// Name of the offset parameter
        offset: &'static str,
        /// Name of the page size parameter
        limit: &'static str,
    },
    /// As members of the JSON body of a POST request
    JsonBody {
        /// Body sent with every page; offset and limit are merged into it
        body: Value,
        /// Name of the offset member
        offset: &'static str,
        /// Name of the page size member
        limit: &'static str,
    },
}

/// Description of a paginated listing endpoint.
#[derive(Debug, Clone)]
pub struct ListingEndpoint {
    /// URL of the listing, including any fixed query parameters
    pub url: Url,
    /// Placement of offset and page size
    pub params: PageParams,
    /// Response member holding the items
    pub items_field: &'static str,
    /// Response member holding the total number of matches
    pub total_field: &'static str,
    /// Continuation rule
    pub continuation: Continuation,
}

/// One page of a listing.
#[derive(Debug)]
pub struct Page<T> {
    /// Items of the page, in server order
    pub items: Vec<T>,
    /// Offset the next page will be requested at, or `None` on the last page
    pub next_offset: Option<u32>,
}

/// Walks a listing endpoint page by page.
///
/// Only one page is held at a time. A failed page request ends the walk with an error;
/// callers decide whether what they saw so far is usable.
///
/// Callers that mutate items so that they drop out of the listing's match set report that
/// with [`Paginator::retire`], which shifts the next offset back so no match is skipped.
pub struct Paginator<'a, T> {
    client: &'a JiraClient,
    endpoint: ListingEndpoint,
    page_size: u32,
    next_offset: Option<u32>,
    _items: PhantomData<T>,
}

impl<'a, T: DeserializeOwned> Paginator<'a, T> {
    /// Starts a walk at offset 0.
    #[must_use]
    pub fn new(client: &'a JiraClient, endpoint: ListingEndpoint, page_size: u32) -> Self {
        Self {
            client,
            endpoint,
            page_size: page_size.max(1),
            next_offset: Some(0),
            _items: PhantomData,
        }
    }

    /// Fetches the next page, or `None` once the listing is exhausted.
    ///
    /// # Errors
    /// - `RemoteError` if the page request fails or the response has an unexpected shape.
    pub async fn next_page(&mut self) -> Result<Option<Page<T>>, RemoteError> {
        let Some(offset) = self.next_offset else {
            return Ok(None);
        };

        let response = self.request(offset).await?;
        let (items, total) = self.extract(response)?;

        let advanced = match self.endpoint.continuation {
            Continuation::OffsetPlusLimit => offset.saturating_add(self.page_size),
            Continuation::ItemsSeen => {
                offset.saturating_add(u32::try_from(items.len()).unwrap_or(u32::MAX))
            }
        };
        // An empty page ends the walk even when the reported total says otherwise
        self.next_offset = (!items.is_empty() && u64::from(advanced) < total).then_some(advanced);

        crate::trace!(
            "pagination.page endpoint={} offset={offset} items={} total={total} next={:?}",
            self.endpoint.url.path(),
            items.len(),
            self.next_offset
        );

        Ok(Some(Page {
            items,
            next_offset: self.next_offset,
        }))
    }

    /// Records that `count` items of the pages seen so far no longer match the listing.
    pub fn retire(&mut self, count: u32) {
        self.next_offset = self.next_offset.map(|offset| offset.saturating_sub(count));
    }

    async fn request(&self, offset: u32) -> Result<Value, RemoteError> {
        match &self.endpoint.params {
            PageParams::Query {
                offset: offset_name,
                limit: limit_name,
            } => {
                let mut url = self.endpoint.url.clone();
                url.query_pairs_mut()
                    .append_pair(offset_name, &offset.to_string())
                    .append_pair(limit_name, &self.page_size.to_string());
                self.client.get_json(&url).await
            }
            PageParams::JsonBody {
                body,
                offset: offset_name,
                limit: limit_name,
            } => {
                let mut body = body.clone();
                if let Value::Object(members) = &mut body {
                    members.insert((*offset_name).to_string(), Value::from(offset));
                    members.insert((*limit_name).to_string(), Value::from(self.page_size));
                }
                self.client.post_json(&self.endpoint.url, &body).await
            }
        }
    }

    fn extract(&self, mut response: Value) -> Result<(Vec<T>, u64), RemoteError> {
        let decode_error = |message: String| RemoteError::Decode {
            endpoint: self.endpoint.url.path().to_string(),
            message,
        };

        // A missing total means there is nothing beyond this page
        let total = response
            .get(self.endpoint.total_field)
            .and_then(Value::as_u64)
            .unwrap_or(0);
        let items = match response.get_mut(self.endpoint.items_field).map(Value::take) {
            Some(Value::Array(items)) => items,
            Some(Value::Null) | None => Vec::new(),
            Some(_) => {
                return Err(decode_error(format!(
                    "`{}` is not an array",
                    self.endpoint.items_field
                )))
            }
        };

        let items = items
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<T>, _>>()
            .map_err(|e| decode_error(e.to_string()))?;

        Ok((items, total))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::remote::model::{GroupEntry, IssueRecord};
    use crate::test_utils::{FakeIssue, InMemoryJira};
    use crate::RetryPolicy;
    use serde_json::json;

    fn client(jira: &Arc<InMemoryJira>) -> JiraClient {
        JiraClient::new(jira.clone(), jira.base_url(), RetryPolicy::none()).unwrap()
    }

    fn group_listing(client: &JiraClient, user: &str) -> ListingEndpoint {
        ListingEndpoint {
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
        }
    }

    fn issue_search(client: &JiraClient, jql: &str) -> ListingEndpoint {
        ListingEndpoint {
            url: client.endpoint(&["rest", "api", "2", "search"]),
            params: PageParams::JsonBody {
                body: json!({"jql": jql, "fields": ["assignee"]}),
                offset: "startAt",
                limit: "maxResults",
            },
            items_field: "issues",
            total_field: "total",
            continuation: Continuation::ItemsSeen,
        }
    }

    #[tokio::test]
    async fn test_offset_plus_limit_walks_all_pages() {
        let jira = Arc::new(InMemoryJira::new());
        for i in 0..5 {
            jira.add_group_member(&format!("group-{i}"), "alice");
        }
        let client = client(&jira);

        let mut pages = Paginator::<GroupEntry>::new(&client, group_listing(&client, "alice"), 2);
        let mut names = Vec::new();
        let mut page_count = 0;
        while let Some(page) = pages.next_page().await.unwrap() {
            page_count += 1;
            names.extend(page.items.into_iter().map(|g| g.name));
        }

        assert_eq!(page_count, 3);
        assert_eq!(names.len(), 5);
        assert_eq!(names[4], "group-4");
    }

    #[tokio::test]
    async fn test_empty_listing_yields_single_empty_page() {
        let jira = Arc::new(InMemoryJira::new());
        let client = client(&jira);

        let listing = group_listing(&client, "nobody");
        let mut pages = Paginator::<GroupEntry>::new(&client, listing, 200);
        let page = pages.next_page().await.unwrap().unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.next_offset, None);
        assert!(pages.next_page().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_retire_shifts_offset_back() {
        let jira = Arc::new(InMemoryJira::new());
        for i in 0..5 {
            jira.add_issue(
                &format!("OPS-{i}"),
                FakeIssue {
                    assignee: Some("alice".to_string()),
                    ..FakeIssue::default()
                },
            );
        }
        let client = client(&jira);

        let mut pages = Paginator::<IssueRecord>::new(
            &client,
            issue_search(&client, "(assignee = \"alice\" OR reporter = \"alice\")"),
            2,
        );
        let first = pages.next_page().await.unwrap().unwrap();
        assert_eq!(first.next_offset, Some(2));

        pages.retire(2);
        let second = pages.next_page().await.unwrap().unwrap();
        // Nothing was mutated on the server, so the first page is returned again
        assert_eq!(second.items[0].key, first.items[0].key);
    }

    #[tokio::test]
    async fn test_failed_page_is_an_error() {
        let jira = Arc::new(InMemoryJira::new());
        jira.add_group_member("developers", "alice");
        jira.fail_requests(crate::HttpMethod::Get, "/rest/api/user/memberof", 500);
        let client = client(&jira);

        let mut pages = Paginator::<GroupEntry>::new(&client, group_listing(&client, "alice"), 200);
        let error = pages.next_page().await.unwrap_err();
        assert_eq!(error.status_code(), Some(500));
    }
}
