//! An in-memory issue tracker that answers the REST calls the migrators make.
//!
//! Used by unit and integration tests, and handy for demos of the FFI surface without a
//! server. It understands exactly the query shapes built by [`crate::remote::jql`].

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use percent_encoding::percent_decode_str;
use reqwest::Url;
use serde_json::{json, Map, Value};

use crate::primitives::{HttpError, HttpMethod, HttpRequest, HttpResponse, JiraHttpClient};

/// Base URL the fake answers on.
pub const FAKE_BASE_URL: &str = "https://jira.test";

const UNRESOLVED_CLAUSE: &str = " AND resolution = Unresolved";
const ORDER_CLAUSE: &str = " ORDER BY key ASC";
const DEFAULT_LIMIT: usize = 50;

/// An issue stored by [`InMemoryJira`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FakeIssue {
    /// Assignee username
    pub assignee: Option<String>,
    /// Reporter username
    pub reporter: Option<String>,
    /// Whether the issue has a resolution
    pub resolved: bool,
    /// Custom field values as they appear on the wire
    pub custom_fields: BTreeMap<String, Value>,
}

/// A request received by [`InMemoryJira`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    /// HTTP method
    pub method: HttpMethod,
    /// Path, still percent-encoded
    pub path: String,
    /// Decoded query parameters
    pub query: Vec<(String, String)>,
    /// Parsed JSON body
    pub body: Option<Value>,
}

impl RecordedRequest {
    /// Whether the request changes server state. Searches are POSTs but read-only.
    #[must_use]
    pub fn is_mutation(&self) -> bool {
        let is_search = self.method == HttpMethod::Post && self.path.ends_with("/search");
        self.method.is_mutating() && !is_search
    }
}

#[derive(Debug)]
struct InjectedFailure {
    method: HttpMethod,
    fragment: String,
    status: u16,
    remaining: Option<u32>,
}

#[derive(Debug, Default)]
struct JiraState {
    groups: BTreeMap<String, BTreeSet<String>>,
    filters: BTreeMap<String, Value>,
    issues: BTreeMap<String, FakeIssue>,
    fields: Vec<Value>,
    roles: BTreeMap<String, BTreeSet<String>>,
    stale_matches: BTreeSet<String>,
    requests: Vec<RecordedRequest>,
    failures: Vec<InjectedFailure>,
}

type Answer = Result<(u16, Value), (u16, String)>;

/// In-memory issue tracker implementing [`JiraHttpClient`].
#[derive(Debug)]
pub struct InMemoryJira {
    state: Mutex<JiraState>,
}

impl Default for InMemoryJira {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryJira {
    /// An empty server with the system fields in its field catalog.
    #[must_use]
    pub fn new() -> Self {
        let state = JiraState {
            fields: vec![
                system_field("summary", "Summary", "string"),
                system_field("assignee", "Assignee", "user"),
                system_field("reporter", "Reporter", "user"),
            ],
            ..JiraState::default()
        };
        Self {
            state: Mutex::new(state),
        }
    }

    /// The base URL to configure clients with.
    #[must_use]
    pub const fn base_url(&self) -> &'static str {
        FAKE_BASE_URL
    }

    fn state(&self) -> MutexGuard<'_, JiraState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds `user` to `group`, creating the group if needed.
    pub fn add_group_member(&self, group: &str, user: &str) {
        self.state()
            .groups
            .entry(group.to_string())
            .or_default()
            .insert(user.to_string());
    }

    /// Members of `group`, sorted.
    #[must_use]
    pub fn group_members(&self, group: &str) -> Vec<String> {
        self.state()
            .groups
            .get(group)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Groups `user` belongs to, sorted.
    #[must_use]
    pub fn groups_of(&self, user: &str) -> Vec<String> {
        self.state()
            .groups
            .iter()
            .filter(|(_, members)| members.contains(user))
            .map(|(group, _)| group.clone())
            .collect()
    }

    /// Stores a saved filter owned by `owner`.
    pub fn add_filter(&self, id: &str, owner: &str) {
        self.state().filters.insert(
            id.to_string(),
            json!({
                "id": id,
                "name": format!("Filter {id}"),
                "jql": "project = OPS",
                "owner": {"name": owner},
                "sharePermissions": [{"type": "group", "group": {"name": "jira-users"}}],
            }),
        );
    }

    /// A stored filter.
    #[must_use]
    pub fn filter(&self, id: &str) -> Option<Value> {
        self.state().filters.get(id).cloned()
    }

    /// Owner of a stored filter.
    #[must_use]
    pub fn filter_owner(&self, id: &str) -> Option<String> {
        self.filter(id)
            .and_then(|filter| filter["owner"]["name"].as_str().map(str::to_string))
    }

    /// Stores or replaces an issue.
    pub fn add_issue(&self, key: &str, issue: FakeIssue) {
        self.state().issues.insert(key.to_string(), issue);
    }

    /// Makes every search return `key`, whatever its current field values, the way a
    /// search index that has not caught up with an edit does.
    pub fn add_stale_match(&self, key: &str) {
        self.state().stale_matches.insert(key.to_string());
    }

    /// A stored issue.
    #[must_use]
    pub fn issue(&self, key: &str) -> Option<FakeIssue> {
        self.state().issues.get(key).cloned()
    }

    /// Adds a custom field to the field catalog.
    pub fn add_custom_field(&self, id: &str, name: &str, custom_type: &str) {
        self.state().fields.push(json!({
            "id": id,
            "name": name,
            "custom": true,
            "schema": {"type": "user", "custom": custom_type},
        }));
    }

    /// Creates a project role and returns its REST URL.
    pub fn add_role(&self, project_key: &str, role_id: u32, members: &[&str]) -> String {
        let path = format!("/rest/api/2/project/{project_key}/role/{role_id}");
        self.state().roles.insert(
            path.clone(),
            members.iter().map(|member| (*member).to_string()).collect(),
        );
        format!("{FAKE_BASE_URL}{path}")
    }

    /// Members of the role at `role_url`, sorted.
    #[must_use]
    pub fn role_members(&self, role_url: &str) -> Vec<String> {
        let Ok(url) = Url::parse(role_url) else {
            return Vec::new();
        };
        self.state()
            .roles
            .get(url.path())
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Answers every matching request with `status`. `fragment` is matched against the
    /// path and query string as sent.
    pub fn fail_requests(&self, method: HttpMethod, fragment: &str, status: u16) {
        self.state().failures.push(InjectedFailure {
            method,
            fragment: fragment.to_string(),
            status,
            remaining: None,
        });
    }

    /// Answers the next `times` matching requests with `status`.
    pub fn fail_next(&self, method: HttpMethod, fragment: &str, status: u16, times: u32) {
        self.state().failures.push(InjectedFailure {
            method,
            fragment: fragment.to_string(),
            status,
            remaining: Some(times),
        });
    }

    /// Every request received so far, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state().requests.clone()
    }

    /// Number of state-changing requests received, including rejected ones.
    #[must_use]
    pub fn mutation_count(&self) -> usize {
        self.state()
            .requests
            .iter()
            .filter(|request| request.is_mutation())
            .count()
    }

    fn answer(&self, request: &HttpRequest) -> Answer {
        let url = Url::parse(&request.url).map_err(|e| (400, format!("bad url: {e}")))?;
        let body: Option<Value> = match &request.body {
            Some(bytes) => {
                Some(serde_json::from_slice(bytes).map_err(|e| (400, format!("bad body: {e}")))?)
            }
            None => None,
        };
        let query: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        let target = format!("{}?{}", url.path(), url.query().unwrap_or_default());

        let mut state = self.state();
        state.requests.push(RecordedRequest {
            method: request.method,
            path: url.path().to_string(),
            query: query.clone(),
            body: body.clone(),
        });

        if let Some(failure) = state
            .failures
            .iter_mut()
            .find(|f| {
                f.method == request.method
                    && target.contains(&f.fragment)
                    && f.remaining != Some(0)
            })
        {
            if let Some(remaining) = failure.remaining.as_mut() {
                *remaining -= 1;
            }
            return Err((failure.status, "injected failure".to_string()));
        }

        let segments: Vec<String> = url
            .path_segments()
            .map(|segments| segments.map(decode_segment).collect())
            .unwrap_or_default();
        let segments: Vec<&str> = segments.iter().map(String::as_str).collect();
        let param = |name: &str| {
            query
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.as_str())
        };

        match (request.method, segments.as_slice()) {
            (HttpMethod::Get, ["rest", "api", "user", "memberof"]) => {
                let user = param("username").unwrap_or_default();
                let start = parse_or(param("start"), 0);
                let limit = parse_or(param("limit"), DEFAULT_LIMIT);
                let groups: Vec<&String> = state
                    .groups
                    .iter()
                    .filter(|(_, members)| members.contains(user))
                    .map(|(group, _)| group)
                    .collect();
                let page: Vec<Value> = groups
                    .iter()
                    .skip(start)
                    .take(limit)
                    .map(|group| json!({"type": "group", "name": group}))
                    .collect();
                let listing = json!({
                    "results": page,
                    "start": start,
                    "limit": limit,
                    "size": groups.len(),
                });
                Ok((200, listing))
            }
            (HttpMethod::Put, ["rest", "api", "user", user, "group", group]) => {
                let members = state
                    .groups
                    .get_mut(*group)
                    .ok_or_else(|| (404, format!("Group '{group}' does not exist")))?;
                if !members.insert((*user).to_string()) {
                    return Err((400, format!("User '{user}' is already a member of '{group}'")));
                }
                Ok((204, Value::Null))
            }
            (HttpMethod::Get, ["rest", "api", "2", "filter", id]) => state
                .filters
                .get(*id)
                .cloned()
                .map(|filter| (200, filter))
                .ok_or_else(|| (404, format!("The selected filter is not available: {id}"))),
            (HttpMethod::Put, ["rest", "api", "2", "filter", id]) => {
                if param("overrideSharePermissions") != Some("true") {
                    return Err((
                        400,
                        "You cannot share this filter with the new owner".to_string(),
                    ));
                }
                let filter = body.ok_or_else(|| (400, "missing body".to_string()))?;
                let stored = state
                    .filters
                    .get_mut(*id)
                    .ok_or_else(|| (404, format!("The selected filter is not available: {id}")))?;
                *stored = filter.clone();
                Ok((200, filter))
            }
            (HttpMethod::Post, ["rest", "api", "2", "search"]) => {
                let body = body.ok_or_else(|| (400, "missing body".to_string()))?;
                Ok((200, search(&state.issues, &state.stale_matches, &body)))
            }
            (HttpMethod::Put, ["rest", "api", "2", "issue", key]) => {
                let issue = state
                    .issues
                    .get_mut(*key)
                    .ok_or_else(|| (404, "Issue Does Not Exist".to_string()))?;
                let fields = body
                    .as_ref()
                    .and_then(|body| body.get("fields"))
                    .and_then(Value::as_object)
                    .ok_or_else(|| (400, "missing fields".to_string()))?;
                apply_fields(issue, fields)?;
                Ok((204, Value::Null))
            }
            (HttpMethod::Get, ["rest", "api", "2", "field"]) => {
                Ok((200, Value::Array(state.fields.clone())))
            }
            (HttpMethod::Post, ["rest", "api", "2", "project", _, "role", _]) => {
                let users: Vec<String> = body
                    .as_ref()
                    .and_then(|body| body.get("user"))
                    .and_then(Value::as_array)
                    .map(|users| {
                        users
                            .iter()
                            .filter_map(Value::as_str)
                            .map(str::to_string)
                            .collect()
                    })
                    .ok_or_else(|| (400, "missing user".to_string()))?;
                let members = state
                    .roles
                    .get_mut(url.path())
                    .ok_or_else(|| (404, "No project role found".to_string()))?;
                if let Some(existing) = users.iter().find(|user| members.contains(*user)) {
                    return Err((
                        400,
                        format!("User '{existing}' is already a member of the project role."),
                    ));
                }
                members.extend(users);
                Ok((200, json!({"actors": members.iter().collect::<Vec<_>>()})))
            }
            _ => Err((404, "Null for uri".to_string())),
        }
    }
}

#[async_trait::async_trait]
impl JiraHttpClient for InMemoryJira {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        match self.answer(&request) {
            Ok((status_code, body)) => Ok(HttpResponse {
                status_code,
                body: if body.is_null() {
                    Vec::new()
                } else {
                    serde_json::to_vec(&body).unwrap_or_default()
                },
            }),
            Err((code, message)) => {
                let body = json!({"errorMessages": [message], "errors": {}});
                Err(HttpError::BadStatusCode {
                    code: u64::from(code),
                    response_body: serde_json::to_vec(&body).unwrap_or_default(),
                })
            }
        }
    }
}

fn parse_or(value: Option<&str>, default: usize) -> usize {
    value.and_then(|value| value.parse().ok()).unwrap_or(default)
}

fn decode_segment(segment: &str) -> String {
    percent_decode_str(segment).decode_utf8_lossy().into_owned()
}

fn system_field(id: &str, name: &str, kind: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "custom": false,
        "schema": {"type": kind, "system": id},
    })
}

fn user_value(user: Option<&String>) -> Value {
    user.map_or(Value::Null, |name| json!({"name": name}))
}

fn field_value(issue: &FakeIssue, field: &str) -> Value {
    match field {
        "assignee" => user_value(issue.assignee.as_ref()),
        "reporter" => user_value(issue.reporter.as_ref()),
        other => issue.custom_fields.get(other).cloned().unwrap_or(Value::Null),
    }
}

fn apply_fields(issue: &mut FakeIssue, fields: &Map<String, Value>) -> Result<(), (u16, String)> {
    for (field, value) in fields {
        let name = value.get("name").and_then(Value::as_str).map(str::to_string);
        match field.as_str() {
            "assignee" => issue.assignee = name,
            "reporter" => issue.reporter = name,
            other if other.starts_with("customfield_") => {
                issue.custom_fields.insert(other.to_string(), value.clone());
            }
            other => return Err((400, format!("Field '{other}' cannot be set"))),
        }
    }
    Ok(())
}

fn search(
    issues: &BTreeMap<String, FakeIssue>,
    stale_matches: &BTreeSet<String>,
    body: &Value,
) -> Value {
    let jql = body["jql"].as_str().unwrap_or_default();
    let start_at = body["startAt"]
        .as_u64()
        .and_then(|n| usize::try_from(n).ok())
        .unwrap_or(0);
    let max_results = body["maxResults"]
        .as_u64()
        .and_then(|n| usize::try_from(n).ok())
        .unwrap_or(DEFAULT_LIMIT);
    let fields: Vec<&str> = body["fields"]
        .as_array()
        .map(|fields| fields.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let matching: Vec<(&String, &FakeIssue)> = issues
        .iter()
        .filter(|(key, issue)| stale_matches.contains(*key) || matches_jql(issue, jql))
        .collect();
    let page: Vec<Value> = matching
        .iter()
        .skip(start_at)
        .take(max_results)
        .map(|(key, issue)| {
            let rendered: Map<String, Value> = fields
                .iter()
                .map(|field| ((*field).to_string(), field_value(issue, field)))
                .collect();
            json!({"key": key, "fields": rendered})
        })
        .collect();

    json!({
        "startAt": start_at,
        "maxResults": max_results,
        "total": matching.len(),
        "issues": page,
    })
}

/// Evaluates the two query shapes the migrators build.
fn matches_jql(issue: &FakeIssue, jql: &str) -> bool {
    let jql = jql.strip_suffix(ORDER_CLAUSE).unwrap_or(jql);
    let (clause, unresolved_only) = jql
        .strip_suffix(UNRESOLVED_CLAUSE)
        .map_or((jql, false), |clause| (clause, true));
    if unresolved_only && issue.resolved {
        return false;
    }

    if let Some(rest) = clause.strip_prefix("(assignee = ") {
        let user = first_quoted(rest);
        return user.is_some() && (issue.assignee == user || issue.reporter == user);
    }
    if let Some(rest) = clause.strip_prefix("cf[") {
        let Some((number, rest)) = rest.split_once(']') else {
            return false;
        };
        let Some(user) = first_quoted(rest) else {
            return false;
        };
        let holds =
            |value: &Value| value.get("name").and_then(Value::as_str) == Some(user.as_str());
        return match issue.custom_fields.get(&format!("customfield_{number}")) {
            Some(Value::Array(values)) => values.iter().any(holds),
            Some(value) => holds(value),
            None => false,
        };
    }
    false
}

/// The first double-quoted string in `text`, unescaped.
fn first_quoted(text: &str) -> Option<String> {
    let start = text.find('"')?;
    let mut value = String::new();
    let mut chars = text[start + 1..].chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => value.push(chars.next()?),
            '"' => return Some(value),
            other => value.push(other),
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::jql;

    #[test]
    fn test_matches_generated_queries() {
        let issue = FakeIssue {
            assignee: Some("o\"neil".to_string()),
            resolved: true,
            ..FakeIssue::default()
        };
        assert!(matches_jql(&issue, &jql::assigned_or_reported_by("o\"neil", false)));
        assert!(!matches_jql(&issue, &jql::assigned_or_reported_by("o\"neil", true)));
        assert!(!matches_jql(&issue, &jql::assigned_or_reported_by("oneil", false)));
    }

    #[test]
    fn test_matches_custom_field_queries() {
        let mut issue = FakeIssue::default();
        let reviewers = json!([{"name": "carol"}, {"name": "alice"}]);
        issue
            .custom_fields
            .insert("customfield_10020".to_string(), reviewers);
        let query = jql::custom_field_references("customfield_10020", "alice", false).unwrap();
        assert!(matches_jql(&issue, &query));
        let other = jql::custom_field_references("customfield_10021", "alice", false).unwrap();
        assert!(!matches_jql(&issue, &other));
    }

    #[test]
    fn test_decode_segment() {
        assert_eq!(decode_segment("dev%2Fops%20team"), "dev/ops team");
        assert_eq!(decode_segment("100%"), "100%");
    }

    #[tokio::test]
    async fn test_fail_next_expires() {
        let jira = InMemoryJira::new();
        jira.fail_next(HttpMethod::Get, "/rest/api/2/field", 503, 1);
        let request = HttpRequest {
            method: HttpMethod::Get,
            url: format!("{FAKE_BASE_URL}/rest/api/2/field"),
            body: None,
        };

        assert!(jira.send(request.clone()).await.is_err());
        assert!(jira.send(request).await.is_ok());
        assert_eq!(jira.requests().len(), 2);
    }
}
