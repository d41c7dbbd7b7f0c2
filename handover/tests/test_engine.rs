mod common;

use std::sync::Arc;

use handover::inputs::read_pairs;
use handover::test_utils::{FakeIssue, InMemoryJira};
use handover::{
    CancellationToken, ConfigurationError, EngineOptions, HttpMethod, MigrationEngine,
    MigrationError, ResourceOutcome, ResourceType, RetryPolicy,
};
use tokio_test::{assert_err, assert_ok};

use common::{
    capture_logs, groups, issues, new_jira, pair, run_options, write_csv, RecordingListener,
};

fn engine(jira: &Arc<InMemoryJira>, retry: RetryPolicy) -> Arc<MigrationEngine> {
    assert_ok!(MigrationEngine::with_http_client(
        jira.clone(),
        jira.base_url().to_string(),
        EngineOptions {
            max_concurrent_pairs: 2,
            retry,
        },
    ))
}

fn quick_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay_ms: 1,
        max_delay_ms: 1,
    }
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let jira = new_jira();
    jira.add_group_member("developers", "grace");
    jira.fail_next(HttpMethod::Get, "username=grace", 503, 2);

    let report = engine(&jira, quick_retry())
        .run_batch(
            vec![pair("grace", "heidi")],
            run_options(groups(&[]), false),
            Arc::new(RecordingListener::default()),
            Arc::new(CancellationToken::new()),
        )
        .await;

    let result = report.pairs[0]
        .result(ResourceType::GroupMembership)
        .unwrap();
    assert_eq!(result.outcome, ResourceOutcome::Completed);
    assert_eq!(result.succeeded, 1);
    let listings = jira
        .requests()
        .iter()
        .filter(|request| request.path == "/rest/api/user/memberof")
        .count();
    assert_eq!(listings, 3);
}

#[tokio::test]
async fn test_retries_give_up_after_max_attempts() {
    let jira = new_jira();
    jira.add_issue(
        "OPS-9",
        FakeIssue {
            assignee: Some("ivan".to_string()),
            ..FakeIssue::default()
        },
    );
    jira.fail_requests(HttpMethod::Put, "/issue/OPS-9", 502);

    let report = engine(&jira, quick_retry())
        .run_batch(
            vec![pair("ivan", "judy")],
            run_options(issues(false), false),
            Arc::new(RecordingListener::default()),
            Arc::new(CancellationToken::new()),
        )
        .await;

    let result = report.pairs[0]
        .result(ResourceType::IssueReassignment)
        .unwrap();
    assert_eq!(result.failed, 1);
    assert_eq!(result.failures[0].object_id, "OPS-9");
    let updates = jira
        .requests()
        .iter()
        .filter(|request| request.method == HttpMethod::Put)
        .count();
    assert_eq!(updates, 3);
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let jira = new_jira();
    jira.add_group_member("developers", "ken");
    jira.fail_requests(HttpMethod::Put, "/group/developers", 403);

    engine(&jira, quick_retry())
        .run_batch(
            vec![pair("ken", "lena")],
            run_options(groups(&[]), false),
            Arc::new(RecordingListener::default()),
            Arc::new(CancellationToken::new()),
        )
        .await;

    assert_eq!(jira.mutation_count(), 1);
}

#[tokio::test]
async fn test_log_lines_carry_pair_and_resource_context() {
    let logs = capture_logs();
    let jira = new_jira();
    jira.add_group_member("developers", "mallory");

    engine(&jira, RetryPolicy::none())
        .run_batch(
            vec![pair("mallory", "nina")],
            run_options(groups(&[]), false),
            Arc::new(RecordingListener::default()),
            Arc::new(CancellationToken::new()),
        )
        .await;

    let started = logs.lines_containing("pair.started");
    assert!(started
        .iter()
        .any(|line| line.starts_with("[Handover][mallory->nina] pair.started")));
    let completed = logs.lines_containing("[Handover][mallory->nina][groups] resource.completed");
    assert_eq!(completed.len(), 1);
    assert!(completed[0].contains("succeeded=1"));
}

#[tokio::test]
async fn test_engine_runs_pairs_from_csv() {
    let jira = new_jira();
    jira.add_group_member("developers", "olivia");
    jira.add_group_member("support", "peggy");
    let file = write_csv("source,target\nolivia,quinn\npeggy,peggy\n\npeggy,rupert\n");

    let pairs = assert_ok!(read_pairs(file.path()));
    assert_eq!(pairs.len(), 3);
    let listener = Arc::new(RecordingListener::default());
    let report = engine(&jira, RetryPolicy::none())
        .run_batch(
            pairs,
            run_options(groups(&[]), false),
            listener.clone(),
            Arc::new(CancellationToken::new()),
        )
        .await;

    assert_eq!(report.processed, 2);
    assert_eq!(report.skipped, 1);
    assert_eq!(jira.groups_of("quinn"), vec!["developers"]);
    assert_eq!(jira.groups_of("rupert"), vec!["support"]);
    assert_eq!(listener.finished.lock().unwrap().len(), 3);
    let mut started = listener.started.lock().unwrap().clone();
    started.sort_unstable();
    assert_eq!(started, vec![0, 2]);
}

#[tokio::test]
async fn test_migrate_pair_rejects_blank_identity() {
    let jira = new_jira();
    let result = engine(&jira, RetryPolicy::none())
        .migrate_pair(pair(" ", "sybil"), run_options(groups(&[]), false))
        .await;

    let error = assert_err!(result);
    assert!(matches!(error, MigrationError::InvalidOperation(_)));
    assert!(jira.requests().is_empty());
}

#[test]
fn test_missing_pairs_file() {
    let dir = tempfile::tempdir().unwrap();
    let error = assert_err!(read_pairs(&dir.path().join("leavers.csv")));
    assert!(matches!(error, ConfigurationError::MissingInput { .. }));
}

#[test]
fn test_engine_rejects_non_http_base_url() {
    let jira = new_jira();
    let result = MigrationEngine::with_http_client(
        jira,
        "ftp://jira.test".to_string(),
        EngineOptions::default(),
    );
    assert!(matches!(
        result,
        Err(ConfigurationError::InvalidServer { .. })
    ));
}
