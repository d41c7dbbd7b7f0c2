use std::sync::Arc;

use crate::batch::{BatchReport, BatchRunner, CancellationToken, ProgressListener};
use crate::migration::{ConfigurationError, MigrationError, MigrationPair, PairReport, RunOptions};
use crate::primitives::{EngineOptions, JiraHttpClient, ReqwestJiraClient, ServerConfig};
use crate::remote::JiraClient;

/// Migrates identity footprints on one issue tracker server.
///
/// Holds no state between runs besides the connection, so one engine can serve any
/// number of batches.
///
/// # Examples
///
/// ## Kotlin
///
/// ```kotlin
/// val options = EngineOptions(maxConcurrentPairs = 2u, retry = retry)
/// val engine = MigrationEngine(serverConfig, options)
/// val pairs = loadPairsCsv("/data/leavers.csv")
/// val report = engine.runBatch(pairs, runOptions, progressPane, CancellationToken())
/// ```
#[derive(uniffi::Object)]
pub struct MigrationEngine {
    client: Arc<JiraClient>,
    options: EngineOptions,
}

#[crate::handover_export]
impl MigrationEngine {
    /// Creates an engine that talks to the server with the built-in HTTP client.
    ///
    /// # Errors
    /// - `ConfigurationError::InvalidServer` if `server` fails validation.
    #[uniffi::constructor]
    pub fn new(
        server: ServerConfig,
        options: EngineOptions,
    ) -> Result<Arc<Self>, ConfigurationError> {
        let http_client = ReqwestJiraClient::new(&server)?;
        crate::info!(
            "engine.created base_url={} username={} transport=reqwest",
            server.base_url,
            server.username
        );
        Self::with_http_client(Arc::new(http_client), server.base_url, options)
    }

    /// Creates an engine that sends every request through `http_client`.
    ///
    /// # Errors
    /// - `ConfigurationError::InvalidServer` if `base_url` is not an http(s) URL.
    #[uniffi::constructor]
    #[allow(clippy::needless_pass_by_value)]
    pub fn with_http_client(
        http_client: Arc<dyn JiraHttpClient>,
        base_url: String,
        options: EngineOptions,
    ) -> Result<Arc<Self>, ConfigurationError> {
        let client = JiraClient::new(http_client, &base_url, options.retry.clone())?;
        Ok(Arc::new(Self {
            client: Arc::new(client),
            options,
        }))
    }

    /// The options the engine was created with.
    #[must_use]
    pub fn options(&self) -> EngineOptions {
        self.options.clone()
    }

    /// Migrates a batch of pairs.
    ///
    /// Never fails as a whole: per-pair and per-object problems are in the report.
    pub async fn run_batch(
        &self,
        pairs: Vec<MigrationPair>,
        run_options: RunOptions,
        listener: Arc<dyn ProgressListener>,
        cancellation: Arc<CancellationToken>,
    ) -> BatchReport {
        BatchRunner::new(self.client.clone(), self.options.clone())
            .with_listener(listener)
            .with_cancellation(cancellation)
            .run(pairs, &run_options)
            .await
    }

    /// Migrates a single pair.
    ///
    /// # Errors
    /// - `MigrationError::InvalidOperation` if the pair is malformed or maps an identity
    ///   onto itself.
    pub async fn migrate_pair(
        &self,
        pair: MigrationPair,
        run_options: RunOptions,
    ) -> Result<PairReport, MigrationError> {
        if let Some(reason) = pair.rejection() {
            return Err(MigrationError::InvalidOperation(reason.to_string()));
        }

        let report = BatchRunner::new(self.client.clone(), self.options.clone())
            .run(vec![pair], &run_options)
            .await;
        report.pairs.into_iter().next().ok_or_else(|| {
            MigrationError::InvalidOperation("batch returned no report for the pair".to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::{FeatureSelection, IssueReassignmentOptions, PairState};
    use crate::test_utils::{FakeIssue, InMemoryJira};
    use crate::RetryPolicy;

    fn engine(jira: &Arc<InMemoryJira>) -> Arc<MigrationEngine> {
        MigrationEngine::with_http_client(
            jira.clone(),
            jira.base_url().to_string(),
            EngineOptions {
                max_concurrent_pairs: 1,
                retry: RetryPolicy::none(),
            },
        )
        .unwrap()
    }

    fn issues_only() -> RunOptions {
        RunOptions {
            dry_run: false,
            features: FeatureSelection {
                issues: Some(IssueReassignmentOptions::default()),
                ..FeatureSelection::default()
            },
        }
    }

    #[tokio::test]
    async fn test_migrate_pair() {
        let jira = Arc::new(InMemoryJira::new());
        jira.add_issue(
            "OPS-1",
            FakeIssue {
                reporter: Some("alice".to_string()),
                ..FakeIssue::default()
            },
        );

        let report = engine(&jira)
            .migrate_pair(MigrationPair::new("alice", "bob"), issues_only())
            .await
            .unwrap();
        assert_eq!(report.state, PairState::Completed);
        assert_eq!(
            jira.issue("OPS-1").unwrap().reporter.as_deref(),
            Some("bob")
        );
    }

    #[tokio::test]
    async fn test_migrate_pair_rejects_self_migration() {
        let jira = Arc::new(InMemoryJira::new());
        let result = engine(&jira)
            .migrate_pair(MigrationPair::new("alice", "alice"), issues_only())
            .await;
        assert!(matches!(result, Err(MigrationError::InvalidOperation(_))));
        assert!(jira.requests().is_empty());
    }

    #[test]
    fn test_new_validates_server() {
        let result = MigrationEngine::new(
            ServerConfig {
                base_url: "http://jira.internal".to_string(),
                username: "admin".to_string(),
                password: "secret".to_string(),
                ..ServerConfig::default()
            },
            EngineOptions::default(),
        );
        assert!(matches!(
            result,
            Err(ConfigurationError::InvalidServer { .. })
        ));
    }
}
