use std::collections::BTreeSet;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::inputs::FilterOwnerRecord;
use crate::migration::processor::{PairContext, ResourceMigrator};
use crate::migration::{
    ConfigurationError, MigrationError, MigrationResult, ResourceOutcome, ResourceType,
    ResultRecorder,
};
use crate::remote::model::{user_name, UserRef};
use crate::remote::{JiraClient, RemoteError};

/// Hands saved filters owned by the source over to the target.
///
/// The server cannot list filters by owner, so candidates come from a precomputed export.
/// Each filter is re-read before the update and only its owner is replaced. A filter
/// whose live owner is no longer the source is skipped.
pub struct FilterOwnershipMigrator {
    export: Result<Vec<FilterOwnerRecord>, ConfigurationError>,
}

impl FilterOwnershipMigrator {
    /// Creates the migrator from the loaded export, or the reason it could not be loaded.
    #[must_use]
    pub const fn new(export: Result<Vec<FilterOwnerRecord>, ConfigurationError>) -> Self {
        Self { export }
    }

    /// Re-reads the filter and hands it to `target` when `source` still owns it.
    ///
    /// Returns `Ok(false)` without an update when the live owner is someone else.
    async fn transfer(
        client: &JiraClient,
        filter_id: &str,
        source: &str,
        target: &str,
    ) -> Result<bool, RemoteError> {
        let url = client.endpoint(&["rest", "api", "2", "filter", filter_id]);
        let mut filter: Value = client.get_json(&url).await?;
        let owner = filter.get("owner").and_then(user_name);
        if owner != Some(source) {
            return Ok(false);
        }
        if let Value::Object(members) = &mut filter {
            members.insert("owner".to_string(), json!(UserRef::new(target)));
        }

        let update_url = client.endpoint_with_query(
            &["rest", "api", "2", "filter", filter_id],
            &[("overrideSharePermissions", "true")],
        );
        client.put(&update_url, Some(&filter)).await?;
        Ok(true)
    }
}

#[async_trait]
impl ResourceMigrator for FilterOwnershipMigrator {
    fn resource_type(&self) -> ResourceType {
        ResourceType::FilterOwnership
    }

    async fn migrate(&self, ctx: &PairContext<'_>) -> Result<MigrationResult, MigrationError> {
        let records = match &self.export {
            Ok(records) => records,
            Err(e) => {
                return Ok(MigrationResult::not_configured(
                    ResourceType::FilterOwnership,
                    e.to_string(),
                ))
            }
        };

        let mut recorder = ResultRecorder::new(ResourceType::FilterOwnership);
        let mut handled = BTreeSet::new();
        let owned = records
            .iter()
            .filter(|record| record.owner == ctx.pair.source)
            .filter(|record| handled.insert(record.filter_id.as_str()));

        for record in owned {
            if ctx.dry_run {
                recorder.skipped(&record.filter_id, "dry-run");
                continue;
            }
            let pair = ctx.pair;
            let transferred =
                Self::transfer(ctx.client, &record.filter_id, &pair.source, &pair.target).await;
            match transferred {
                Ok(true) => recorder.succeeded(&record.filter_id),
                Ok(false) => recorder.skipped(&record.filter_id, "owner changed since export"),
                Err(e) => recorder.failed(&record.filter_id, e.to_string()),
            }
        }

        Ok(recorder.finish(ResourceOutcome::Completed))
    }
}
