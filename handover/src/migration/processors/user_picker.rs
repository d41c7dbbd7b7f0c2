use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::issue_search::IssueSearch;
use crate::migration::processor::{PairContext, ResourceMigrator};
use crate::migration::{
    MigrationError, MigrationResult, ResourceOutcome, ResourceType, ResultRecorder,
};
use crate::remote::jql;
use crate::remote::model::{FieldDefinition, IssueRecord, IssueUpdate, UserRef};
use crate::remote::{JiraClient, RemoteError};

const SINGLE_PICKER_TYPE_SUFFIX: &str = ":userpicker";
const MULTI_PICKER_TYPE_SUFFIX: &str = ":multiuserpicker";

/// The two user-picker field flavors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickerKind {
    /// Holds one user
    Single,
    /// Holds a list of users
    Multi,
}

impl PickerKind {
    const fn resource_type(self) -> ResourceType {
        match self {
            Self::Single => ResourceType::SinglePicker,
            Self::Multi => ResourceType::MultiPicker,
        }
    }

    const fn type_suffix(self) -> &'static str {
        match self {
            Self::Single => SINGLE_PICKER_TYPE_SUFFIX,
            Self::Multi => MULTI_PICKER_TYPE_SUFFIX,
        }
    }

    fn matches(self, field: &FieldDefinition) -> bool {
        field.custom
            && field
                .custom_type()
                .is_some_and(|custom_type| custom_type.ends_with(self.type_suffix()))
    }
}

/// Moves a multi-user value from `source` to `target`.
///
/// Every `source` entry is removed and the other entries keep their order, repeats
/// included. Only the first `target` entry is kept, and `target` is appended when the
/// value does not hold it yet.
#[must_use]
pub fn merge_multi_value(current: &[String], source: &str, target: &str) -> Vec<String> {
    let mut merged: Vec<String> = Vec::with_capacity(current.len() + 1);
    for user in current {
        let repeated_target = user == target && merged.iter().any(|kept| kept == target);
        if user != source && !repeated_target {
            merged.push(user.clone());
        }
    }
    if !merged.iter().any(|user| user == target) {
        merged.push(target.to_string());
    }
    merged
}

/// Rewrites user-picker custom fields that reference the source.
///
/// Fields are discovered from the field catalog by their custom type. Each field is
/// searched separately; a failed search aborts this resource type for the pair.
pub struct UserPickerMigrator {
    kind: PickerKind,
    unresolved_only: bool,
}

impl UserPickerMigrator {
    /// Creates a migrator for one picker flavor.
    #[must_use]
    pub const fn new(kind: PickerKind, unresolved_only: bool) -> Self {
        Self {
            kind,
            unresolved_only,
        }
    }

    async fn picker_fields(
        &self,
        client: &JiraClient,
    ) -> Result<Vec<FieldDefinition>, RemoteError> {
        let url = client.endpoint(&["rest", "api", "2", "field"]);
        let fields: Vec<FieldDefinition> = client.get_json(&url).await?;
        Ok(fields
            .into_iter()
            .filter(|field| self.kind.matches(field))
            .collect())
    }

    /// The new value of `field_id`, or `None` when it no longer references the source.
    fn replacement(
        &self,
        issue: &IssueRecord,
        field_id: &str,
        source: &str,
        target: &str,
    ) -> Option<Value> {
        match self.kind {
            PickerKind::Single => {
                (issue.user_field(field_id) == Some(source)).then(|| json!(UserRef::new(target)))
            }
            PickerKind::Multi => {
                let current = issue.multi_user_field(field_id);
                if !current.iter().any(|user| user == source) {
                    return None;
                }
                let merged: Vec<UserRef> = merge_multi_value(&current, source, target)
                    .iter()
                    .map(|user| UserRef::new(user))
                    .collect();
                Some(json!(merged))
            }
        }
    }

    async fn migrate_field(
        &self,
        ctx: &PairContext<'_>,
        field: &FieldDefinition,
        recorder: &mut ResultRecorder,
    ) -> Result<(), RemoteError> {
        let Some(query) =
            jql::custom_field_references(&field.id, &ctx.pair.source, self.unresolved_only)
        else {
            recorder.skipped(&field.id, "field cannot be searched");
            return Ok(());
        };

        let mut search = IssueSearch::new(ctx.client, &query, &[field.id.as_str()]);
        while let Some(issues) = search.next_batch().await? {
            let mut retired = 0_u32;
            for issue in issues {
                let object_id = format!("{}:{}", issue.key, field.id);
                let Some(value) =
                    self.replacement(&issue, &field.id, &ctx.pair.source, &ctx.pair.target)
                else {
                    recorder.skipped(&object_id, "no field references source");
                    continue;
                };
                if ctx.dry_run {
                    recorder.skipped(&object_id, "dry-run");
                    continue;
                }

                let mut fields = Map::new();
                fields.insert(field.id.clone(), value);
                let url = ctx.client.endpoint_with_query(
                    &["rest", "api", "2", "issue", &issue.key],
                    &[("notifyUsers", "false")],
                );
                match ctx.client.put(&url, Some(&IssueUpdate { fields })).await {
                    Ok(()) => {
                        recorder.succeeded(&object_id);
                        retired += 1;
                    }
                    Err(e) => recorder.failed(&object_id, e.to_string()),
                }
            }
            search.retire(retired);
        }
        Ok(())
    }
}

#[async_trait]
impl ResourceMigrator for UserPickerMigrator {
    fn resource_type(&self) -> ResourceType {
        self.kind.resource_type()
    }

    async fn migrate(&self, ctx: &PairContext<'_>) -> Result<MigrationResult, MigrationError> {
        let mut recorder = ResultRecorder::new(self.kind.resource_type());

        let fields = match self.picker_fields(ctx.client).await {
            Ok(fields) => fields,
            Err(e) => {
                crate::error!("pickers.field_catalog_failed error=\"{e}\"");
                return Ok(recorder.finish(ResourceOutcome::ListingAborted {
                    reason: e.to_string(),
                }));
            }
        };
        crate::info!(
            "pickers.discovered kind={:?} fields={}",
            self.kind,
            fields.len()
        );

        for field in &fields {
            if let Err(e) = self.migrate_field(ctx, field, &mut recorder).await {
                crate::error!("pickers.search_failed field={} error=\"{e}\"", field.id);
                return Ok(recorder.finish(ResourceOutcome::ListingAborted {
                    reason: format!("{} ({}): {e}", field.id, field.name),
                }));
            }
        }

        Ok(recorder.finish(ResourceOutcome::Completed))
    }
}
