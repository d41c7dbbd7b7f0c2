use async_trait::async_trait;

use crate::inputs::RoleMembershipRecord;
use crate::migration::processor::{PairContext, ResourceMigrator};
use crate::migration::{
    ConfigurationError, MigrationError, MigrationResult, ResourceOutcome, ResourceType,
    ResultRecorder,
};
use crate::remote::model::RoleActorsRequest;

/// Adds the target to every project role the source belongs to, per the role export.
///
/// Role URLs come from the export file and are only called when they point at the
/// configured server. A role URL on another server fails the row in a live run. A dry
/// run attempts nothing, so it records the row as skipped with the same reason.
pub struct RoleMembershipMigrator {
    export: Result<Vec<RoleMembershipRecord>, ConfigurationError>,
}

impl RoleMembershipMigrator {
    /// Creates the migrator from the loaded export, or the reason it could not be loaded.
    #[must_use]
    pub const fn new(export: Result<Vec<RoleMembershipRecord>, ConfigurationError>) -> Self {
        Self { export }
    }
}

#[async_trait]
impl ResourceMigrator for RoleMembershipMigrator {
    fn resource_type(&self) -> ResourceType {
        ResourceType::RoleMembership
    }

    async fn migrate(&self, ctx: &PairContext<'_>) -> Result<MigrationResult, MigrationError> {
        let records = match &self.export {
            Ok(records) => records,
            Err(e) => {
                return Ok(MigrationResult::not_configured(
                    ResourceType::RoleMembership,
                    e.to_string(),
                ))
            }
        };

        let mut recorder = ResultRecorder::new(ResourceType::RoleMembership);
        let memberships = records
            .iter()
            .filter(|record| record.members.iter().any(|member| *member == ctx.pair.source));

        for record in memberships {
            let object_id = record.object_id();
            let url = match ctx.client.resolve_on_server(&record.role_url) {
                Ok(url) => url,
                Err(e) if ctx.dry_run => {
                    recorder.skipped(&object_id, e.to_string());
                    continue;
                }
                Err(e) => {
                    recorder.failed(&object_id, e.to_string());
                    continue;
                }
            };
            if ctx.dry_run {
                recorder.skipped(&object_id, "dry-run");
                continue;
            }

            let body = RoleActorsRequest {
                user: vec![ctx.pair.target.clone()],
            };
            match ctx.client.post(&url, &body).await {
                Ok(()) => recorder.succeeded(&object_id),
                Err(e) if e.is_already_member() => recorder.succeeded(&object_id),
                Err(e) => recorder.failed(&object_id, e.to_string()),
            }
        }

        Ok(recorder.finish(ResourceOutcome::Completed))
    }
}
