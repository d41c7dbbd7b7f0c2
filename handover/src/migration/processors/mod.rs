use std::path::Path;
use std::sync::Arc;

use super::processor::ResourceMigrator;
use super::FeatureSelection;
use crate::inputs;

/// Group membership migration.
pub mod group_membership;

/// Saved-filter ownership migration.
pub mod filter_ownership;

/// Issue assignee and reporter migration.
pub mod issue_reassignment;

/// Project-role membership migration.
pub mod role_membership;

/// Single- and multi-user picker custom field migration.
pub mod user_picker;

mod issue_search;

pub use filter_ownership::FilterOwnershipMigrator;
pub use group_membership::GroupMembershipMigrator;
pub use issue_reassignment::IssueReassignmentMigrator;
pub use role_membership::RoleMembershipMigrator;
pub use user_picker::{merge_multi_value, PickerKind, UserPickerMigrator};

/// Builds the migrators for the enabled resource types.
///
/// Filter and role exports are read here, once per batch. An unreadable export does not
/// prevent the batch from running: the affected migrator reports `NotConfigured` for every
/// pair instead.
#[must_use]
pub fn build_migrators(features: &FeatureSelection) -> Vec<Arc<dyn ResourceMigrator>> {
    let mut migrators: Vec<Arc<dyn ResourceMigrator>> = Vec::new();

    if let Some(options) = &features.groups {
        migrators.push(Arc::new(GroupMembershipMigrator::new(&options.excluded_groups)));
    }
    if let Some(options) = &features.filters {
        let export = inputs::read_filter_export(Path::new(&options.export_path));
        if let Err(e) = &export {
            crate::warn!("inputs.filter_export_unusable error=\"{e}\"");
        }
        migrators.push(Arc::new(FilterOwnershipMigrator::new(export)));
    }
    if let Some(options) = &features.issues {
        migrators.push(Arc::new(IssueReassignmentMigrator::new(options.unresolved_only)));
    }
    if let Some(options) = &features.roles {
        let export = inputs::read_role_export(Path::new(&options.export_path));
        if let Err(e) = &export {
            crate::warn!("inputs.role_export_unusable error=\"{e}\"");
        }
        migrators.push(Arc::new(RoleMembershipMigrator::new(export)));
    }
    if let Some(options) = &features.single_picker {
        migrators.push(Arc::new(UserPickerMigrator::new(
            PickerKind::Single,
            options.unresolved_only,
        )));
    }
    if let Some(options) = &features.multi_picker {
        migrators.push(Arc::new(UserPickerMigrator::new(
            PickerKind::Multi,
            options.unresolved_only,
        )));
    }

    migrators
}
