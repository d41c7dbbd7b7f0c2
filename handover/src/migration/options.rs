use serde::{Deserialize, Serialize};

use super::state::ResourceType;

/// A source identity whose footprint moves to a target identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, uniffi::Record)]
pub struct MigrationPair {
    /// The departing identity
    pub source: String,
    /// The identity that takes over
    pub target: String,
}

impl MigrationPair {
    /// Creates a pair, trimming both identities.
    #[must_use]
    pub fn new(source: &str, target: &str) -> Self {
        Self {
            source: source.trim().to_string(),
            target: target.trim().to_string(),
        }
    }

    /// Why this pair cannot be migrated, if it cannot.
    #[must_use]
    pub fn rejection(&self) -> Option<&'static str> {
        if self.source.trim().is_empty() || self.target.trim().is_empty() {
            Some("malformed pair: source and target are both required")
        } else if self.source.trim() == self.target.trim() {
            Some("source and target are the same identity")
        } else {
            None
        }
    }

    /// `source->target`, used as logging context.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{}->{}", self.source, self.target)
    }
}

/// Options for group membership migration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, uniffi::Record)]
pub struct GroupMembershipOptions {
    /// Groups that are never granted to the target. Matched exactly after trimming.
    pub excluded_groups: Vec<String>,
}

/// Options for saved-filter ownership migration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, uniffi::Record)]
pub struct FilterOwnershipOptions {
    /// Path of the filter export CSV (`filter_id,owner,...`, no header)
    pub export_path: String,
}

/// Options for issue assignee/reporter migration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, uniffi::Record)]
pub struct IssueReassignmentOptions {
    /// Restrict to unresolved issues
    pub unresolved_only: bool,
}

/// Options for project-role membership migration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, uniffi::Record)]
pub struct RoleMembershipOptions {
    /// Path of the role export CSV (`project_key,role_name,role_url,usernames`)
    pub export_path: String,
}

/// Options for the user-picker field migrations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, uniffi::Record)]
pub struct PickerOptions {
    /// Restrict to unresolved issues
    pub unresolved_only: bool,
}

/// Which resource types run, with their options. `None` disables a type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, uniffi::Record)]
pub struct FeatureSelection {
    /// Group memberships
    pub groups: Option<GroupMembershipOptions>,
    /// Saved-filter ownership
    pub filters: Option<FilterOwnershipOptions>,
    /// Issue assignee and reporter
    pub issues: Option<IssueReassignmentOptions>,
    /// Project-role memberships
    pub roles: Option<RoleMembershipOptions>,
    /// Single-user picker custom fields
    pub single_picker: Option<PickerOptions>,
    /// Multi-user picker custom fields
    pub multi_picker: Option<PickerOptions>,
}

impl FeatureSelection {
    /// Enabled resource types, in execution order.
    #[must_use]
    pub fn enabled(&self) -> Vec<ResourceType> {
        ResourceType::ALL
            .into_iter()
            .filter(|resource_type| match resource_type {
                ResourceType::GroupMembership => self.groups.is_some(),
                ResourceType::FilterOwnership => self.filters.is_some(),
                ResourceType::IssueReassignment => self.issues.is_some(),
                ResourceType::RoleMembership => self.roles.is_some(),
                ResourceType::SinglePicker => self.single_picker.is_some(),
                ResourceType::MultiPicker => self.multi_picker.is_some(),
            })
            .collect()
    }
}

/// Options for one batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, uniffi::Record)]
pub struct RunOptions {
    /// Discover and report without mutating anything
    pub dry_run: bool,
    /// Resource types to migrate
    pub features: FeatureSelection,
}
