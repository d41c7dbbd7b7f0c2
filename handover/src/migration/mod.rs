//! Migration of one identity pair.
//!
//! Each resource type has its own [`ResourceMigrator`]. The [`MigrationController`] runs
//! the enabled migrators for a pair in a fixed order and collects one
//! [`MigrationResult`] per type into a [`PairReport`].
//!
//! Migrators only add: the target gains memberships, ownership and field references, and
//! the source keeps its group and role memberships.

mod controller;
mod error;
mod options;
mod processor;
mod state;

/// Migrator implementations, one per resource type.
pub mod processors;

pub use controller::MigrationController;
pub use error::{ConfigurationError, MigrationError};
pub use options::{
    FeatureSelection, FilterOwnershipOptions, GroupMembershipOptions, IssueReassignmentOptions,
    MigrationPair, PickerOptions, RoleMembershipOptions, RunOptions,
};
pub use processor::{PairContext, ResourceMigrator};
pub use state::{
    MigrationResult, ObjectRecord, PairReport, PairState, ResourceOutcome, ResourceType,
    ResultCounts, ResultRecorder,
};
