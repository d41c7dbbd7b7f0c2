use async_trait::async_trait;

use super::{MigrationError, MigrationPair, MigrationResult, ResourceType};
use crate::remote::JiraClient;

/// What a migrator needs to know about the pair it is working on.
pub struct PairContext<'a> {
    /// The pair being migrated
    pub pair: &'a MigrationPair,
    /// Discover and report without mutating
    pub dry_run: bool,
    /// Access to the server
    pub client: &'a JiraClient,
}

/// Moves one kind of footprint from the source to the target of a pair.
///
/// Implementations must be idempotent: running the same pair twice leaves the server in
/// the same state as running it once. Per-object failures are recorded in the returned
/// [`MigrationResult`]; listing failures end the run with
/// [`super::ResourceOutcome::ListingAborted`]. An `Err` is reserved for unexpected failures
/// and is reported as a crash of this resource type only.
#[async_trait]
pub trait ResourceMigrator: Send + Sync {
    /// The resource type this migrator handles
    fn resource_type(&self) -> ResourceType;

    /// Migrates the footprint of `ctx.pair`.
    ///
    /// # Errors
    /// Returns `MigrationError` only for failures that are not tied to a single object.
    async fn migrate(&self, ctx: &PairContext<'_>) -> Result<MigrationResult, MigrationError>;
}
