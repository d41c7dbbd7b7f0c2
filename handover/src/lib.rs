#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    dead_code
)]

//! `handover` moves a departing user's footprint on an issue tracker to another account:
//! group memberships, saved-filter ownership, issue assignee/reporter fields, project-role
//! memberships and user-picker custom field values.
//!
//! The entry point for host applications is [`MigrationEngine`]. Rust callers that need
//! finer control can drive [`BatchRunner`] or [`migration::MigrationController`] directly.

pub use handover_macros::{handover_error, handover_export};

/// Transport, configuration and logging primitives.
pub mod primitives;

/// Typed access to the issue tracker REST API: pagination, queries and payloads.
pub mod remote;

/// Per-resource migrators and the per-pair orchestrator.
pub mod migration;

/// Runs many identity pairs with a cap, bounded parallelism and cancellation.
pub mod batch;

/// CSV readers for pair lists and the precomputed filter and role exports.
pub mod inputs;

/// The FFI-facing engine object.
pub mod engine;

/// An in-memory issue tracker for tests and demos.
pub mod test_utils;

pub use batch::{BatchReport, BatchRunner, CancellationToken, ProgressListener, MAX_BATCH_PAIRS};
pub use engine::MigrationEngine;
pub use migration::{
    ConfigurationError, FeatureSelection, MigrationError, MigrationPair, MigrationResult,
    PairReport, PairState, ResourceOutcome, ResourceType, RunOptions,
};
pub use primitives::{
    EngineOptions, HttpError, HttpMethod, HttpRequest, HttpResponse, JiraHttpClient,
    RetryPolicy, ServerConfig,
};
pub use remote::{JiraClient, RemoteError};

uniffi::setup_scaffolding!("handover");
