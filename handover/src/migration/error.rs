/// Problems with the inputs of a run, detected before any mutation.
///
/// A configuration error either disables a single resource type (missing filter or role
/// export) or prevents the engine from being built (invalid server settings).
#[crate::handover_error]
pub enum ConfigurationError {
    /// A required input file does not exist
    #[error("input file not found: {path}")]
    MissingInput {
        /// Path as given by the caller
        path: String,
    },

    /// The server settings are unusable
    #[error("invalid server configuration: {message}")]
    InvalidServer {
        /// What is wrong with the settings
        message: String,
    },
}

/// Errors that can occur during migration operations
#[crate::handover_error]
pub enum MigrationError {
    /// An invalid operation was attempted
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {message}")]
    JsonError {
        /// The error message from serde_json
        message: String,
    },
}

impl From<serde_json::Error> for MigrationError {
    fn from(e: serde_json::Error) -> Self {
        Self::JsonError {
            message: e.to_string(),
        }
    }
}
