/// Connection and engine settings.
pub mod config;

/// The HTTP transport the engine talks through, and its `reqwest` implementation.
pub mod http_client;

/// Logging bridge to the host application, with scoped context prefixes.
pub mod logger;

pub use config::{EngineOptions, RetryPolicy, ServerConfig};
pub use http_client::{
    HttpError, HttpMethod, HttpRequest, HttpResponse, JiraHttpClient, ReqwestJiraClient,
};
