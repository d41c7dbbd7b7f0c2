use std::fmt;

use crate::ConfigurationError;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BASE_DELAY_MS: u64 = 500;
const DEFAULT_MAX_DELAY_MS: u64 = 8_000;

/// Connection settings for the issue tracker.
///
/// Built once by the presentation layer before a run starts.
///
/// # Examples
///
/// ## Swift
///
/// ```swift
/// let server = ServerConfig(
///     baseUrl: "https://jira.example.com",
///     username: "admin",
///     password: secret,
///     acceptInvalidCerts: false,
///     allowPlainHttp: false,
///     timeoutSecs: 30
/// )
/// ```
#[derive(Clone, uniffi::Record)]
pub struct ServerConfig {
    /// Base URL of the server, e.g. `https://jira.example.com`
    pub base_url: String,
    /// Administrator account used for every request
    pub username: String,
    /// Password or personal access token for `username`
    pub password: String,
    /// Skip TLS certificate verification (self-signed on-premise servers)
    pub accept_invalid_certs: bool,
    /// Allow `http://` for hosts other than loopback
    pub allow_plain_http: bool,
    /// Per-request timeout
    pub timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            username: String::new(),
            password: String::new(),
            accept_invalid_certs: false,
            allow_plain_http: false,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .field("allow_plain_http", &self.allow_plain_http)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl ServerConfig {
    /// Validates the configuration and returns the parsed base URL.
    ///
    /// Requires `https://` for all hosts, with `http://` permitted for loopback addresses
    /// or when `allow_plain_http` is set. Credentials must be present.
    ///
    /// # Errors
    /// - `ConfigurationError::InvalidServer` describing the first problem found.
    pub fn validate(&self) -> Result<reqwest::Url, ConfigurationError> {
        let invalid = |message: &str| ConfigurationError::InvalidServer {
            message: message.to_string(),
        };

        let parsed = reqwest::Url::parse(self.base_url.trim())
            .map_err(|e| invalid(&format!("failed to parse base URL: {e}")))?;

        match parsed.scheme() {
            "https" => {}
            "http" => {
                let loopback = matches!(
                    parsed.host_str(),
                    Some("127.0.0.1" | "localhost" | "::1" | "[::1]")
                );
                if !loopback && !self.allow_plain_http {
                    return Err(invalid(
                        "only https:// URLs are allowed for non-loopback hosts",
                    ));
                }
            }
            other => return Err(invalid(&format!("unsupported URL scheme: {other}"))),
        }

        if self.username.trim().is_empty() || self.password.is_empty() {
            return Err(invalid("username and password are required"));
        }
        if self.timeout_secs == 0 {
            return Err(invalid("timeout_secs must be greater than zero"));
        }

        Ok(parsed)
    }
}

/// Bounded retry with exponential backoff for transient failures.
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct RetryPolicy {
    /// Total attempts per request, including the first one. `1` disables retries.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles for every further attempt
    pub base_delay_ms: u64,
    /// Upper bound for any single delay
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    /// Delay to wait after the given failed attempt (1-based).
    #[must_use]
    pub fn backoff_delay_ms(&self, attempt: u32) -> u64 {
        // attempt 1 => base, 2 => 2x, 3 => 4x, ...
        let exp = attempt.saturating_sub(1).min(16);
        let factor = 1_u64.checked_shl(exp).unwrap_or(u64::MAX);
        self.base_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms)
    }
}

/// Engine-wide knobs that stay constant for the lifetime of a [`crate::MigrationEngine`].
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct EngineOptions {
    /// How many pairs may be migrated at the same time. `0` is treated as `1`.
    pub max_concurrent_pairs: u32,
    /// Retry behavior for transient remote failures
    pub retry: RetryPolicy,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            max_concurrent_pairs: 1,
            retry: RetryPolicy::default(),
        }
    }
}
