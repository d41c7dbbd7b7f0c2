use std::time::Duration;

use crate::primitives::config::ServerConfig;
use crate::ConfigurationError;

/// HTTP transport used by the engine to talk to the issue tracker.
///
/// Native applications may implement this trait to route requests through their own
/// networking stack (proxies, SSO cookies, certificate pinning). Rust callers normally
/// use [`ReqwestJiraClient`], built from a [`ServerConfig`].
///
/// Implementations must map any non-2xx response to [`HttpError::BadStatusCode`] with the
/// response body, and platform failures to the closest `HttpError` variant so that the
/// engine can tell transient failures from permanent ones.
#[uniffi::export(with_foreign)]
#[async_trait::async_trait]
pub trait JiraHttpClient: Send + Sync {
    /// Sends one request and returns the response for a 2xx status.
    ///
    /// # Errors
    /// * `HttpError::BadStatusCode` - For HTTP error status codes (4xx, 5xx) with response body
    /// * `HttpError::NoConnectivity` - When no network connection is available
    /// * `HttpError::Timeout` - When the request times out
    /// * `HttpError::ConnectionRefused` - When the server refuses the connection
    /// * `HttpError::SslError` - When TLS validation fails
    /// * `HttpError::Cancelled` - When the request is cancelled
    /// * `HttpError::Generic` - For other unexpected errors
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError>;
}

/// HTTP methods used against the issue tracker REST API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum HttpMethod {
    /// Read a resource or listing
    Get,
    /// Run a search or add a member
    Post,
    /// Replace a resource
    Put,
}

impl HttpMethod {
    /// Returns the method as written on the wire
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
        }
    }

    /// Whether the method changes state on the server.
    #[must_use]
    pub const fn is_mutating(&self) -> bool {
        !matches!(self, Self::Get)
    }
}

/// A single request handed to a [`JiraHttpClient`].
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct HttpRequest {
    /// HTTP method
    pub method: HttpMethod,
    /// Absolute URL including the query string
    pub url: String,
    /// JSON body, if any
    pub body: Option<Vec<u8>>,
}

/// A successful (2xx) response.
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct HttpResponse {
    /// HTTP status code
    pub status_code: u16,
    /// Raw response body
    pub body: Vec<u8>,
}

/// Represents HTTP-related errors that can occur during network requests.
#[crate::handover_error]
pub enum HttpError {
    /// HTTP error with specific status code (4xx, 5xx responses)
    #[error("Bad status code {code}")]
    BadStatusCode {
        /// The HTTP status code that was returned
        code: u64,
        /// The response body, which may contain error details
        response_body: Vec<u8>,
    },
    /// No network connectivity available
    #[error("No network connectivity")]
    NoConnectivity,
    /// Request timed out
    #[error("Request timed out after {seconds} seconds")]
    Timeout {
        /// Number of seconds before timeout occurred
        seconds: u64,
    },
    /// Connection was refused by the server
    #[error("Connection refused by {host}")]
    ConnectionRefused {
        /// The host that refused the connection
        host: String,
    },
    /// SSL/TLS certificate validation failed
    #[error("SSL certificate validation failed: {reason}")]
    SslError {
        /// Reason for the SSL failure
        reason: String,
    },
    /// The request was cancelled before completion
    #[error("Request was cancelled")]
    Cancelled,
}

impl HttpError {
    /// Whether retrying the same request later may succeed.
    ///
    /// Server errors, throttling and network failures are transient; client errors and
    /// TLS failures are not.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::BadStatusCode { code, .. } => *code >= 500 || *code == 429,
            Self::NoConnectivity | Self::Timeout { .. } | Self::ConnectionRefused { .. } => true,
            Self::SslError { .. } | Self::Cancelled | Self::Generic { .. } => false,
        }
    }
}

/// Converts unexpected UniFFI callback errors to `HttpError`.
///
/// Foreign implementations of [`JiraHttpClient`] that throw an undeclared exception end
/// up here instead of panicking the Rust side. A bare status code is kept as such.
impl From<uniffi::UnexpectedUniFFICallbackError> for HttpError {
    fn from(error: uniffi::UnexpectedUniFFICallbackError) -> Self {
        error.reason.parse::<u64>().map_or_else(
            |_| Self::Generic {
                message: error.reason.clone(),
            },
            |code| Self::BadStatusCode {
                code,
                response_body: Vec::new(),
            },
        )
    }
}

/// [`JiraHttpClient`] backed by `reqwest`, authenticating every request with HTTP basic auth.
pub struct ReqwestJiraClient {
    client: reqwest::Client,
    username: String,
    password: String,
    timeout_secs: u64,
}

impl ReqwestJiraClient {
    /// Builds a client for the server described by `config`.
    ///
    /// # Errors
    /// - `ConfigurationError::InvalidServer` if the configuration fails validation or the
    ///   TLS backend cannot be initialized.
    pub fn new(config: &ServerConfig) -> Result<Self, ConfigurationError> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| ConfigurationError::InvalidServer {
                message: format!("failed to build HTTP client: {e}"),
            })?;

        if config.accept_invalid_certs {
            crate::warn!("tls.verification_disabled base_url={}", config.base_url);
        }

        Ok(Self {
            client,
            username: config.username.clone(),
            password: config.password.clone(),
            timeout_secs: config.timeout_secs,
        })
    }

    fn map_error(&self, error: &reqwest::Error) -> HttpError {
        if error.is_timeout() {
            HttpError::Timeout {
                seconds: self.timeout_secs,
            }
        } else if error.is_connect() {
            HttpError::ConnectionRefused {
                host: error
                    .url()
                    .and_then(reqwest::Url::host_str)
                    .unwrap_or_default()
                    .to_string(),
            }
        } else {
            HttpError::Generic {
                // The URL may carry identities in its query string
                message: Self::strip_url(error),
            }
        }
    }

    fn strip_url(error: &reqwest::Error) -> String {
        let mut message = error.to_string();
        if let Some(url) = error.url() {
            message = message.replace(url.as_str(), "<url>");
        }
        message
    }
}

#[async_trait::async_trait]
impl JiraHttpClient for ReqwestJiraClient {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
        };

        let mut builder = self
            .client
            .request(method, &request.url)
            .basic_auth(&self.username, Some(&self.password))
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(body) = request.body {
            builder = builder
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body);
        }

        let response = builder.send().await.map_err(|e| self.map_error(&e))?;
        let status = response.status();
        let body = response.bytes().await.map_err(|e| self.map_error(&e))?;

        if !status.is_success() {
            return Err(HttpError::BadStatusCode {
                code: u64::from(status.as_u16()),
                response_body: body.to_vec(),
            });
        }

        Ok(HttpResponse {
            status_code: status.as_u16(),
            body: body.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let server_error = HttpError::BadStatusCode {
            code: 503,
            response_body: Vec::new(),
        };
        let throttled = HttpError::BadStatusCode {
            code: 429,
            response_body: Vec::new(),
        };
        let not_found = HttpError::BadStatusCode {
            code: 404,
            response_body: Vec::new(),
        };

        assert!(server_error.is_transient());
        assert!(throttled.is_transient());
        assert!(!not_found.is_transient());
        assert!(HttpError::Timeout { seconds: 30 }.is_transient());
        assert!(!HttpError::Cancelled.is_transient());
    }

    #[test]
    fn test_mutating_methods() {
        assert!(!HttpMethod::Get.is_mutating());
        assert!(HttpMethod::Post.is_mutating());
        assert!(HttpMethod::Put.is_mutating());
        assert_eq!(HttpMethod::Put.as_str(), "PUT");
    }

    #[test]
    fn test_reqwest_client_rejects_invalid_config() {
        let config = ServerConfig {
            base_url: "not a url".to_string(),
            ..ServerConfig::default()
        };
        assert!(ReqwestJiraClient::new(&config).is_err());
    }
}
