use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use reqwest::Url;
use serde::{de::DeserializeOwned, Serialize};

use crate::primitives::{HttpError, HttpMethod, HttpRequest, HttpResponse, JiraHttpClient};
use crate::{ConfigurationError, RetryPolicy};

/// Query builders for the searches the migrators run.
pub mod jql;

/// Wire payloads of the REST endpoints used by the migrators.
pub mod model;

/// Offset-based pagination over listing endpoints.
pub mod pagination;

pub use pagination::{Continuation, ListingEndpoint, Page, PageParams, Paginator};

const MAX_ERROR_BODY_CHARS: usize = 200;

/// Errors returned by [`JiraClient`].
#[crate::handover_error]
pub enum RemoteError {
    /// The server answered with a non-2xx status
    #[error("{method} {endpoint} returned {code}: {message}")]
    BadStatus {
        /// HTTP method of the failed request
        method: String,
        /// Path of the failed request, without query string
        endpoint: String,
        /// HTTP status code
        code: u16,
        /// Error text extracted from the response body
        message: String,
    },

    /// The request did not produce a response
    #[error("{method} {endpoint} failed: {source}")]
    Transport {
        /// HTTP method of the failed request
        method: String,
        /// Path of the failed request, without query string
        endpoint: String,
        /// The underlying transport error
        #[source]
        source: HttpError,
    },

    /// The response body did not have the expected shape
    #[error("unexpected response from {endpoint}: {message}")]
    Decode {
        /// Path of the request
        endpoint: String,
        /// Decoder error
        message: String,
    },

    /// A URL taken from an input file does not belong to the configured server
    #[error("{url} is not an endpoint of the configured server")]
    ForeignEndpoint {
        /// The rejected URL
        url: String,
    },
}

impl RemoteError {
    /// Whether the server refused an addition because the target is already a member.
    ///
    /// Group and role endpoints answer 400 or 409 in that case. The migrators treat it as
    /// success so that re-running a pair is harmless.
    #[must_use]
    pub fn is_already_member(&self) -> bool {
        match self {
            Self::BadStatus { code, message, .. } => {
                matches!(code, 400 | 409) && message.to_lowercase().contains("already")
            }
            _ => false,
        }
    }

    /// HTTP status code for [`RemoteError::BadStatus`].
    #[must_use]
    pub const fn status_code(&self) -> Option<u16> {
        match self {
            Self::BadStatus { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Typed, retrying access to the issue tracker REST API.
///
/// Every URL the client produces is rooted at the configured base URL, which may carry a
/// context path (`https://host/jira`).
pub struct JiraClient {
    http: Arc<dyn JiraHttpClient>,
    base_url: Url,
    retry: RetryPolicy,
}

impl JiraClient {
    /// Creates a client talking through `http` to the server at `base_url`.
    ///
    /// # Errors
    /// - `ConfigurationError::InvalidServer` if `base_url` is not an absolute http(s) URL.
    pub fn new(
        http: Arc<dyn JiraHttpClient>,
        base_url: &str,
        retry: RetryPolicy,
    ) -> Result<Self, ConfigurationError> {
        let base_url = Url::parse(base_url.trim()).map_err(|e| {
            ConfigurationError::InvalidServer {
                message: format!("failed to parse base URL: {e}"),
            }
        })?;
        if !matches!(base_url.scheme(), "http" | "https") || base_url.cannot_be_a_base() {
            return Err(ConfigurationError::InvalidServer {
                message: format!("base URL must be an http(s) URL: {base_url}"),
            });
        }

        Ok(Self {
            http,
            base_url,
            retry,
        })
    }

    /// The configured base URL.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Builds the URL for a path below the base URL. Each segment is percent-encoded.
    #[must_use]
    pub fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        url.set_query(None);
        url.set_fragment(None);
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Same as [`JiraClient::endpoint`], with query parameters appended.
    #[must_use]
    pub fn endpoint_with_query(&self, segments: &[&str], query: &[(&str, &str)]) -> Url {
        let mut url = self.endpoint(segments);
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        url
    }

    /// Parses a URL taken from an input file and checks that it points at this server.
    ///
    /// # Errors
    /// - `RemoteError::ForeignEndpoint` if the URL does not parse, or its origin or path
    ///   prefix differs from the base URL.
    pub fn resolve_on_server(&self, raw: &str) -> Result<Url, RemoteError> {
        let foreign = || RemoteError::ForeignEndpoint {
            url: raw.to_string(),
        };
        let url = Url::parse(raw.trim()).map_err(|_| foreign())?;

        let base_path = self.base_url.path().trim_end_matches('/');
        let same_origin = url.origin() == self.base_url.origin();
        let under_base = url.path() == base_path
            || url
                .path()
                .strip_prefix(base_path)
                .is_some_and(|rest| rest.starts_with('/'));

        if same_origin && under_base {
            Ok(url)
        } else {
            Err(foreign())
        }
    }

    /// Sends a GET request and decodes the JSON response.
    ///
    /// # Errors
    /// - `RemoteError::BadStatus` / `RemoteError::Transport` if the request fails
    /// - `RemoteError::Decode` if the response is not the expected JSON
    pub async fn get_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T, RemoteError> {
        let response = self.send(HttpMethod::Get, url, None).await?;
        decode(url, &response.body)
    }

    /// Sends a POST request with a JSON body and decodes the JSON response.
    ///
    /// # Errors
    /// - `RemoteError::BadStatus` / `RemoteError::Transport` if the request fails
    /// - `RemoteError::Decode` if the body cannot be encoded or the response decoded
    pub async fn post_json<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        url: &Url,
        body: &B,
    ) -> Result<T, RemoteError> {
        let response = self.send(HttpMethod::Post, url, Some(encode(url, body)?)).await?;
        decode(url, &response.body)
    }

    /// Sends a POST request with a JSON body, ignoring the response body.
    ///
    /// # Errors
    /// - `RemoteError::BadStatus` / `RemoteError::Transport` if the request fails
    /// - `RemoteError::Decode` if the body cannot be encoded
    pub async fn post<B: Serialize + Sync>(&self, url: &Url, body: &B) -> Result<(), RemoteError> {
        self.send(HttpMethod::Post, url, Some(encode(url, body)?))
            .await
            .map(|_| ())
    }

    /// Sends a PUT request with an optional JSON body, ignoring the response body.
    ///
    /// # Errors
    /// - `RemoteError::BadStatus` / `RemoteError::Transport` if the request fails
    /// - `RemoteError::Decode` if the body cannot be encoded
    pub async fn put<B: Serialize + Sync>(
        &self,
        url: &Url,
        body: Option<&B>,
    ) -> Result<(), RemoteError> {
        let body = body.map(|body| encode(url, body)).transpose()?;
        self.send(HttpMethod::Put, url, body).await.map(|_| ())
    }

    /// Sends a request, retrying transient failures according to the retry policy.
    ///
    /// Every request the migrators issue is idempotent (reads, searches, "set field to X",
    /// "add member X"), so all of them are retried.
    ///
    /// # Errors
    /// - `RemoteError::BadStatus` for a non-2xx response that is final
    /// - `RemoteError::Transport` for any other transport failure that is final
    pub async fn send(
        &self,
        method: HttpMethod,
        url: &Url,
        body: Option<Vec<u8>>,
    ) -> Result<HttpResponse, RemoteError> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let request = HttpRequest {
                method,
                url: url.to_string(),
                body: body.clone(),
            };

            match self.http.send(request).await {
                Ok(response) => return Ok(response),
                Err(error) if error.is_transient() && attempt < max_attempts => {
                    let delay_ms = self.retry.backoff_delay_ms(attempt);
                    crate::warn!(
                        "remote.retry method={} endpoint={} attempt={attempt} delay_ms={delay_ms} error=\"{error}\" timestamp={}",
                        method.as_str(),
                        url.path(),
                        Utc::now().to_rfc3339()
                    );
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                }
                Err(error) => return Err(Self::map_http_error(method, url, error)),
            }
        }
    }

    fn map_http_error(method: HttpMethod, url: &Url, error: HttpError) -> RemoteError {
        match error {
            HttpError::BadStatusCode {
                code,
                response_body,
            } => RemoteError::BadStatus {
                method: method.as_str().to_string(),
                endpoint: url.path().to_string(),
                code: u16::try_from(code).unwrap_or(u16::MAX),
                message: describe_error_body(&response_body),
            },
            other => RemoteError::Transport {
                method: method.as_str().to_string(),
                endpoint: url.path().to_string(),
                source: other,
            },
        }
    }
}

fn encode<B: Serialize>(url: &Url, body: &B) -> Result<Vec<u8>, RemoteError> {
    serde_json::to_vec(body).map_err(|e| RemoteError::Decode {
        endpoint: url.path().to_string(),
        message: format!("failed to encode request body: {e}"),
    })
}

fn decode<T: DeserializeOwned>(url: &Url, body: &[u8]) -> Result<T, RemoteError> {
    serde_json::from_slice(body).map_err(|e| RemoteError::Decode {
        endpoint: url.path().to_string(),
        message: e.to_string(),
    })
}

/// Extracts a readable message from an error response.
///
/// Understands the `{"errorMessages": [...], "errors": {...}}` shape and falls back to
/// the start of the raw body.
#[must_use]
pub fn describe_error_body(body: &[u8]) -> String {
    if let Ok(payload) = serde_json::from_slice::<model::ErrorPayload>(body) {
        let messages: Vec<String> = payload
            .error_messages
            .into_iter()
            .chain(payload.errors.into_iter().map(|(field, message)| format!("{field}: {message}")))
            .chain(payload.message)
            .collect();
        if !messages.is_empty() {
            return messages.join("; ");
        }
    }

    let text = String::from_utf8_lossy(body);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return "empty response body".to_string();
    }
    trimmed.chars().take(MAX_ERROR_BODY_CHARS).collect()
}
