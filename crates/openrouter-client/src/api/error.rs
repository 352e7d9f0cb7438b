//! Error taxonomy and classification.
//!
//! Every failure the client can produce is one of four kinds:
//!
//! - [`Error::Validation`]: the caller broke a local precondition. Detected
//!   before any network traffic; never retried.
//! - [`Error::Api`]: the server answered, but not with a usable success
//!   (non-2xx status, undecodable 2xx body, or an in-band stream error).
//! - [`Error::Transport`]: connect/DNS/TLS/timeout/body-read failure before a
//!   complete response was received.
//! - [`Error::Cancelled`]: the caller's cancellation token fired.
//!
//! [`classify_status`] and [`TransportError::from`] are the only places that
//! turn raw HTTP outcomes into these kinds.

use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result type for every fallible client operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by [`OpenRouterClient`](crate::OpenRouterClient) and
/// [`ChatStream`](crate::api::streaming::ChatStream).
#[derive(Debug, Error)]
pub enum Error {
    /// Caller-side contract violation.
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    /// The server responded with something other than a usable success.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The request never produced a complete response.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The operation was cancelled by the caller.
    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Whether re-attempting the same operation has a reasonable chance of
    /// success.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Validation { .. } | Error::Cancelled => false,
            Error::Api(api) => api.is_retryable(),
            Error::Transport(_) => true,
        }
    }

    /// HTTP status code, when the server produced one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Api(api) => Some(api.status),
            _ => None,
        }
    }

    pub fn as_api(&self) -> Option<&ApiError> {
        match self {
            Error::Api(api) => Some(api),
            _ => None,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

// ── API errors ─────────────────────────────────────────────────────

/// A non-success answer from the server.
#[derive(Debug, Clone)]
pub struct ApiError {
    /// HTTP status code (for in-band stream errors: the provider's code when
    /// numeric, otherwise the status of the stream response).
    pub status: u16,
    /// Human-readable message from the error body. Empty when the body could
    /// not be parsed.
    pub message: String,
    /// Provider-specific error subtype, preserved verbatim.
    pub error_type: Option<String>,
    /// The `code` field of the error body as sent (number or string).
    pub code: Option<serde_json::Value>,
    /// Provider metadata (`provider_name`, upstream `raw` error, ...).
    pub metadata: Option<serde_json::Value>,
    /// The unparsed response body.
    pub raw_body: String,
    /// Server-requested wait from a `Retry-After` header.
    pub retry_after: Option<Duration>,
    decode_failure: bool,
}

impl ApiError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            error_type: None,
            code: None,
            metadata: None,
            raw_body: String::new(),
            retry_after: None,
            decode_failure: false,
        }
    }

    /// A success status whose body (or stream frame) did not match the
    /// expected shape.
    pub fn decode(status: u16, err: impl fmt::Display, raw_body: impl Into<String>) -> Self {
        Self {
            raw_body: raw_body.into(),
            decode_failure: true,
            ..Self::new(status, format!("failed to decode response: {err}"))
        }
    }

    /// Whether this error came from decoding a success body rather than from
    /// the server rejecting the request.
    pub fn is_decode_failure(&self) -> bool {
        self.decode_failure
    }

    /// 408, 429 and 5xx are worth another attempt. Decode failures are a
    /// protocol mismatch and never are.
    pub fn is_retryable(&self) -> bool {
        !self.decode_failure && is_retryable_status(self.status)
    }

    /// The upstream provider named in the error metadata, if any.
    pub fn provider_name(&self) -> Option<&str> {
        self.metadata.as_ref()?.get("provider_name")?.as_str()
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.decode_failure {
            return write!(f, "OpenRouter API HTTP {}: {}", self.status, self.message);
        }
        let message = if self.message.is_empty() {
            self.raw_body.as_str()
        } else {
            self.message.as_str()
        };
        match &self.error_type {
            Some(t) => write!(f, "OpenRouter API HTTP {} ({t}): {message}", self.status),
            None => write!(f, "OpenRouter API HTTP {}: {message}", self.status),
        }
    }
}

impl std::error::Error for ApiError {}

/// Whether an HTTP status is retry-eligible on its own.
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 429) || status >= 500
}

/// Error envelope returned by the API: `{"error": {...}}`.
#[derive(Deserialize, Debug)]
pub(crate) struct ErrorEnvelope {
    pub(crate) error: ErrorBody,
}

/// The inner error object. Also appears in-band inside stream chunks.
#[derive(Deserialize, Debug, Clone)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub(crate) code: Option<serde_json::Value>,
    #[serde(default)]
    pub(crate) message: Option<String>,
    #[serde(default, rename = "type")]
    pub(crate) error_type: Option<String>,
    #[serde(default)]
    pub(crate) metadata: Option<serde_json::Value>,
}

impl ErrorBody {
    /// Numeric `code`, accepting both `502` and `"502"`.
    pub(crate) fn numeric_code(&self) -> Option<u16> {
        match self.code.as_ref()? {
            serde_json::Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
            serde_json::Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub(crate) fn into_api_error(self, status: u16, raw_body: String) -> ApiError {
        ApiError {
            status,
            message: self.message.unwrap_or_default(),
            error_type: self.error_type,
            code: self.code,
            metadata: self.metadata,
            raw_body,
            retry_after: None,
            decode_failure: false,
        }
    }
}

/// Classify a non-success HTTP response.
///
/// Unparseable bodies still produce an [`ApiError`] with `raw_body` set and an
/// empty `message`; retry eligibility always follows the status code.
pub fn classify_status(status: StatusCode, headers: &HeaderMap, body: &str) -> Error {
    let mut api = match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => envelope
            .error
            .into_api_error(status.as_u16(), body.to_string()),
        Err(_) => ApiError {
            raw_body: body.to_string(),
            ..ApiError::new(status.as_u16(), "")
        },
    };
    api.retry_after = parse_retry_after(headers);
    Error::Api(api)
}

/// A 2xx body that is only an error envelope, as the gateway sends when a
/// provider fails after the status line was committed.
///
/// The envelope's numeric `code` stands in for the status so retry
/// eligibility follows the provider failure rather than the `200`.
pub(crate) fn in_band_error(status: u16, body: &str) -> Option<Error> {
    let envelope = serde_json::from_str::<ErrorEnvelope>(body).ok()?;
    let status = envelope.error.numeric_code().unwrap_or(status);
    Some(Error::Api(envelope.error.into_api_error(status, body.to_string())))
}

/// `Retry-After` in delta-seconds. HTTP-date values are ignored.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?;
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

// ── Transport errors ───────────────────────────────────────────────

/// What went wrong below HTTP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// DNS, TCP connect, TLS handshake.
    Connect,
    /// A request or idle-read deadline elapsed.
    Timeout,
    /// The connection failed while the body was being read.
    Body,
    /// Anything else reported by the HTTP stack.
    Other,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Connect => write!(f, "connect"),
            TransportKind::Timeout => write!(f, "timeout"),
            TransportKind::Body => write!(f, "body"),
            TransportKind::Other => write!(f, "request"),
        }
    }
}

/// A failure before a complete response was received. The underlying cause
/// is kept as the error source.
#[derive(Debug, Error)]
#[error("{kind} error: {source}")]
pub struct TransportError {
    pub kind: TransportKind,
    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

impl TransportError {
    pub fn new(
        kind: TransportKind,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            kind,
            source: source.into(),
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            TransportKind::Timeout
        } else if err.is_connect() {
            TransportKind::Connect
        } else if err.is_body() || err.is_decode() {
            TransportKind::Body
        } else {
            TransportKind::Other
        };
        Self::new(kind, err)
    }
}

/// Map a reqwest failure to the taxonomy. Requests that could not even be
/// built are a caller problem, not a network one.
pub(crate) fn classify_reqwest(err: reqwest::Error) -> Error {
    if err.is_builder() {
        return Error::validation("request", err.to_string());
    }
    Error::Transport(err.into())
}
