//! Transport configuration shared by every call a client makes.
//!
//! [`ClientConfig`] is built once, validated by
//! [`OpenRouterClient::with_config`](crate::OpenRouterClient::with_config),
//! and then shared read-only behind an `Arc`. The library never reads the
//! environment itself; callers (such as the `openrouter` CLI) pass values in.

use crate::api::error::{Error, Result};
use crate::api::retry::RetryPolicy;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use url::Url;

/// Default API root. Endpoint paths are joined onto it.
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Connection and retry settings for an [`OpenRouterClient`](crate::OpenRouterClient).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API root, e.g. `https://openrouter.ai/api/v1`.
    pub base_url: String,
    /// Bearer credential. Redacted in `Debug` output.
    pub api_key: SecretString,
    /// Deadline for a whole non-streaming attempt (send + full body read).
    pub timeout: Duration,
    /// Deadline for establishing a TCP/TLS connection.
    pub connect_timeout: Duration,
    /// Longest silence tolerated between two reads of a streaming body.
    pub stream_idle_timeout: Duration,
    /// `HTTP-Referer` attribution header.
    pub referer: Option<String>,
    /// `X-Title` attribution header.
    pub title: Option<String>,
    /// Extra headers sent with every request.
    pub headers: Vec<(String, String)>,
    pub user_agent: String,
    pub retry: RetryPolicy,
}

impl ClientConfig {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
    pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
    pub const DEFAULT_STREAM_IDLE_TIMEOUT: Duration = Duration::from_secs(120);
    pub const DEFAULT_USER_AGENT: &'static str =
        concat!("openrouter-client/", env!("CARGO_PKG_VERSION"));

    /// A config for the public API with default timeouts and retry policy.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: SecretString::new(api_key.into()),
            timeout: Self::DEFAULT_TIMEOUT,
            connect_timeout: Self::DEFAULT_CONNECT_TIMEOUT,
            stream_idle_timeout: Self::DEFAULT_STREAM_IDLE_TIMEOUT,
            referer: None,
            title: None,
            headers: Vec::new(),
            user_agent: Self::DEFAULT_USER_AGENT.to_string(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_stream_idle_timeout(mut self, timeout: Duration) -> Self {
        self.stream_idle_timeout = timeout;
        self
    }

    /// Set the `HTTP-Referer` and `X-Title` headers OpenRouter uses for app
    /// attribution.
    pub fn with_attribution(mut self, referer: impl Into<String>, title: impl Into<String>) -> Self {
        self.referer = Some(referer.into());
        self.title = Some(title.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub(crate) fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }

    /// Parse the base URL, normalized to end in `/` so relative endpoint
    /// paths join below it instead of replacing its last segment.
    pub(crate) fn parsed_base_url(&self) -> Result<Url> {
        let mut url = Url::parse(self.base_url.trim())
            .map_err(|e| Error::validation("base_url", format!("{e}: {:?}", self.base_url)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::validation(
                "base_url",
                format!("unsupported scheme {:?}", url.scheme()),
            ));
        }
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(url)
    }

    /// Attribution and custom headers, validated. The credential is injected
    /// per request by the dispatcher and is not part of this map.
    pub(crate) fn default_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(referer) = &self.referer {
            headers.insert(
                HeaderName::from_static("http-referer"),
                header_value("referer", referer)?,
            );
        }
        if let Some(title) = &self.title {
            headers.insert(
                HeaderName::from_static("x-title"),
                header_value("title", title)?,
            );
        }
        for (name, value) in &self.headers {
            let header_name = HeaderName::try_from(name.as_str())
                .map_err(|e| Error::validation("headers", format!("bad header name {name:?}: {e}")))?;
            headers.insert(header_name, header_value("headers", value)?);
        }
        Ok(headers)
    }

    /// Check everything that can be checked without a network call.
    pub fn validate(&self) -> Result<()> {
        if self.api_key().trim().is_empty() {
            return Err(Error::validation("api_key", "must not be empty"));
        }
        if self.timeout.is_zero() {
            return Err(Error::validation("timeout", "must be greater than zero"));
        }
        if self.stream_idle_timeout.is_zero() {
            return Err(Error::validation(
                "stream_idle_timeout",
                "must be greater than zero",
            ));
        }
        self.retry.validate()?;
        self.parsed_base_url()?;
        self.default_headers()?;
        Ok(())
    }
}

fn header_value(field: &str, value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| Error::validation(field, format!("bad header value {value:?}: {e}")))
}
