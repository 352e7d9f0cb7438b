//! Request dispatch: validate, authenticate, send with retries, decode.
//!
//! Every buffered operation funnels through [`OpenRouterClient::dispatch`]
//! or [`OpenRouterClient::get`]. One attempt is "send + read the whole body +
//! classify the status"; the retry executor decides whether to repeat it.
//! Streaming operations share the request building and status
//! classification but make exactly one attempt and hand the open body to a
//! [`ChatStream`].

use crate::api::error::{ApiError, Error, Result, TransportError, TransportKind};
use crate::api::error::{classify_reqwest, classify_status, in_band_error};
use crate::api::events::{ClientEvent, generate_request_id};
use crate::api::retry::{self, RetryPolicy};
use crate::api::streaming::{ChatStream, ReaderContext};
use crate::chat::Validate;
use crate::client::OpenRouterClient;
use bytes::Bytes;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Method, RequestBuilder};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::time::Instant;
use tracing::{debug, trace};
use url::Url;

const JSON: &str = "application/json";
const EVENT_STREAM: &str = "text/event-stream";

/// Check a caller-supplied value that becomes one URL path segment.
pub(crate) fn path_segment<'a>(field: &str, value: &'a str) -> Result<&'a str> {
    if value.trim().is_empty() {
        return Err(Error::validation(field, "must not be empty"));
    }
    if value
        .chars()
        .any(|c| matches!(c, '/' | '?' | '#' | '%') || c.is_whitespace() || c.is_control())
        || value == "."
        || value == ".."
    {
        return Err(Error::validation(
            field,
            format!("{value:?} is not a valid path segment"),
        ));
    }
    Ok(value)
}

impl OpenRouterClient {
    /// Send a JSON request and decode a JSON response.
    ///
    /// `path` is relative to the configured base URL (`"chat/completions"`,
    /// `"keys/abc"`). The body, when present, is validated before anything is
    /// sent. Transient failures are retried under the client's
    /// [`RetryPolicy`]; the error of the last attempt is returned.
    pub async fn dispatch<Req, Resp>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Req>,
    ) -> Result<Resp>
    where
        Req: Serialize + Validate + ?Sized,
        Resp: DeserializeOwned,
    {
        let url = self.endpoint_url(path)?;
        let body = match body {
            Some(body) => {
                body.validate()?;
                Some(encode(body)?)
            }
            None => None,
        };
        self.execute_json(method, url, path, body).await
    }

    /// `GET path?query` and decode the JSON response.
    pub async fn get<Resp>(&self, path: &str, query: &[(&str, String)]) -> Result<Resp>
    where
        Resp: DeserializeOwned,
    {
        let mut url = self.endpoint_url(path)?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        self.execute_json(Method::GET, url, path, None).await
    }

    pub(crate) fn endpoint_url(&self, path: &str) -> Result<Url> {
        if path.is_empty() || path.starts_with('/') || path.contains("://") {
            return Err(Error::validation(
                "path",
                format!("{path:?} must be relative to the base URL"),
            ));
        }
        self.inner
            .base_url
            .join(path)
            .map_err(|e| Error::validation("path", format!("{path:?}: {e}")))
    }

    fn request(&self, method: Method, url: Url, accept: &str, body: Option<Bytes>) -> RequestBuilder {
        let builder = self
            .inner
            .http
            .request(method, url)
            .bearer_auth(self.inner.config.api_key())
            .header(ACCEPT, accept);
        match body {
            Some(body) => builder.header(CONTENT_TYPE, JSON).body(body),
            None => builder,
        }
    }

    async fn execute_json<Resp>(
        &self,
        method: Method,
        url: Url,
        path: &str,
        body: Option<Bytes>,
    ) -> Result<Resp>
    where
        Resp: DeserializeOwned,
    {
        let request_id = generate_request_id();
        self.events.on_event(&ClientEvent::RequestStarted {
            request_id: &request_id,
            method: &method,
            path,
        });
        trace!(
            request_id = %request_id,
            "Request body size: {} bytes",
            body.as_ref().map_or(0, |b| b.len())
        );

        let start = Instant::now();
        let attempts = AtomicU32::new(0);
        let policy: &RetryPolicy = &self.inner.config.retry;
        let (status, text) = retry::execute(
            policy,
            &self.cancel,
            |n| {
                attempts.store(n, Ordering::Relaxed);
                self.attempt(&method, &url, body.clone())
            },
            |failure| {
                self.events.on_event(&ClientEvent::AttemptFailed {
                    request_id: &request_id,
                    attempt: failure.attempt,
                    max_attempts: failure.max_attempts,
                    error: failure.error,
                    retry_in: failure.retry_in,
                })
            },
        )
        .await?;

        self.events.on_event(&ClientEvent::ResponseReceived {
            request_id: &request_id,
            status,
            attempts: attempts.load(Ordering::Relaxed),
            elapsed: start.elapsed(),
        });

        serde_json::from_str(&text).map_err(|e| Error::Api(ApiError::decode(status, &e, text)))
    }

    /// One round trip. Only a 2xx with a fully read, error-free body is `Ok`.
    async fn attempt(&self, method: &Method, url: &Url, body: Option<Bytes>) -> Result<(u16, String)> {
        let request = self
            .request(method.clone(), url.clone(), JSON, body)
            .timeout(self.inner.config.timeout);
        let exchange = async {
            let response = request.send().await.map_err(classify_reqwest)?;
            let status = response.status();
            let headers = response.headers().clone();
            let text = response.text().await.map_err(classify_reqwest)?;
            if !status.is_success() {
                return Err(classify_status(status, &headers, &text));
            }
            if let Some(err) = in_band_error(status.as_u16(), &text) {
                return Err(err);
            }
            Ok((status.as_u16(), text))
        };
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
            result = exchange => result,
        }
    }

    /// POST `body` to `path` and open its SSE response as a [`ChatStream`].
    ///
    /// A single attempt: a failed handshake or non-2xx status is returned as
    /// is, never retried. Only the handshake is bounded by the request
    /// timeout; the body is bounded by the stream idle timeout per read.
    pub(crate) async fn open_stream<Req>(&self, path: &str, body: &Req) -> Result<ChatStream>
    where
        Req: Serialize + ?Sized,
    {
        let url = self.endpoint_url(path)?;
        let body = encode(body)?;
        let request_id = generate_request_id();
        self.events.on_event(&ClientEvent::RequestStarted {
            request_id: &request_id,
            method: &Method::POST,
            path,
        });

        let result = self.establish(url, body).await;
        let response = match result {
            Ok(response) => response,
            Err(err) => {
                self.events.on_event(&ClientEvent::AttemptFailed {
                    request_id: &request_id,
                    attempt: 1,
                    max_attempts: 1,
                    error: &err,
                    retry_in: None,
                });
                return Err(err);
            }
        };

        let status = response.status().as_u16();
        self.events.on_event(&ClientEvent::StreamOpened {
            request_id: &request_id,
            status,
        });
        debug!(request_id = %request_id, "Reading event stream");
        Ok(ChatStream::spawn(
            response.bytes_stream(),
            ReaderContext {
                cancel: self.cancel.clone(),
                idle_timeout: self.inner.config.stream_idle_timeout,
                request_id,
                events: self.events.clone(),
                status,
            },
        ))
    }

    /// Send the streaming request and wait for a 2xx status line.
    async fn establish(&self, url: Url, body: Bytes) -> Result<reqwest::Response> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let timeout = self.inner.config.timeout;
        let request = self.request(Method::POST, url, EVENT_STREAM, Some(body));
        let handshake = async {
            let response = tokio::time::timeout(timeout, request.send())
                .await
                .map_err(|_| {
                    Error::Transport(TransportError::new(
                        TransportKind::Timeout,
                        format!("no response within {timeout:?}"),
                    ))
                })?
                .map_err(classify_reqwest)?;
            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }
            let headers = response.headers().clone();
            let text = tokio::time::timeout(timeout, response.text())
                .await
                .map_err(|_| {
                    Error::Transport(TransportError::new(
                        TransportKind::Timeout,
                        "error body not received in time",
                    ))
                })?
                .map_err(classify_reqwest)?;
            Err(classify_status(status, &headers, &text))
        };
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
            result = handshake => result,
        }
    }
}

fn encode<T: Serialize + ?Sized>(body: &T) -> Result<Bytes> {
    serde_json::to_vec(body)
        .map(Bytes::from)
        .map_err(|e| Error::validation("body", e.to_string()))
}
