//! The [`OpenRouterClient`] handle and the completion operations.
//!
//! REST endpoint glue lives in [`crate::endpoints`]; request dispatch and
//! stream establishment live in [`crate::api::dispatch`].

use crate::api::config::ClientConfig;
use crate::api::error::{Error, Result};
use crate::api::events::{EventHandler, LoggingHandler};
use crate::api::streaming::ChatStream;
use crate::chat::{ChatRequest, Validate};
use crate::completion::CompletionRequest;
use crate::response::{ChatResponse, CompletionResponse};
use reqwest::Method;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use url::Url;

/// State shared by every clone of a client. Immutable after construction.
pub(crate) struct ClientInner {
    pub(crate) http: reqwest::Client,
    pub(crate) config: ClientConfig,
    pub(crate) base_url: Url,
}

/// Async client for the OpenRouter API.
///
/// Cheap to clone; clones share the connection pool and configuration. Safe
/// to use from many tasks at once.
#[derive(Clone)]
pub struct OpenRouterClient {
    pub(crate) inner: Arc<ClientInner>,
    pub(crate) events: Arc<dyn EventHandler>,
    pub(crate) cancel: CancellationToken,
}

impl OpenRouterClient {
    /// A client for the public API with default settings.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_config(ClientConfig::new(api_key))
    }

    /// A client using `config`, which is validated here.
    pub fn with_config(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let base_url = config.parsed_base_url()?;
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .connect_timeout(config.connect_timeout)
            .default_headers(config.default_headers()?)
            .build()
            .map_err(|e| Error::validation("http_client", e.to_string()))?;
        debug!(base_url = %base_url, "OpenRouter client ready");
        Ok(Self {
            inner: Arc::new(ClientInner {
                http,
                config,
                base_url,
            }),
            events: Arc::new(LoggingHandler),
            cancel: CancellationToken::new(),
        })
    }

    /// Report request lifecycle events to `handler` instead of the default
    /// [`LoggingHandler`].
    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.events = handler;
        self
    }

    /// Tie every call made through this handle to `token`: cancelling it
    /// aborts in-flight requests, backoff waits and open streams with
    /// [`Error::Cancelled`].
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    // ── Chat completions ───────────────────────────────────────────

    /// Send a chat completion request and wait for the full response.
    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        request.validate()?;
        debug!(
            "Chat request: model={}, messages={}, tools={}",
            request.model_label(),
            request.messages.len(),
            request.tools.as_ref().map_or(0, |t| t.len()),
        );
        let body = with_stream_flag(request, false)?;
        let response: ChatResponse = self
            .dispatch(Method::POST, "chat/completions", Some(&body))
            .await?;
        if let Some(usage) = &response.usage {
            trace!(
                "Token usage: prompt={}, completion={}, total={}",
                usage.prompt_tokens, usage.completion_tokens, usage.total_tokens,
            );
        }
        Ok(response)
    }

    /// Send a chat completion request with `stream: true` and return the
    /// live event stream. Establishing the stream is a single attempt.
    pub async fn chat_stream(&self, request: &ChatRequest) -> Result<ChatStream> {
        request.validate()?;
        debug!(
            "Streaming chat request: model={}, messages={}",
            request.model_label(),
            request.messages.len(),
        );
        let body = with_stream_flag(request, true)?;
        self.open_stream("chat/completions", &body).await
    }

    // ── Legacy completions ─────────────────────────────────────────

    /// Complete a raw prompt and wait for the full response.
    pub async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse> {
        request.validate()?;
        let body = with_stream_flag(request, false)?;
        self.dispatch(Method::POST, "completions", Some(&body)).await
    }

    /// Complete a raw prompt as a stream; text arrives in `choices[].text`.
    pub async fn complete_stream(&self, request: &CompletionRequest) -> Result<ChatStream> {
        request.validate()?;
        let body = with_stream_flag(request, true)?;
        self.open_stream("completions", &body).await
    }
}

impl std::fmt::Debug for OpenRouterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenRouterClient")
            .field("base_url", &self.inner.base_url.as_str())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Serialize `request` with its `stream` field forced: `true` for streaming,
/// omitted otherwise.
fn with_stream_flag(request: &impl Serialize, stream: bool) -> Result<serde_json::Value> {
    let mut body =
        serde_json::to_value(request).map_err(|e| Error::validation("request", e.to_string()))?;
    let Some(object) = body.as_object_mut() else {
        return Err(Error::validation("request", "must serialize to a JSON object"));
    };
    if stream {
        object.insert("stream".to_string(), serde_json::Value::Bool(true));
    } else {
        object.remove("stream");
    }
    Ok(body)
}
