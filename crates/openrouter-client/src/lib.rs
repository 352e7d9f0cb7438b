//! Async client for the [OpenRouter](https://openrouter.ai/) LLM gateway.
//!
//! `openrouter-client` turns typed requests (messages, tools, sampling
//! parameters, provider routing preferences) into authenticated HTTPS calls,
//! retries transient failures with capped exponential backoff, and decodes
//! both buffered JSON responses and live Server-Sent-Event streams.
//!
//! # Getting started
//!
//! ```ignore
//! use futures::StreamExt;
//! use openrouter_client::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = OpenRouterClient::new(std::env::var("OPENROUTER_API_KEY").unwrap())?;
//!
//!     let request = ChatRequest::new(
//!         "anthropic/claude-sonnet-4",
//!         vec![Message::system("Be brief."), Message::user("Why is the sky blue?")],
//!     );
//!
//!     // Buffered.
//!     let response = client.chat(&request).await?;
//!     println!("{}", response.content().unwrap_or_default());
//!
//!     // Streamed.
//!     let mut stream = client.chat_stream(&request).await?;
//!     while let Some(event) = stream.next().await {
//!         print!("{}", event.content().unwrap_or_default());
//!     }
//!     if let Some(err) = stream.err() {
//!         eprintln!("stream failed: {err}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Where to find things
//!
//! - **Configure timeouts, retries, attribution headers:** [`ClientConfig`]
//!   and [`RetryPolicy`], passed to [`OpenRouterClient::with_config`].
//! - **Branch on failures:** [`Error`] is one of `Validation`, `Api`,
//!   `Transport`, or `Cancelled`; [`Error::is_retryable`] tells which ones the
//!   client already retried.
//! - **Consume streams:** [`ChatStream`] is a [`futures::Stream`] of
//!   [`StreamEvent`]s. Check [`ChatStream::err`] after it ends.
//!   [`StreamAccumulator`] and [`api::streaming::assemble_tool_calls`] fold
//!   deltas back into whole messages and tool calls.
//! - **Observe requests:** implement [`EventHandler`], or keep the default
//!   [`LoggingHandler`] which reports through `tracing`.
//! - **Cancel:** give the client a `CancellationToken` with
//!   [`OpenRouterClient::with_cancellation`].
//! - **Everything else OpenRouter exposes:** models, providers, credits,
//!   activity, keys, and generation stats are in [`endpoints`].
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`api`] | Config, dispatch, retry, error taxonomy, SSE streaming, events |
//! | [`chat`] | Chat request, message, tool, and routing-preference types |
//! | [`completion`] | Legacy prompt completion request |
//! | [`response`] | Buffered response types |
//! | [`endpoints`] | REST endpoint glue |

pub mod api;
pub mod chat;
pub mod client;
pub mod completion;
pub mod endpoints;
pub mod prelude;
pub mod response;

use schemars::JsonSchema;

pub use api::{
    ApiError, ChatStream, ClientConfig, ClientEvent, DEFAULT_BASE_URL, Error, EventHandler,
    FnEventHandler, LoggingHandler, NoopHandler, Result, RetryPolicy, StreamAccumulator,
    StreamEvent, TransportError, TransportKind,
};
pub use chat::{
    ChatRequest, ContentPart, Message, MessageContent, MessageRole, Plugin, ProviderPreferences,
    ReasoningConfig, ToolCall, ToolChoice, ToolDef, Validate,
};
pub use client::OpenRouterClient;
pub use completion::CompletionRequest;
pub use response::{ChatResponse, CompletionResponse, Usage};

// Re-export schemars for downstream crates.
pub use schemars;

/// Default model for the command-line harness.
pub const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";

/// Generate a JSON Schema `serde_json::Value` from a type that implements
/// `schemars::JsonSchema`, for use as tool `parameters`.
///
/// # Example
///
/// ```
/// use openrouter_client::json_schema_for;
/// use schemars::JsonSchema;
/// use serde::Deserialize;
///
/// #[derive(Deserialize, JsonSchema)]
/// struct WeatherArgs {
///     city: String,
///     #[serde(default)]
///     unit: Option<String>,
/// }
///
/// let schema = json_schema_for::<WeatherArgs>();
/// assert_eq!(schema["type"], "object");
/// assert!(schema["required"].as_array().unwrap().contains(&"city".into()));
/// ```
pub fn json_schema_for<T: JsonSchema>() -> serde_json::Value {
    let schema = schemars::schema_for!(T);
    serde_json::to_value(schema)
        .unwrap_or_else(|_| serde_json::json!({"type": "object", "properties": {}}))
}
