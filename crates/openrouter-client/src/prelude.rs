//! Convenience re-exports for common `openrouter-client` types.
//!
//! ```ignore
//! use openrouter_client::prelude::*;
//! ```
//!
//! Endpoint payload types (models, keys, generation stats) are left out;
//! import those from [`crate::endpoints`] when needed.

// ── Client ──────────────────────────────────────────────────────────
pub use crate::{ClientConfig, OpenRouterClient, RetryPolicy};

// ── Requests ────────────────────────────────────────────────────────
pub use crate::{
    ChatRequest, CompletionRequest, ContentPart, Message, Plugin, ProviderPreferences, ToolDef,
    json_schema_for,
};

// ── Responses and streams ───────────────────────────────────────────
pub use crate::{ChatResponse, ChatStream, StreamAccumulator, StreamEvent};

// ── Errors and events ───────────────────────────────────────────────
pub use crate::{Error, EventHandler, FnEventHandler, LoggingHandler, NoopHandler, Result};
