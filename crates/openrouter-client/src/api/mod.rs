//! Transport layer: configuration, dispatch, retry, error classification,
//! and SSE streaming.
//!
//! - [`config`]: [`ClientConfig`], the immutable transport settings.
//! - [`error`]: the [`Error`] taxonomy and HTTP/transport classification.
//! - [`retry`]: [`RetryPolicy`] and the backoff executor. Retries 408, 429,
//!   5xx and transport failures; never other 4xx or decode failures.
//! - [`dispatch`]: request building, auth injection, attempt loop, decoding.
//! - [`streaming`]: the SSE decoder and the [`ChatStream`] handle.
//! - [`events`]: lifecycle events and pluggable [`EventHandler`]s.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod retry;
pub mod streaming;

pub use config::{ClientConfig, DEFAULT_BASE_URL};
pub use error::{ApiError, Error, Result, TransportError, TransportKind};
pub use events::{ClientEvent, EventHandler, FnEventHandler, LoggingHandler, NoopHandler};
pub use retry::RetryPolicy;
pub use streaming::{ChatStream, StreamAccumulator, StreamEvent};
