//! Request lifecycle events and handlers.
//!
//! The dispatcher and stream reader report what they are doing through
//! [`ClientEvent`] values delivered to an [`EventHandler`]. Nothing in the
//! core prints; presentation is up to the handler.
//!
//! | Handler | Use case |
//! |---------|----------|
//! | [`NoopHandler`] | Tests, silent clients |
//! | [`LoggingHandler`] | Structured logging via `tracing` (the default) |
//! | [`FnEventHandler`] | Quick closures |
//! | Custom `impl EventHandler` | Metrics, progress UIs |

use crate::api::error::Error;
use reqwest::Method;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

/// Events emitted while a request or stream is in flight.
#[derive(Debug)]
pub enum ClientEvent<'a> {
    /// A request passed validation and is about to be sent.
    RequestStarted {
        request_id: &'a str,
        method: &'a Method,
        path: &'a str,
    },
    /// An attempt failed. `retry_in` is `Some` when another attempt follows.
    AttemptFailed {
        request_id: &'a str,
        attempt: u32,
        max_attempts: u32,
        error: &'a Error,
        retry_in: Option<Duration>,
    },
    /// A response with the given status was fully read.
    ResponseReceived {
        request_id: &'a str,
        status: u16,
        attempts: u32,
        elapsed: Duration,
    },
    /// A streaming response was accepted and its reader task started.
    StreamOpened { request_id: &'a str, status: u16 },
    /// The stream reader stopped. `error` is `None` on the `[DONE]` sentinel
    /// or an explicit close.
    StreamFinished {
        request_id: &'a str,
        events: usize,
        error: Option<&'a Error>,
    },
}

impl ClientEvent<'_> {
    /// Correlation id shared by every event of one request.
    pub fn request_id(&self) -> &str {
        match self {
            ClientEvent::RequestStarted { request_id, .. }
            | ClientEvent::AttemptFailed { request_id, .. }
            | ClientEvent::ResponseReceived { request_id, .. }
            | ClientEvent::StreamOpened { request_id, .. }
            | ClientEvent::StreamFinished { request_id, .. } => request_id,
        }
    }
}

/// Observer for [`ClientEvent`]s. Called inline on the request's task, so
/// implementations should return quickly.
pub trait EventHandler: Send + Sync {
    fn on_event(&self, event: &ClientEvent<'_>);
}

/// Ignores every event.
pub struct NoopHandler;

impl EventHandler for NoopHandler {
    fn on_event(&self, _event: &ClientEvent<'_>) {}
}

/// Logs events through `tracing`: retries and stream failures at `warn`,
/// everything else at `debug`.
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn on_event(&self, event: &ClientEvent<'_>) {
        match event {
            ClientEvent::RequestStarted {
                request_id,
                method,
                path,
            } => debug!(request_id, "{method} {path}"),
            ClientEvent::AttemptFailed {
                request_id,
                attempt,
                max_attempts,
                error,
                retry_in: Some(delay),
            } => warn!(
                request_id,
                "Attempt {attempt}/{max_attempts} failed: {error}; retrying in {:.1}s",
                delay.as_secs_f64()
            ),
            ClientEvent::AttemptFailed {
                request_id,
                attempt,
                error,
                retry_in: None,
                ..
            } => debug!(request_id, "Attempt {attempt} failed, not retrying: {error}"),
            ClientEvent::ResponseReceived {
                request_id,
                status,
                attempts,
                elapsed,
            } => debug!(
                request_id,
                "HTTP {status} in {:.1}s after {attempts} attempt(s)",
                elapsed.as_secs_f64()
            ),
            ClientEvent::StreamOpened { request_id, status } => {
                debug!(request_id, "Stream opened (HTTP {status})")
            }
            ClientEvent::StreamFinished {
                request_id,
                events,
                error: None,
            } => debug!(request_id, "Stream finished after {events} event(s)"),
            ClientEvent::StreamFinished {
                request_id,
                events,
                error: Some(error),
            } => warn!(request_id, "Stream failed after {events} event(s): {error}"),
        }
    }
}

/// Wraps a closure as an [`EventHandler`].
pub struct FnEventHandler<F>(pub F);

impl<F> EventHandler for FnEventHandler<F>
where
    F: Fn(&ClientEvent<'_>) + Send + Sync,
{
    fn on_event(&self, event: &ClientEvent<'_>) {
        (self.0)(event)
    }
}

/// Generate a unique id for one logical request (all of its attempts).
pub fn generate_request_id() -> String {
    let ts = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    // Counter disambiguates ids generated within the same clock tick.
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let count = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("req-{ts:x}-{count:04x}")
}
