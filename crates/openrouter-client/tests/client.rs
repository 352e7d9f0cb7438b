//! Buffered request dispatch against a mock OpenRouter server: auth and
//! attribution headers, retry policy, error classification.

use openrouter_client::prelude::*;
use openrouter_client::{ClientEvent, TransportKind};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_retry(attempts: u32) -> RetryPolicy {
    RetryPolicy::with_attempts(attempts).with_base_delay(Duration::from_millis(5))
}

fn client_for(server: &MockServer, retry: RetryPolicy) -> OpenRouterClient {
    let config = ClientConfig::new("sk-or-test")
        .with_base_url(format!("{}/api/v1", server.uri()))
        .with_retry(retry);
    OpenRouterClient::with_config(config).unwrap()
}

fn request() -> ChatRequest {
    ChatRequest::new("openai/gpt-4o-mini", vec![Message::user("Hello")])
}

fn completion_body(text: &str) -> serde_json::Value {
    json!({
        "id": "gen-1",
        "model": "openai/gpt-4o-mini",
        "provider": "OpenAI",
        "object": "chat.completion",
        "created": 1_700_000_000,
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": text},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 3, "completion_tokens": 1, "total_tokens": 4, "cost": 0.00001}
    })
}

fn unavailable() -> ResponseTemplate {
    ResponseTemplate::new(503).set_body_json(json!({
        "error": {"code": 503, "message": "No available providers"}
    }))
}

async fn request_count(server: &MockServer) -> usize {
    server.received_requests().await.unwrap_or_default().len()
}

#[tokio::test]
async fn chat_sends_credentials_and_decodes_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-or-test"))
        .and(header("http-referer", "https://example.org"))
        .and(header("x-title", "Test Harness"))
        .and(header("x-custom", "yes"))
        .and(body_partial_json(json!({
            "model": "openai/gpt-4o-mini",
            "messages": [{"role": "user", "content": "Hello"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("Hi there")))
        .expect(1)
        .mount(&server)
        .await;

    let config = ClientConfig::new("sk-or-test")
        .with_base_url(format!("{}/api/v1", server.uri()))
        .with_attribution("https://example.org", "Test Harness")
        .with_header("x-custom", "yes");
    let client = OpenRouterClient::with_config(config).unwrap();

    let response = client.chat(&request()).await.unwrap();
    assert_eq!(response.content().as_deref(), Some("Hi there"));
    assert_eq!(response.finish_reason(), Some("stop"));
    assert_eq!(response.provider.as_deref(), Some("OpenAI"));
    assert_eq!(response.usage.unwrap().total_tokens, 4);
}

#[tokio::test]
async fn buffered_chat_never_asks_for_a_stream() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("ok")))
        .mount(&server)
        .await;

    let mut req = request();
    req.stream = Some(true);
    client_for(&server, fast_retry(1)).chat(&req).await.unwrap();

    let received = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
    assert!(body.get("stream").is_none());
}

#[tokio::test]
async fn retries_transient_failures_until_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .respond_with(unavailable())
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("finally")))
        .mount(&server)
        .await;

    let response = client_for(&server, fast_retry(3)).chat(&request()).await.unwrap();
    assert_eq!(response.content().as_deref(), Some("finally"));
    assert_eq!(request_count(&server).await, 3);
}

#[tokio::test]
async fn exhausted_retries_return_the_last_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .respond_with(unavailable())
        .mount(&server)
        .await;

    let err = client_for(&server, fast_retry(4)).chat(&request()).await.unwrap_err();
    assert_eq!(err.status(), Some(503));
    assert_eq!(err.as_api().unwrap().message, "No available providers");
    assert!(err.is_retryable());
    assert_eq!(request_count(&server).await, 4);
}

#[tokio::test]
async fn error_envelope_with_success_status_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": {"code": 502, "message": "Provider disconnected"}
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": {"code": 400, "message": "Context too long"}
        })))
        .mount(&server)
        .await;

    let err = client_for(&server, fast_retry(3)).chat(&request()).await.unwrap_err();
    assert_eq!(err.status(), Some(400));
    assert_eq!(err.as_api().unwrap().message, "Context too long");
    assert!(!err.as_api().unwrap().is_decode_failure());
    assert_eq!(request_count(&server).await, 2);
}

#[tokio::test]
async fn structured_content_decodes() {
    let server = MockServer::start().await;
    let mut body = completion_body("");
    body["choices"][0]["message"]["content"] = json!([
        {"type": "text", "text": "Hi"},
        {"type": "text", "text": " there"}
    ]);
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&server)
        .await;

    let response = client_for(&server, fast_retry(1)).chat(&request()).await.unwrap();
    assert_eq!(response.content().as_deref(), Some("Hi there"));
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {
                "code": 400,
                "message": "Provider returned error",
                "metadata": {"provider_name": "Anthropic", "raw": "bad tool schema"}
            }
        })))
        .mount(&server)
        .await;

    let err = client_for(&server, fast_retry(3)).chat(&request()).await.unwrap_err();
    let api = err.as_api().unwrap();
    assert_eq!(api.status, 400);
    assert_eq!(api.provider_name(), Some("Anthropic"));
    assert!(!err.is_retryable());
    assert_eq!(request_count(&server).await, 1);
}

#[tokio::test]
async fn unparseable_error_body_is_kept_raw() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("<html>nope</html>"))
        .mount(&server)
        .await;

    let err = client_for(&server, fast_retry(1)).chat(&request()).await.unwrap_err();
    let api = err.as_api().unwrap();
    assert_eq!(api.status, 401);
    assert_eq!(api.raw_body, "<html>nope</html>");
}

#[tokio::test]
async fn invalid_requests_never_reach_the_network() {
    let server = MockServer::start().await;
    let client = client_for(&server, fast_retry(3));

    let empty = ChatRequest::new("openai/gpt-4o-mini", vec![]);
    assert!(client.chat(&empty).await.unwrap_err().is_validation());

    let hot = request().with_temperature(5.0);
    assert!(client.chat(&hot).await.unwrap_err().is_validation());
    assert!(client.chat_stream(&hot).await.unwrap_err().is_validation());

    assert_eq!(request_count(&server).await, 0);
}

#[tokio::test]
async fn undecodable_success_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"choices\": 42}"))
        .mount(&server)
        .await;

    let err = client_for(&server, fast_retry(3)).chat(&request()).await.unwrap_err();
    let api = err.as_api().unwrap();
    assert!(api.is_decode_failure());
    assert_eq!(api.status, 200);
    assert!(!err.is_retryable());
    assert_eq!(request_count(&server).await, 1);
}

#[tokio::test]
async fn retry_after_is_honored_within_the_cap() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("retry-after", "60")
                .set_body_json(json!({"error": {"code": 429, "message": "Rate limited"}})),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("ok")))
        .mount(&server)
        .await;

    let waits = Arc::new(Mutex::new(Vec::new()));
    let sink = waits.clone();
    let retry = fast_retry(2).with_max_delay(Duration::from_millis(50));
    let client = client_for(&server, retry).with_event_handler(Arc::new(FnEventHandler(
        move |event: &ClientEvent<'_>| {
            if let ClientEvent::AttemptFailed { retry_in, .. } = event {
                sink.lock().unwrap().push(*retry_in);
            }
        },
    )));

    client.chat(&request()).await.unwrap();
    assert_eq!(*waits.lock().unwrap(), vec![Some(Duration::from_millis(50))]);
    assert_eq!(request_count(&server).await, 2);
}

#[tokio::test]
async fn request_timeout_is_a_transport_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(completion_body("late"))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let config = ClientConfig::new("sk-or-test")
        .with_base_url(format!("{}/api/v1", server.uri()))
        .with_timeout(Duration::from_millis(100))
        .with_retry(RetryPolicy::no_retry());
    let client = OpenRouterClient::with_config(config).unwrap();

    match client.chat(&request()).await.unwrap_err() {
        Error::Transport(err) => assert_eq!(err.kind, TransportKind::Timeout),
        other => panic!("expected transport timeout, got {other:?}"),
    }
}

#[tokio::test]
async fn cancellation_interrupts_a_pending_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(completion_body("late"))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let token = CancellationToken::new();
    let client = client_for(&server, fast_retry(3)).with_cancellation(token.clone());
    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
    });

    let err = client.chat(&request()).await.unwrap_err();
    assert!(err.is_cancelled());
    canceller.await.unwrap();
}

#[tokio::test]
async fn events_report_each_attempt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .respond_with(unavailable())
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("ok")))
        .mount(&server)
        .await;

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let client = client_for(&server, fast_retry(3)).with_event_handler(Arc::new(FnEventHandler(
        move |event: &ClientEvent<'_>| {
            let name = match event {
                ClientEvent::RequestStarted { .. } => "started",
                ClientEvent::AttemptFailed { .. } => "failed",
                ClientEvent::ResponseReceived { .. } => "received",
                ClientEvent::StreamOpened { .. } => "opened",
                ClientEvent::StreamFinished { .. } => "finished",
            };
            sink.lock().unwrap().push(name);
        },
    )));

    client.chat(&request()).await.unwrap();
    assert_eq!(*seen.lock().unwrap(), vec!["started", "failed", "received"]);
}

#[tokio::test]
async fn legacy_completion_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/completions"))
        .and(body_partial_json(json!({"prompt": "Once upon"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "gen-2",
            "model": "openai/gpt-3.5-turbo-instruct",
            "object": "text_completion",
            "created": 1_700_000_000,
            "choices": [{"index": 0, "text": " a time", "finish_reason": "length"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let req = CompletionRequest::new("openai/gpt-3.5-turbo-instruct", "Once upon");
    let response = client_for(&server, fast_retry(1)).complete(&req).await.unwrap();
    assert_eq!(response.text(), Some(" a time"));
}

#[tokio::test]
async fn fallback_models_are_sent_as_a_route() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .and(body_partial_json(json!({
            "models": ["anthropic/claude-sonnet-4", "openai/gpt-4o"],
            "route": "fallback"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("ok")))
        .expect(1)
        .mount(&server)
        .await;

    let req = ChatRequest::new("anthropic/claude-sonnet-4", vec![Message::user("Hi")])
        .with_fallbacks(["openai/gpt-4o"]);
    client_for(&server, fast_retry(1)).chat(&req).await.unwrap();
}
