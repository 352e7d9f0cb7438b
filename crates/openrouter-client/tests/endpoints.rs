//! REST endpoints: paths, methods, query strings, `{"data": ...}` envelopes.

use openrouter_client::endpoints::keys::{CreateKeyRequest, UpdateKeyRequest};
use openrouter_client::prelude::*;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> OpenRouterClient {
    let config = ClientConfig::new("sk-or-test")
        .with_base_url(format!("{}/api/v1", server.uri()))
        .with_retry(RetryPolicy::no_retry());
    OpenRouterClient::with_config(config).unwrap()
}

fn data(value: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "data": value }))
}

#[tokio::test]
async fn list_models_filters_by_category() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/models"))
        .and(query_param("category", "programming"))
        .and(header("authorization", "Bearer sk-or-test"))
        .respond_with(data(json!([
            {"id": "openai/gpt-4o", "name": "GPT-4o", "pricing": {"prompt": "0.0000025", "completion": "0.00001"}},
            {"id": "anthropic/claude-sonnet-4", "name": "Claude Sonnet 4", "pricing": {}}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let models = client_for(&server).list_models(Some("programming")).await.unwrap();
    assert_eq!(models.len(), 2);
    assert_eq!(models[0].pricing.completion, Some(0.00001));
    assert_eq!(models[1].author_and_slug(), Some(("anthropic", "claude-sonnet-4")));
}

#[tokio::test]
async fn model_endpoints_path() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/models/openai/gpt-4o/endpoints"))
        .respond_with(data(json!({
            "id": "openai/gpt-4o",
            "name": "GPT-4o",
            "endpoints": [{"name": "OpenAI | openai/gpt-4o", "provider_name": "OpenAI", "status": 0}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let endpoints = client_for(&server).model_endpoints("openai", "gpt-4o").await.unwrap();
    assert_eq!(endpoints.endpoints[0].provider_name, "OpenAI");
}

#[tokio::test]
async fn account_endpoints() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/credits"))
        .respond_with(data(json!({"total_credits": 20, "total_usage": 4.5})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/providers"))
        .respond_with(data(json!([{"name": "OpenAI", "slug": "openai"}])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/activity"))
        .and(query_param("date", "2025-03-07"))
        .respond_with(data(json!([
            {"date": "2025-03-07", "model": "openai/gpt-4o", "usage": 0.12, "requests": 3}
        ])))
        .mount(&server)
        .await;

    let client = client_for(&server);
    assert_eq!(client.credits().await.unwrap().remaining(), 15.5);
    assert_eq!(client.list_providers().await.unwrap()[0].slug, "openai");
    let activity = client.activity(Some("2025-03-07")).await.unwrap();
    assert_eq!(activity[0].requests, 3);

    assert!(client.activity(Some("07/03/2025")).await.unwrap_err().is_validation());
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn generation_is_looked_up_by_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/generation"))
        .and(query_param("id", "gen-123"))
        .respond_with(data(json!({
            "id": "gen-123",
            "total_cost": 0.0021,
            "model": "openai/gpt-4o",
            "tokens_prompt": 12,
            "tokens_completion": 40
        })))
        .expect(1)
        .mount(&server)
        .await;

    let generation = client_for(&server).generation("gen-123").await.unwrap();
    assert_eq!(generation.total_cost, Some(0.0021));
    assert_eq!(generation.tokens_completion, 40);
}

#[tokio::test]
async fn key_management_methods_and_paths() {
    let server = MockServer::start().await;
    let key = json!({"hash": "abc123", "name": "ci", "label": "sk-or-v1-ab...", "disabled": false, "limit": 10});

    Mock::given(method("GET"))
        .and(path("/api/v1/keys"))
        .and(query_param("offset", "20"))
        .and(query_param("include_disabled", "true"))
        .respond_with(data(json!([key.clone()])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/keys"))
        .and(body_json(json!({"name": "ci", "limit": 10.0})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": key.clone(),
            "key": "sk-or-v1-secret"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/keys/abc123"))
        .respond_with(data(key.clone()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/api/v1/keys/abc123"))
        .and(body_json(json!({"disabled": true})))
        .respond_with(data(json!({"hash": "abc123", "name": "ci", "disabled": true})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/v1/keys/abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"deleted": true})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let keys = client.list_keys(Some(20), true).await.unwrap();
    assert_eq!(keys[0].hash, "abc123");

    let created = client
        .create_key(&CreateKeyRequest::new("ci").with_limit(10.0))
        .await
        .unwrap();
    assert_eq!(created.key, "sk-or-v1-secret");
    assert_eq!(created.data.limit, Some(10.0));

    assert_eq!(client.get_key("abc123").await.unwrap().name, "ci");

    let disable = UpdateKeyRequest {
        disabled: Some(true),
        ..Default::default()
    };
    assert!(client.update_key("abc123", &disable).await.unwrap().disabled);
    assert!(client.delete_key("abc123").await.unwrap().deleted);
}

#[tokio::test]
async fn current_key() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/key"))
        .respond_with(data(json!({
            "label": "sk-or-v1-ab...",
            "usage": 1.25,
            "limit": null,
            "is_free_tier": true
        })))
        .mount(&server)
        .await;

    let key = client_for(&server).current_key().await.unwrap();
    assert!(key.is_free_tier);
    assert_eq!(key.limit, None);
}

#[tokio::test]
async fn missing_envelope_is_a_decode_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/credits"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"total_credits": 1})))
        .mount(&server)
        .await;

    let err = client_for(&server).credits().await.unwrap_err();
    assert!(err.as_api().unwrap().is_decode_failure());
}
