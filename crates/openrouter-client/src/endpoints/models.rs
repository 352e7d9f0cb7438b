//! Model catalog: `GET models` and `GET models/{author}/{slug}/endpoints`.

use super::{DataEnvelope, lenient_f64};
use crate::api::dispatch::path_segment;
use crate::api::error::{Error, Result};
use crate::client::OpenRouterClient;
use serde::{Deserialize, Serialize};

/// A model in the OpenRouter catalog.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Model {
    /// Routing id, e.g. `anthropic/claude-sonnet-4`.
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical_slug: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub architecture: Option<Architecture>,
    #[serde(default)]
    pub pricing: ModelPricing,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_provider: Option<TopProvider>,
    #[serde(default)]
    pub supported_parameters: Vec<String>,
}

impl Model {
    /// `id` split into `(author, slug)`, the form [`model_endpoints`]
    /// takes.
    ///
    /// [`model_endpoints`]: OpenRouterClient::model_endpoints
    pub fn author_and_slug(&self) -> Option<(&str, &str)> {
        self.id.split_once('/')
    }

    pub fn supports(&self, parameter: &str) -> bool {
        self.supported_parameters.iter().any(|p| p == parameter)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Architecture {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modality: Option<String>,
    #[serde(default)]
    pub input_modalities: Vec<String>,
    #[serde(default)]
    pub output_modalities: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokenizer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruct_type: Option<String>,
}

/// Prices in USD per token (or per request / image), as published.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ModelPricing {
    #[serde(default, deserialize_with = "lenient_f64::option")]
    pub prompt: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64::option")]
    pub completion: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64::option")]
    pub request: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64::option")]
    pub image: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64::option")]
    pub web_search: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64::option")]
    pub internal_reasoning: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64::option")]
    pub input_cache_read: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64::option")]
    pub input_cache_write: Option<f64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct TopProvider {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_completion_tokens: Option<u64>,
    #[serde(default)]
    pub is_moderated: bool,
}

/// A model together with the provider endpoints serving it.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ModelEndpoints {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub architecture: Option<Architecture>,
    #[serde(default)]
    pub endpoints: Vec<ModelEndpoint>,
}

/// One provider's deployment of a model.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ModelEndpoint {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub provider_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_length: Option<u64>,
    #[serde(default)]
    pub pricing: ModelPricing,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantization: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_completion_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_prompt_tokens: Option<u64>,
    #[serde(default)]
    pub supported_parameters: Vec<String>,
    /// Provider health; 0 is normal, negative values are degraded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uptime_last_30m: Option<f64>,
}

impl OpenRouterClient {
    /// List available models, optionally restricted to a category
    /// (e.g. `"programming"`).
    pub async fn list_models(&self, category: Option<&str>) -> Result<Vec<Model>> {
        let mut query = Vec::new();
        if let Some(category) = category {
            if category.trim().is_empty() {
                return Err(Error::validation("category", "must not be empty when set"));
            }
            query.push(("category", category.to_string()));
        }
        let envelope: DataEnvelope<Vec<Model>> = self.get("models", &query).await?;
        Ok(envelope.data)
    }

    /// List the provider endpoints serving `author/slug`.
    pub async fn model_endpoints(&self, author: &str, slug: &str) -> Result<ModelEndpoints> {
        let author = path_segment("author", author)?;
        let slug = path_segment("slug", slug)?;
        let path = format!("models/{author}/{slug}/endpoints");
        let envelope: DataEnvelope<ModelEndpoints> = self.get(&path, &[]).await?;
        Ok(envelope.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_prices_parsed() {
        let model: Model = serde_json::from_str(
            r#"{
                "id": "openai/gpt-4o",
                "name": "OpenAI: GPT-4o",
                "context_length": 128000,
                "pricing": {"prompt": "0.0000025", "completion": "0.00001", "request": "0", "image": 0.003613},
                "supported_parameters": ["tools", "temperature"]
            }"#,
        )
        .unwrap();
        assert_eq!(model.pricing.prompt, Some(0.0000025));
        assert_eq!(model.pricing.request, Some(0.0));
        assert_eq!(model.pricing.image, Some(0.003613));
        assert_eq!(model.pricing.web_search, None);
        assert_eq!(model.author_and_slug(), Some(("openai", "gpt-4o")));
        assert!(model.supports("tools"));
        assert!(!model.supports("reasoning"));
    }

    #[test]
    fn bad_price_is_decode_error() {
        let result = serde_json::from_str::<ModelPricing>(r#"{"prompt": "cheap"}"#);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn invalid_segments_rejected_locally() {
        let client = OpenRouterClient::new("k").unwrap();
        assert!(
            client
                .model_endpoints("openai/x", "gpt-4o")
                .await
                .unwrap_err()
                .is_validation()
        );
        assert!(
            client
                .model_endpoints("openai", "")
                .await
                .unwrap_err()
                .is_validation()
        );
        assert!(client.list_models(Some(" ")).await.unwrap_err().is_validation());
    }
}
