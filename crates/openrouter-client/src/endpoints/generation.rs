//! `GET generation?id=`: cost and timing stats for one completed request.

use super::{DataEnvelope, lenient_f64};
use crate::api::error::{Error, Result};
use crate::client::OpenRouterClient;
use serde::{Deserialize, Serialize};

/// Metadata recorded for a generation. Look it up with the `id` of a
/// [`ChatResponse`](crate::response::ChatResponse) or stream event.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Generation {
    pub id: String,
    #[serde(default, deserialize_with = "lenient_f64::option")]
    pub total_cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default)]
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(default)]
    pub streamed: bool,
    #[serde(default)]
    pub cancelled: bool,
    #[serde(default)]
    pub is_byok: bool,
    /// Milliseconds to first token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency: Option<u64>,
    /// Milliseconds spent generating.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_time: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub native_finish_reason: Option<String>,
    #[serde(default)]
    pub tokens_prompt: u64,
    #[serde(default)]
    pub tokens_completion: u64,
    #[serde(default)]
    pub native_tokens_prompt: u64,
    #[serde(default)]
    pub native_tokens_completion: u64,
    #[serde(default)]
    pub native_tokens_reasoning: u64,
    #[serde(default)]
    pub num_search_results: u64,
}

impl OpenRouterClient {
    /// Fetch stats for the generation with the given id.
    pub async fn generation(&self, id: &str) -> Result<Generation> {
        if id.trim().is_empty() {
            return Err(Error::validation("id", "must not be empty"));
        }
        let envelope: DataEnvelope<Generation> =
            self.get("generation", &[("id", id.to_string())]).await?;
        Ok(envelope.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_generation() {
        let envelope: DataEnvelope<Generation> = serde_json::from_str(
            r#"{"data":{"id":"gen-1","total_cost":0.0042,"model":"openai/gpt-4o","provider_name":"OpenAI","streamed":true,"latency":350,"tokens_prompt":12,"tokens_completion":40}}"#,
        )
        .unwrap();
        let generation = envelope.data;
        assert_eq!(generation.total_cost, Some(0.0042));
        assert!(generation.streamed);
        assert_eq!(generation.latency, Some(350));
    }

    #[tokio::test]
    async fn empty_id_rejected() {
        let client = OpenRouterClient::new("k").unwrap();
        assert!(client.generation("  ").await.unwrap_err().is_validation());
    }
}
