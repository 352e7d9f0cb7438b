//! `GET providers`.

use super::DataEnvelope;
use crate::api::error::Result;
use crate::client::OpenRouterClient;
use serde::{Deserialize, Serialize};

/// An upstream inference provider.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Provider {
    pub name: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub privacy_policy_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terms_of_service_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_page_url: Option<String>,
}

impl OpenRouterClient {
    /// List the providers OpenRouter routes to.
    pub async fn list_providers(&self) -> Result<Vec<Provider>> {
        let envelope: DataEnvelope<Vec<Provider>> = self.get("providers", &[]).await?;
        Ok(envelope.data)
    }
}
