//! API key endpoints: `GET key` for the calling key, and CRUD over `keys`,
//! which requires a provisioning key.

use super::{DataEnvelope, lenient_f64};
use crate::api::dispatch::path_segment;
use crate::api::error::{Error, Result};
use crate::chat::Validate;
use crate::client::OpenRouterClient;
use reqwest::Method;
use serde::{Deserialize, Serialize};

/// The key used to authenticate the current client.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct CurrentKey {
    #[serde(default)]
    pub label: String,
    /// Credits used, in USD.
    #[serde(default, deserialize_with = "lenient_f64::option")]
    pub usage: Option<f64>,
    /// Credit limit, `None` for unlimited.
    #[serde(default, deserialize_with = "lenient_f64::option")]
    pub limit: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64::option")]
    pub limit_remaining: Option<f64>,
    #[serde(default)]
    pub is_free_tier: bool,
    #[serde(default)]
    pub is_provisioning_key: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimit>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct RateLimit {
    #[serde(default)]
    pub requests: u64,
    /// e.g. `"10s"`.
    #[serde(default)]
    pub interval: String,
}

/// A managed API key. The secret itself is only returned once, by
/// [`create_key`](OpenRouterClient::create_key).
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ApiKey {
    pub hash: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default, deserialize_with = "lenient_f64::option")]
    pub limit: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64::option")]
    pub limit_remaining: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64::option")]
    pub usage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// Body of `POST keys`.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct CreateKeyRequest {
    pub name: String,
    /// Credit limit in USD.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_byok_in_limit: Option<bool>,
}

impl CreateKeyRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_limit(mut self, limit: f64) -> Self {
        self.limit = Some(limit);
        self
    }
}

impl Validate for CreateKeyRequest {
    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::validation("name", "must not be empty"));
        }
        check_limit(self.limit)
    }
}

/// Body of `PATCH keys/{hash}`. Unset fields are left unchanged.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct UpdateKeyRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_byok_in_limit: Option<bool>,
}

impl Validate for UpdateKeyRequest {
    fn validate(&self) -> Result<()> {
        if self.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(Error::validation("name", "must not be empty when set"));
        }
        if self.name.is_none()
            && self.disabled.is_none()
            && self.limit.is_none()
            && self.include_byok_in_limit.is_none()
        {
            return Err(Error::validation("update", "no fields to change"));
        }
        check_limit(self.limit)
    }
}

fn check_limit(limit: Option<f64>) -> Result<()> {
    match limit {
        Some(l) if !l.is_finite() || l < 0.0 => Err(Error::validation(
            "limit",
            format!("must be a non-negative amount, got {l}"),
        )),
        _ => Ok(()),
    }
}

/// Response of `POST keys`: the key record plus its secret.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CreatedKey {
    pub data: ApiKey,
    /// The secret key. Shown once; store it now.
    pub key: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct DeletedKey {
    #[serde(default)]
    pub deleted: bool,
}

impl OpenRouterClient {
    /// Details and limits of the key this client authenticates with.
    pub async fn current_key(&self) -> Result<CurrentKey> {
        let envelope: DataEnvelope<CurrentKey> = self.get("key", &[]).await?;
        Ok(envelope.data)
    }

    /// List managed keys, paginated by `offset`.
    pub async fn list_keys(&self, offset: Option<u32>, include_disabled: bool) -> Result<Vec<ApiKey>> {
        let mut query = Vec::new();
        if let Some(offset) = offset {
            query.push(("offset", offset.to_string()));
        }
        if include_disabled {
            query.push(("include_disabled", "true".to_string()));
        }
        let envelope: DataEnvelope<Vec<ApiKey>> = self.get("keys", &query).await?;
        Ok(envelope.data)
    }

    pub async fn create_key(&self, request: &CreateKeyRequest) -> Result<CreatedKey> {
        self.dispatch(Method::POST, "keys", Some(request)).await
    }

    pub async fn get_key(&self, hash: &str) -> Result<ApiKey> {
        let hash = path_segment("hash", hash)?;
        let envelope: DataEnvelope<ApiKey> = self.get(&format!("keys/{hash}"), &[]).await?;
        Ok(envelope.data)
    }

    pub async fn update_key(&self, hash: &str, request: &UpdateKeyRequest) -> Result<ApiKey> {
        let hash = path_segment("hash", hash)?;
        let envelope: DataEnvelope<ApiKey> = self
            .dispatch(Method::PATCH, &format!("keys/{hash}"), Some(request))
            .await?;
        Ok(envelope.data)
    }

    pub async fn delete_key(&self, hash: &str) -> Result<DeletedKey> {
        let hash = path_segment("hash", hash)?;
        self.dispatch::<(), _>(Method::DELETE, &format!("keys/{hash}"), None)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_request_validation() {
        assert!(CreateKeyRequest::new("ci").with_limit(10.0).validate().is_ok());
        assert!(CreateKeyRequest::new("").validate().unwrap_err().is_validation());
        let err = CreateKeyRequest::new("ci").with_limit(-1.0).validate().unwrap_err();
        assert!(matches!(err, Error::Validation { ref field, .. } if field == "limit"));
        assert!(
            CreateKeyRequest::new("ci")
                .with_limit(f64::NAN)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn empty_update_rejected() {
        assert!(UpdateKeyRequest::default().validate().is_err());
        let disable = UpdateKeyRequest {
            disabled: Some(true),
            ..Default::default()
        };
        assert!(disable.validate().is_ok());
        let json = serde_json::to_value(&disable).unwrap();
        assert_eq!(json, serde_json::json!({"disabled": true}));
    }

    #[test]
    fn decodes_current_key() {
        let envelope: DataEnvelope<CurrentKey> = serde_json::from_str(
            r#"{"data":{"label":"sk-or-v1-abc...","usage":1.5,"limit":null,"is_free_tier":false,"rate_limit":{"requests":200,"interval":"10s"}}}"#,
        )
        .unwrap();
        let key = envelope.data;
        assert_eq!(key.usage, Some(1.5));
        assert_eq!(key.limit, None);
        assert_eq!(key.rate_limit.unwrap().requests, 200);
    }

    #[tokio::test]
    async fn bad_hash_rejected_locally() {
        let client = OpenRouterClient::new("k").unwrap();
        assert!(client.get_key("").await.unwrap_err().is_validation());
        assert!(client.delete_key("a/b").await.unwrap_err().is_validation());
        let update = UpdateKeyRequest {
            disabled: Some(true),
            ..Default::default()
        };
        assert!(client.update_key("x y", &update).await.unwrap_err().is_validation());
        let negative = CreateKeyRequest::new("ci").with_limit(-5.0);
        assert!(client.create_key(&negative).await.unwrap_err().is_validation());
    }
}
