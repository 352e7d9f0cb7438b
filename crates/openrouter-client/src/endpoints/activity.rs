//! `GET activity`: per-day, per-model usage for the last 30 days.

use super::{DataEnvelope, lenient_f64};
use crate::api::error::{Error, Result};
use crate::client::OpenRouterClient;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Usage of one model endpoint on one day.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ActivityItem {
    /// `YYYY-MM-DD`.
    pub date: String,
    #[serde(default)]
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_permaslug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_name: Option<String>,
    /// Spend in USD.
    #[serde(default, deserialize_with = "lenient_f64::option")]
    pub usage: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64::option")]
    pub byok_usage_inference: Option<f64>,
    #[serde(default)]
    pub requests: u64,
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub reasoning_tokens: u64,
}

/// Parse a `YYYY-MM-DD` activity date.
pub fn parse_activity_date(date: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
        .map_err(|e| Error::validation("date", format!("{date:?} is not YYYY-MM-DD: {e}")))
}

impl OpenRouterClient {
    /// Usage grouped by day and model, optionally for a single UTC day.
    pub async fn activity(&self, date: Option<&str>) -> Result<Vec<ActivityItem>> {
        let mut query = Vec::new();
        if let Some(date) = date {
            let day = parse_activity_date(date)?;
            query.push(("date", day.format("%Y-%m-%d").to_string()));
        }
        let envelope: DataEnvelope<Vec<ActivityItem>> = self.get("activity", &query).await?;
        Ok(envelope.data)
    }
}
