//! `GET credits`.

use super::{DataEnvelope, lenient_f64};
use crate::api::error::Result;
use crate::client::OpenRouterClient;
use serde::{Deserialize, Serialize};

/// Account credit balance, in USD.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Credits {
    #[serde(default, deserialize_with = "lenient_f64::option")]
    pub total_credits: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64::option")]
    pub total_usage: Option<f64>,
}

impl Credits {
    /// Credits purchased minus credits used.
    pub fn remaining(&self) -> f64 {
        self.total_credits.unwrap_or(0.0) - self.total_usage.unwrap_or(0.0)
    }
}

impl OpenRouterClient {
    /// Fetch the account's purchased and used credits.
    pub async fn credits(&self) -> Result<Credits> {
        let envelope: DataEnvelope<Credits> = self.get("credits", &[]).await?;
        Ok(envelope.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaining_balance() {
        let envelope: DataEnvelope<Credits> =
            serde_json::from_str(r#"{"data":{"total_credits":25.5,"total_usage":10.25}}"#).unwrap();
        assert_eq!(envelope.data.remaining(), 15.25);
    }
}
