//! REST endpoint glue. Each operation validates its arguments, calls the
//! dispatcher, and unwraps the `{"data": ...}` envelope OpenRouter uses for
//! everything except completions.
//!
//! | Module | Operations |
//! |--------|------------|
//! | [`models`] | `list_models`, `model_endpoints` |
//! | [`providers`] | `list_providers` |
//! | [`credits`] | `credits` |
//! | [`activity`] | `activity` |
//! | [`keys`] | `current_key`, `list_keys`, `create_key`, `get_key`, `update_key`, `delete_key` |
//! | [`generation`] | `generation` |

pub mod activity;
pub mod credits;
pub mod generation;
pub mod keys;
pub mod models;
pub mod providers;

use serde::Deserialize;

/// The `{"data": ...}` wrapper around endpoint payloads.
#[derive(Deserialize, Debug)]
pub(crate) struct DataEnvelope<T> {
    pub(crate) data: T,
}

/// Accept both JSON numbers and numeric strings (OpenRouter prices are
/// strings, some limits are numbers).
pub(crate) mod lenient_f64 {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(f64),
        String(String),
    }

    pub(crate) fn option<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<NumberOrString>::deserialize(deserializer)? {
            None => Ok(None),
            Some(NumberOrString::Number(n)) => Ok(Some(n)),
            Some(NumberOrString::String(s)) => s
                .trim()
                .parse()
                .map(Some)
                .map_err(serde::de::Error::custom),
        }
    }
}
