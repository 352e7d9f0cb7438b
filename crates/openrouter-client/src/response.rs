//! Buffered (non-streaming) response types.

use crate::chat::{MessageContent, MessageRole, ToolCall};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Response body of `POST chat/completions`.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ChatResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: String,
    /// Upstream provider that served the request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_fingerprint: Option<String>,
}

impl ChatResponse {
    pub fn first_choice(&self) -> Option<&Choice> {
        self.choices.first()
    }

    /// Text of the first choice, if any. Part lists are flattened to their
    /// text parts.
    pub fn content(&self) -> Option<Cow<'_, str>> {
        self.first_choice()?
            .message
            .content
            .as_ref()
            .map(MessageContent::as_text)
    }

    /// Reasoning of the first choice, if the model returned any.
    pub fn reasoning(&self) -> Option<&str> {
        self.first_choice()?.message.reasoning.as_deref()
    }

    /// Tool calls of the first choice (empty when there are none).
    pub fn tool_calls(&self) -> &[ToolCall] {
        self.first_choice()
            .and_then(|c| c.message.tool_calls.as_deref())
            .unwrap_or_default()
    }

    pub fn finish_reason(&self) -> Option<&str> {
        self.first_choice()?.finish_reason.as_deref()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Choice {
    #[serde(default)]
    pub index: u32,
    pub message: ResponseMessage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    /// The finish reason as reported by the upstream provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub native_finish_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logprobs: Option<serde_json::Value>,
}

/// The assistant message inside a [`Choice`].
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ResponseMessage {
    pub role: MessageRole,
    /// A plain string, or a list of typed parts from multimodal models.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<MessageContent>,
    /// Reasoning / extended thinking content returned by the model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refusal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Vec<Annotation>>,
}

/// Token usage statistics.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
    /// Credits charged for the request, when usage accounting is enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_tokens_details: Option<PromptTokensDetails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_tokens_details: Option<CompletionTokensDetails>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct PromptTokensDetails {
    #[serde(default)]
    pub cached_tokens: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct CompletionTokensDetails {
    #[serde(default)]
    pub reasoning_tokens: u32,
}

/// URL citation annotation returned by the web-search plugin.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Annotation {
    #[serde(rename = "type")]
    pub annotation_type: Option<String>,
    pub url_citation: Option<UrlCitation>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UrlCitation {
    pub url: String,
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Format web-search URL citations as a "Sources:" footer.
pub fn format_citations(annotations: &[Annotation]) -> String {
    let mut seen = std::collections::HashSet::new();
    let unique: Vec<String> = annotations
        .iter()
        .filter(|a| a.annotation_type.as_deref() == Some("url_citation"))
        .filter_map(|a| {
            a.url_citation.as_ref().map(|c| {
                let title = c.title.as_deref().unwrap_or(&c.url);
                format!("- [{title}]({})", c.url)
            })
        })
        .filter(|line| seen.insert(line.clone()))
        .collect();

    if unique.is_empty() {
        String::new()
    } else {
        format!("\n\nSources:\n{}", unique.join("\n"))
    }
}

// ── Legacy completions ─────────────────────────────────────────────

/// Response body of `POST completions`.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct CompletionResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub choices: Vec<CompletionChoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl CompletionResponse {
    /// Text of the first choice.
    pub fn text(&self) -> Option<&str> {
        self.choices.first().map(|c| c.text.as_str())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CompletionChoice {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}
