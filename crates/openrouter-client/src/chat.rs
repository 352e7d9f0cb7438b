//! Chat completion request types.
//!
//! [`ChatRequest`] is a superset of the fields the OpenRouter chat endpoint
//! accepts; unset optional fields are omitted from serialization. Routing
//! preferences ([`ProviderPreferences`], `models` + `route`, `transforms`) are
//! transmitted as-is; the client never acts on them.

use crate::api::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

// ── Validation ─────────────────────────────────────────────────────

/// Local precondition checks run by the dispatcher before any network call.
pub trait Validate {
    fn validate(&self) -> Result<()>;
}

impl Validate for () {
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

impl Validate for serde_json::Value {
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

pub(crate) fn check_range(field: &str, value: Option<f32>, min: f32, max: f32) -> Result<()> {
    match value {
        Some(v) if !(min..=max).contains(&v) => Err(Error::validation(
            field,
            format!("must be between {min} and {max}, got {v}"),
        )),
        _ => Ok(()),
    }
}

// ── Request types ──────────────────────────────────────────────────

/// Chat completion request body.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ChatRequest {
    // Model selection: use `model` for a single model, or `models` + `route`
    // for a fallback chain.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub models: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,

    pub messages: Vec<Message>,

    /// Forced by [`chat`](crate::OpenRouterClient::chat) and
    /// [`chat_stream`](crate::OpenRouterClient::chat_stream).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,

    // Generation parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repetition_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_a: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logit_bias: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logprobs: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_logprobs: Option<u32>,

    // Output format
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,

    // Provider preferences
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderPreferences>,

    // Transforms (e.g. "middle-out"), applied server-side.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transforms: Option<Vec<String>>,

    // Tools and plugins
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDef>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallel_tool_calls: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugins: Option<Vec<Plugin>>,

    // Reasoning / extended thinking
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<ReasoningConfig>,

    /// Ask for token usage (and cost) in the response or final stream chunk.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageConfig>,

    /// Stable end-user identifier for abuse tracking.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

impl ChatRequest {
    /// A request for `model` with the given messages.
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: Some(model.into()),
            messages,
            ..Default::default()
        }
    }

    /// Try `models` in order; OpenRouter falls back when one is unavailable.
    pub fn with_fallbacks(mut self, fallbacks: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let mut all: Vec<String> = self.model.take().into_iter().collect();
        all.extend(fallbacks.into_iter().map(Into::into));
        self.models = Some(all);
        self.route = Some("fallback".to_string());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDef>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn with_provider(mut self, provider: ProviderPreferences) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_transforms(mut self, transforms: Vec<String>) -> Self {
        self.transforms = Some(transforms);
        self
    }

    pub fn with_plugin(mut self, plugin: Plugin) -> Self {
        self.plugins.get_or_insert_with(Vec::new).push(plugin);
        self
    }

    pub fn with_reasoning(mut self, reasoning: ReasoningConfig) -> Self {
        self.reasoning = Some(reasoning);
        self
    }

    /// Label for logs: the single model, or the head of the fallback chain.
    pub fn model_label(&self) -> &str {
        self.model
            .as_deref()
            .or_else(|| {
                self.models
                    .as_ref()
                    .and_then(|m| m.first().map(|s| s.as_str()))
            })
            .unwrap_or("(default)")
    }
}

impl Validate for ChatRequest {
    fn validate(&self) -> Result<()> {
        if self.messages.is_empty() {
            return Err(Error::validation("messages", "must not be empty"));
        }
        if let Some(model) = &self.model
            && model.trim().is_empty()
        {
            return Err(Error::validation("model", "must not be empty"));
        }
        if let Some(models) = &self.models {
            if models.is_empty() {
                return Err(Error::validation("models", "must not be empty when set"));
            }
            if models.iter().any(|m| m.trim().is_empty()) {
                return Err(Error::validation("models", "must not contain empty names"));
            }
        }
        if self.max_tokens == Some(0) {
            return Err(Error::validation("max_tokens", "must be at least 1"));
        }
        check_range("temperature", self.temperature, 0.0, 2.0)?;
        check_range("top_p", self.top_p, 0.0, 1.0)?;
        check_range("frequency_penalty", self.frequency_penalty, -2.0, 2.0)?;
        check_range("presence_penalty", self.presence_penalty, -2.0, 2.0)?;
        check_range("repetition_penalty", self.repetition_penalty, 0.0, 2.0)?;
        check_range("min_p", self.min_p, 0.0, 1.0)?;
        check_range("top_a", self.top_a, 0.0, 1.0)?;
        for (i, message) in self.messages.iter().enumerate() {
            if message.role == MessageRole::Tool && message.tool_call_id.is_none() {
                return Err(Error::validation(
                    format!("messages[{i}].tool_call_id"),
                    "required for tool messages",
                ));
            }
        }
        if let Some(tools) = &self.tools {
            for (i, tool) in tools.iter().enumerate() {
                if tool.function.name.trim().is_empty() {
                    return Err(Error::validation(
                        format!("tools[{i}].function.name"),
                        "must not be empty",
                    ));
                }
            }
        }
        if let Some(provider) = &self.provider {
            provider.validate()?;
        }
        Ok(())
    }
}

/// Reasoning effort level for extended thinking / chain-of-thought models.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    Xhigh,
    High,
    Medium,
    Low,
    Minimal,
    None,
}

/// Configuration for extended thinking / reasoning tokens.
///
/// Use `effort` for OpenAI-style models or `max_tokens` for Anthropic/Gemini.
/// Do not set both simultaneously.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ReasoningConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effort: Option<ReasoningEffort>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Use reasoning internally but omit it from the response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclude: Option<bool>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct UsageConfig {
    pub include: bool,
}

/// JSON output format type.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum ResponseFormatType {
    #[serde(rename = "text")]
    Text,
    #[serde(rename = "json_object")]
    JsonObject,
    #[serde(rename = "json_schema")]
    JsonSchema,
}

/// Output format constraint.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub fmt_type: ResponseFormatType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_schema: Option<JsonSchemaFormat>,
}

impl ResponseFormat {
    pub fn json_object() -> Self {
        Self {
            fmt_type: ResponseFormatType::JsonObject,
            json_schema: None,
        }
    }

    /// Structured output constrained by `schema`.
    pub fn json_schema(name: impl Into<String>, schema: serde_json::Value) -> Self {
        Self {
            fmt_type: ResponseFormatType::JsonSchema,
            json_schema: Some(JsonSchemaFormat {
                name: name.into(),
                strict: Some(true),
                schema,
            }),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct JsonSchemaFormat {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strict: Option<bool>,
    pub schema: serde_json::Value,
}

// ── Provider routing preferences ───────────────────────────────────

/// Provider routing preferences, passed through to OpenRouter verbatim.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ProviderPreferences {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_fallbacks: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub require_parameters: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_collection: Option<DataCollection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub only: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignore: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantizations: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<ProviderSort>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_price: Option<MaxPrice>,
}

impl ProviderPreferences {
    /// Prefer `providers` in the given order.
    pub fn ordered(providers: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            order: Some(providers.into_iter().map(Into::into).collect()),
            ..Default::default()
        }
    }

    pub fn with_fallbacks(mut self, allow: bool) -> Self {
        self.allow_fallbacks = Some(allow);
        self
    }

    pub fn with_sort(mut self, sort: ProviderSort) -> Self {
        self.sort = Some(sort);
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if let Some(max_price) = &self.max_price {
            for (field, value) in [
                ("provider.max_price.prompt", max_price.prompt),
                ("provider.max_price.completion", max_price.completion),
                ("provider.max_price.request", max_price.request),
                ("provider.max_price.image", max_price.image),
            ] {
                if value.is_some_and(|v| v < 0.0) {
                    return Err(Error::validation(field, "must not be negative"));
                }
            }
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DataCollection {
    Allow,
    Deny,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderSort {
    Price,
    Throughput,
    Latency,
}

/// Per-million-token price ceilings (USD).
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct MaxPrice {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<f64>,
}

// ── Plugin types ───────────────────────────────────────────────────

/// An OpenRouter plugin configuration, keyed by plugin id.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(tag = "id")]
pub enum Plugin {
    /// Web search plugin.
    #[serde(rename = "web")]
    Web {
        #[serde(skip_serializing_if = "Option::is_none")]
        max_results: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        search_prompt: Option<String>,
    },
    /// Response healing plugin (auto-fixes truncated JSON, etc.).
    #[serde(rename = "response-healing")]
    ResponseHealing,
    /// File parser plugin (PDF, etc.).
    #[serde(rename = "file-parser")]
    FileParser {
        #[serde(skip_serializing_if = "Option::is_none")]
        pdf: Option<FileParserPdfConfig>,
    },
}

/// PDF engine configuration for the file-parser plugin.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct FileParserPdfConfig {
    pub engine: String,
}

impl Plugin {
    pub fn web() -> Self {
        Plugin::Web {
            max_results: None,
            search_prompt: None,
        }
    }

    pub fn file_parser(engine: impl Into<String>) -> Self {
        Plugin::FileParser {
            pdf: Some(FileParserPdfConfig {
                engine: engine.into(),
            }),
        }
    }
}

// ── Message types ──────────────────────────────────────────────────

/// Role of a message in the conversation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::Tool => write!(f, "tool"),
        }
    }
}

/// Message content: a plain string, or a list of typed parts for multimodal
/// input. Serialized untagged, matching the wire format.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// Concatenated text of all text parts. Borrows plain-string content.
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            MessageContent::Text(s) => Cow::Borrowed(s),
            MessageContent::Parts(parts) => Cow::Owned(
                parts
                    .iter()
                    .filter_map(|p| match p {
                        ContentPart::Text { text } => Some(text.as_str()),
                        _ => None,
                    })
                    .collect(),
            ),
        }
    }

    pub fn text(&self) -> String {
        self.as_text().into_owned()
    }
}

impl From<String> for MessageContent {
    fn from(s: String) -> Self {
        MessageContent::Text(s)
    }
}

impl From<&str> for MessageContent {
    fn from(s: &str) -> Self {
        MessageContent::Text(s.to_string())
    }
}

impl From<Vec<ContentPart>> for MessageContent {
    fn from(parts: Vec<ContentPart>) -> Self {
        MessageContent::Parts(parts)
    }
}

/// One part of a multimodal message.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
    File { file: FileData },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    /// An image by URL or `data:` URI.
    pub fn image_url(url: impl Into<String>) -> Self {
        ContentPart::ImageUrl {
            image_url: ImageUrl {
                url: url.into(),
                detail: None,
            },
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ImageUrl {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FileData {
    pub filename: String,
    /// `data:` URI with the base64 file content.
    pub file_data: String,
}

/// A message in the conversation.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Message {
    pub role: MessageRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<MessageContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    fn with_role(role: MessageRole, content: MessageContent) -> Self {
        Self {
            role,
            content: Some(content),
            name: None,
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<MessageContent>) -> Self {
        Self::with_role(MessageRole::System, content.into())
    }

    pub fn user(content: impl Into<MessageContent>) -> Self {
        Self::with_role(MessageRole::User, content.into())
    }

    pub fn assistant_text(content: impl Into<MessageContent>) -> Self {
        Self::with_role(MessageRole::Assistant, content.into())
    }

    pub fn assistant_tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: None,
            name: None,
            tool_calls: Some(calls),
            tool_call_id: None,
        }
    }

    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(call_id.into()),
            ..Self::with_role(MessageRole::Tool, MessageContent::Text(content.into()))
        }
    }
}

// ── Tool types ─────────────────────────────────────────────────────

/// The type of a tool definition. Currently always `Function`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub enum ToolType {
    #[default]
    #[serde(rename = "function")]
    Function,
}

/// Tool definition sent to the API (OpenAI function-calling format).
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ToolDef {
    #[serde(rename = "type")]
    pub tool_type: ToolType,
    pub function: FunctionDef,
}

impl ToolDef {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            tool_type: ToolType::Function,
            function: FunctionDef {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }

    /// A tool whose parameter schema is derived from `T`.
    pub fn for_args<T: schemars::JsonSchema>(
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self::new(name, description, crate::json_schema_for::<T>())
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct FunctionDef {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Tool selection policy: `"none"`, `"auto"`, `"required"`, or a specific
/// function.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum ToolChoice {
    Mode(String),
    Function {
        #[serde(rename = "type")]
        tool_type: ToolType,
        function: ToolChoiceFunction,
    },
}

impl ToolChoice {
    pub fn auto() -> Self {
        ToolChoice::Mode("auto".to_string())
    }

    pub fn function(name: impl Into<String>) -> Self {
        ToolChoice::Function {
            tool_type: ToolType::Function,
            function: ToolChoiceFunction { name: name.into() },
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ToolChoiceFunction {
    pub name: String,
}

/// A tool call returned by the model.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default)]
    pub call_type: ToolType,
    pub function: FunctionCallData,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FunctionCallData {
    pub name: String,
    pub arguments: String,
}
