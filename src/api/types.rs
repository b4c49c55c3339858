use serde::{Deserialize, Serialize};

use crate::error::ApiError;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// `content` of a chat message: either a plain string or an ordered list
/// of typed parts. Never both.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// Concatenated `text` of every `type == "text"` part; other part types
    /// are skipped. Plain strings are returned verbatim.
    pub fn text_fragments(&self) -> String {
        match self {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter(|p| p.kind == ContentPart::TEXT)
                .filter_map(|p| p.text.as_deref())
                .collect(),
        }
    }

    /// Strict coercion used on final responses: a part list must carry at
    /// least one text part.
    pub fn to_text(&self) -> Result<String, ApiError> {
        match self {
            MessageContent::Text(text) => Ok(text.clone()),
            MessageContent::Parts(parts) => {
                if parts.iter().any(|p| p.kind == ContentPart::TEXT) {
                    Ok(self.text_fragments())
                } else {
                    Err(ApiError::Protocol(
                        "message content carries no text parts".to_string(),
                    ))
                }
            }
        }
    }
}

impl From<String> for MessageContent {
    fn from(value: String) -> Self {
        MessageContent::Text(value)
    }
}

impl From<&str> for MessageContent {
    fn from(value: &str) -> Self {
        MessageContent::Text(value.to_string())
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ContentPart {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<ImageUrl>,
}

impl ContentPart {
    pub const TEXT: &'static str = "text";
    pub const IMAGE_URL: &'static str = "image_url";

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: Self::TEXT.to_string(),
            text: Some(text.into()),
            image_url: None,
        }
    }

    pub fn image_url(url: impl Into<String>) -> Self {
        Self {
            kind: Self::IMAGE_URL.to_string(),
            text: None,
            image_url: Some(ImageUrl { url: url.into() }),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Message {
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<MessageContent>,
}

impl Message {
    pub fn system(content: impl Into<MessageContent>) -> Self {
        Self {
            role: Role::System,
            content: Some(content.into()),
        }
    }

    pub fn user(content: impl Into<MessageContent>) -> Self {
        Self {
            role: Role::User,
            content: Some(content.into()),
        }
    }

    pub fn assistant(content: impl Into<MessageContent>) -> Self {
        Self {
            role: Role::Assistant,
            content: Some(content.into()),
        }
    }

    pub fn content_text(&self) -> Result<String, ApiError> {
        match &self.content {
            Some(content) => content.to_text(),
            None => Err(ApiError::Protocol("message has no content".to_string())),
        }
    }
}

#[derive(Serialize, Clone, Debug)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub temperature: f32,
    pub top_p: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    // Owned by the transport: `post` clears it, `stream` sets it.
    pub(crate) stream: bool,
}

impl ChatCompletionRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: 1.0,
            top_p: 0.9,
            max_tokens: None,
            stream: false,
        }
    }

    pub fn with_sampling(mut self, temperature: f32, top_p: f32) -> Self {
        self.temperature = temperature;
        self.top_p = top_p;
        self
    }

    pub fn is_stream(&self) -> bool {
        self.stream
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

/// Provider-reported error object.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct ApiErrorBody {
    #[serde(default, deserialize_with = "lenient_string")]
    pub code: String,
    #[serde(default)]
    pub message: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

impl From<ApiErrorBody> for ApiError {
    fn from(body: ApiErrorBody) -> Self {
        ApiError::Api {
            code: body.code,
            message: body.message,
            kind: body.kind,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Choice {
    #[serde(default)]
    pub index: u32,
    pub message: Message,
    #[serde(default, deserialize_with = "lenient_string")]
    pub finish_reason: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Usage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiErrorBody>,
}

impl ChatCompletionResponse {
    /// Text of the first choice. Zero choices is an empty result.
    pub fn first_text(&self) -> Result<String, ApiError> {
        let choice = self
            .choices
            .first()
            .ok_or_else(|| ApiError::EmptyResult("response has no choices".to_string()))?;
        choice.message.content_text()
    }
}

// --- STREAMING WIRE TYPES ---

#[derive(Deserialize, Debug, Default)]
pub(crate) struct StreamChunk {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub choices: Vec<StreamChoice>,
    #[serde(default)]
    pub usage: Option<Usage>,
    #[serde(default)]
    pub error: Option<ApiErrorBody>,
}

#[derive(Deserialize, Debug, Default)]
pub(crate) struct StreamChoice {
    #[serde(default)]
    pub delta: StreamDelta,
    #[serde(default, deserialize_with = "lenient_string")]
    pub finish_reason: String,
}

#[derive(Deserialize, Debug, Default)]
pub(crate) struct StreamDelta {
    #[serde(default)]
    pub content: Option<MessageContent>,
}

/// Accepts a string, a number or null; providers disagree on `code` and
/// send `finish_reason: null` mid-stream.
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(s)) => s,
        Some(other) => other.to_string(),
    })
}
