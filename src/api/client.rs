use std::time::Duration;

use base64::{engine::general_purpose, Engine as _};
use lazy_static::lazy_static;
use tracing::{debug, warn};

use super::stream::{read_event_stream_detached, CancellationToken};
use super::types::{ChatCompletionRequest, ChatCompletionResponse, ContentPart, Message, MessageContent};
use crate::error::ApiError;

/// Default OpenAI-compatible endpoint.
pub const DEFAULT_BASE_URL: &str = "https://open.bigmodel.cn/api/paas/v4";
pub const DEFAULT_TRANSLATE_MODEL: &str = "glm-4.5-flash";
pub const DEFAULT_VISION_MODEL: &str = "glm-4v-flash";

const TRANSLATE_SAMPLING: (f32, f32) = (1.0, 0.9);
const VISION_SAMPLING: (f32, f32) = (0.7, 0.9);

lazy_static! {
    pub static ref UREQ_AGENT: ureq::Agent = {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(120)))
            .http_status_as_error(false)
            .build();
        config.into()
    };
}

/// Trim, fall back to [`DEFAULT_BASE_URL`] when empty, drop trailing slashes.
pub fn normalize_base_url(value: &str) -> String {
    let trimmed = value.trim();
    let trimmed = if trimmed.is_empty() {
        DEFAULT_BASE_URL
    } else {
        trimmed
    };
    trimmed.trim_end_matches('/').to_string()
}

pub fn normalize_model(value: &str, fallback: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

pub fn normalize_base_url_or(value: &str, fallback: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.trim_end_matches('/').to_string()
    }
}

/// Resolved (key, base URL, model) for one logical role.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

impl Endpoint {
    /// Fails with [`ApiError::Config`] unless the base URL is http(s).
    pub fn chat_completions_url(&self) -> Result<String, ApiError> {
        let lower = self.base_url.to_ascii_lowercase();
        if !(lower.starts_with("http://") || lower.starts_with("https://")) {
            return Err(ApiError::Config(format!(
                "base URL must start with http:// or https://, got {:?}",
                self.base_url
            )));
        }
        Ok(format!("{}/chat/completions", self.base_url))
    }
}

/// Raw client settings. Empty fields fall back when the client is built.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ClientConfig {
    pub api_key: String,
    pub base_url: String,
    pub translate_model: String,
    pub vision_model: String,
    pub vision_api_key: String,
    pub vision_base_url: String,
}

impl ClientConfig {
    pub fn translate_endpoint(&self) -> Endpoint {
        Endpoint {
            api_key: self.api_key.trim().to_string(),
            base_url: normalize_base_url(&self.base_url),
            model: normalize_model(&self.translate_model, DEFAULT_TRANSLATE_MODEL),
        }
    }

    /// Inherits the translate key and base URL when its own are blank.
    pub fn vision_endpoint(&self) -> Endpoint {
        let translate = self.translate_endpoint();
        let api_key = match self.vision_api_key.trim() {
            "" => translate.api_key,
            key => key.to_string(),
        };
        Endpoint {
            api_key,
            base_url: normalize_base_url_or(&self.vision_base_url, &translate.base_url),
            model: normalize_model(&self.vision_model, DEFAULT_VISION_MODEL),
        }
    }
}

/// Image payload for vision requests.
#[derive(Clone, Debug)]
pub struct ImageInput {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl ImageInput {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }

    pub fn png(bytes: Vec<u8>) -> Self {
        Self::new(bytes, "image/png")
    }

    pub fn data_url(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.mime_type,
            general_purpose::STANDARD.encode(&self.bytes)
        )
    }
}

/// OpenAI Chat Completions compatible client with separate translate and
/// vision endpoints.
#[derive(Clone)]
pub struct ChatClient {
    translate: Endpoint,
    vision: Endpoint,
    agent: ureq::Agent,
}

impl ChatClient {
    pub fn new(config: &ClientConfig) -> Self {
        Self::with_agent(config, UREQ_AGENT.clone())
    }

    /// The agent must be built with `http_status_as_error(false)` for
    /// error bodies to reach [`ApiError::Transport`].
    pub fn with_agent(config: &ClientConfig, agent: ureq::Agent) -> Self {
        Self {
            translate: config.translate_endpoint(),
            vision: config.vision_endpoint(),
            agent,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.translate.base_url
    }

    pub fn translate_model(&self) -> &str {
        &self.translate.model
    }

    pub fn vision_model(&self) -> &str {
        &self.vision.model
    }

    pub fn vision_base_url(&self) -> &str {
        &self.vision.base_url
    }

    pub fn translate_endpoint(&self) -> &Endpoint {
        &self.translate
    }

    pub fn vision_endpoint(&self) -> &Endpoint {
        &self.vision
    }

    // --- OPERATIONS ---

    pub fn translate(
        &self,
        user_message: &str,
        system_prompt: &str,
    ) -> Result<ChatCompletionResponse, ApiError> {
        let request = self.translate_request(user_message, system_prompt);
        self.post(request, &self.translate)
    }

    pub fn translate_stream<F>(
        &self,
        user_message: &str,
        system_prompt: &str,
        on_delta: F,
        cancel: &CancellationToken,
    ) -> Result<ChatCompletionResponse, ApiError>
    where
        F: FnMut(&str),
    {
        let request = self.translate_request(user_message, system_prompt);
        self.stream(request, &self.translate, on_delta, cancel)
    }

    /// OCR or direct translation, depending on the prompt.
    pub fn vision(
        &self,
        user_message: &str,
        image: &ImageInput,
        system_prompt: &str,
    ) -> Result<ChatCompletionResponse, ApiError> {
        let request = self.vision_request(user_message, image, system_prompt);
        self.post(request, &self.vision)
    }

    pub fn vision_stream<F>(
        &self,
        user_message: &str,
        image: &ImageInput,
        system_prompt: &str,
        on_delta: F,
        cancel: &CancellationToken,
    ) -> Result<ChatCompletionResponse, ApiError>
    where
        F: FnMut(&str),
    {
        let request = self.vision_request(user_message, image, system_prompt);
        self.stream(request, &self.vision, on_delta, cancel)
    }

    // --- REQUEST BUILDERS ---

    fn translate_request(&self, user_message: &str, system_prompt: &str) -> ChatCompletionRequest {
        let mut messages = Vec::with_capacity(2);
        if !system_prompt.is_empty() {
            messages.push(Message::system(system_prompt));
        }
        messages.push(Message::user(user_message));

        let (temperature, top_p) = TRANSLATE_SAMPLING;
        ChatCompletionRequest::new(self.translate.model.clone(), messages)
            .with_sampling(temperature, top_p)
    }

    fn vision_request(
        &self,
        user_message: &str,
        image: &ImageInput,
        system_prompt: &str,
    ) -> ChatCompletionRequest {
        let (temperature, top_p) = VISION_SAMPLING;
        ChatCompletionRequest::new(
            self.vision.model.clone(),
            build_vision_messages(user_message, image, system_prompt),
        )
        .with_sampling(temperature, top_p)
    }

    // --- TRANSPORT ---

    fn send(
        &self,
        request: &ChatCompletionRequest,
        target: &Endpoint,
    ) -> Result<ureq::http::Response<ureq::Body>, ApiError> {
        let url = target.chat_completions_url()?;
        let body = serde_json::to_string(request)
            .map_err(|e| ApiError::Protocol(format!("failed to encode request: {}", e)))?;

        debug!(
            url = %url,
            model = %request.model,
            stream = request.stream,
            "sending chat completion request"
        );

        let mut builder = self
            .agent
            .post(&url)
            .header("Content-Type", "application/json");
        if !target.api_key.is_empty() {
            builder = builder.header("Authorization", &format!("Bearer {}", target.api_key));
        }

        let resp = builder.send(body.as_bytes())?;

        let status = resp.status().as_u16();
        if !(200..300).contains(&status) {
            let body = resp.into_body().read_to_string().unwrap_or_default();
            warn!(status, url = %url, "chat completion request rejected");
            return Err(ApiError::Transport { status, body });
        }

        Ok(resp)
    }

    /// Blocking call: the whole body is buffered, then decoded.
    pub fn post(
        &self,
        mut request: ChatCompletionRequest,
        target: &Endpoint,
    ) -> Result<ChatCompletionResponse, ApiError> {
        request.stream = false;
        let resp = self.send(&request, target)?;

        let text = resp.into_body().read_to_string()?;
        let mut response: ChatCompletionResponse = serde_json::from_str(&text).map_err(|e| {
            ApiError::Protocol(format!("failed to decode response: {} (body: {})", e, text))
        })?;

        if let Some(error) = response.error.take() {
            return Err(error.into());
        }

        Ok(response)
    }

    /// Streaming call over `text/event-stream`. `on_delta` receives the
    /// cumulative text, in frame order.
    pub fn stream<F>(
        &self,
        mut request: ChatCompletionRequest,
        target: &Endpoint,
        on_delta: F,
        cancel: &CancellationToken,
    ) -> Result<ChatCompletionResponse, ApiError>
    where
        F: FnMut(&str),
    {
        request.stream = true;
        if cancel.is_cancelled() {
            return Err(ApiError::Cancelled);
        }
        let resp = self.send(&request, target)?;

        read_event_stream_detached(resp.into_body().into_reader(), on_delta, cancel)
    }
}

fn build_vision_messages(user_message: &str, image: &ImageInput, system_prompt: &str) -> Vec<Message> {
    let mut messages = Vec::with_capacity(2);
    if !system_prompt.is_empty() {
        messages.push(Message::system(system_prompt));
    }

    let mut parts = Vec::with_capacity(2);
    if !user_message.trim().is_empty() {
        parts.push(ContentPart::text(user_message));
    }
    parts.push(ContentPart::image_url(image.data_url()));

    messages.push(Message::user(MessageContent::Parts(parts)));
    messages
}
