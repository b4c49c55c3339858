//! Settings struct definition.

use serde::{Deserialize, Serialize};

use super::types::{
    default_base_url, default_source_language, default_target_language,
    default_translate_model, default_true, default_vision_model,
};
use crate::api::{normalize_base_url, normalize_base_url_or, normalize_model, ClientConfig};
use crate::prompts::{DEFAULT_EXTRACT_PROMPT, DEFAULT_TRANSLATE_PROMPT};
use crate::translation::{Options, PromptSet};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default, alias = "apiKeyOverride")]
    pub api_key: String,
    #[serde(default = "default_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_translate_model")]
    pub translate_model: String,
    #[serde(default = "default_vision_model")]
    pub vision_model: String,
    // Blank vision fields inherit the translate endpoint.
    #[serde(default)]
    pub vision_api_base_url: String,
    #[serde(default, alias = "visionApiKeyOverride")]
    pub vision_api_key: String,

    // --- Prompts ---
    #[serde(default)]
    pub extract_prompt: String,
    #[serde(default)]
    pub translate_prompt: String,

    // --- Behaviour ---
    #[serde(default = "default_true")]
    pub enable_stream_output: bool,
    #[serde(default = "default_true")]
    pub use_vision_for_translation: bool,
    #[serde(default = "default_source_language")]
    pub source_language: String,
    #[serde(default = "default_target_language")]
    pub target_language: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base_url: default_base_url(),
            translate_model: default_translate_model(),
            vision_model: default_vision_model(),
            vision_api_base_url: default_base_url(),
            vision_api_key: String::new(),
            extract_prompt: DEFAULT_EXTRACT_PROMPT.to_string(),
            translate_prompt: DEFAULT_TRANSLATE_PROMPT.to_string(),
            enable_stream_output: true,
            use_vision_for_translation: true,
            source_language: default_source_language(),
            target_language: default_target_language(),
        }
    }
}

impl Settings {
    /// Trim every field and fill blanks with defaults.
    pub fn normalized(mut self) -> Self {
        self.api_key = self.api_key.trim().to_string();
        self.api_base_url = normalize_base_url(&self.api_base_url);
        self.translate_model = normalize_model(&self.translate_model, &default_translate_model());
        self.vision_model = normalize_model(&self.vision_model, &default_vision_model());
        self.vision_api_base_url = normalize_base_url_or(&self.vision_api_base_url, &self.api_base_url);
        self.vision_api_key = self.vision_api_key.trim().to_string();

        let prompts = PromptSet::new(&self.extract_prompt, &self.translate_prompt);
        self.extract_prompt = prompts.extract;
        self.translate_prompt = prompts.translate;

        self.source_language = normalize_model(&self.source_language, &default_source_language());
        self.target_language = normalize_model(&self.target_language, &default_target_language());
        self
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            api_key: self.api_key.clone(),
            base_url: self.api_base_url.clone(),
            translate_model: self.translate_model.clone(),
            vision_model: self.vision_model.clone(),
            vision_api_key: self.vision_api_key.clone(),
            vision_base_url: self.vision_api_base_url.clone(),
        }
    }

    pub fn options(&self) -> Options {
        Options {
            stream_enabled: self.enable_stream_output,
            use_vision_for_translation: self.use_vision_for_translation,
            source_language: self.source_language.clone(),
            target_language: self.target_language.clone(),
        }
    }

    pub fn prompts(&self) -> PromptSet {
        PromptSet::new(&self.extract_prompt, &self.translate_prompt)
    }
}
