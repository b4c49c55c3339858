//! Field defaults for [`Settings`](super::Settings).

use crate::api::{DEFAULT_BASE_URL, DEFAULT_TRANSLATE_MODEL, DEFAULT_VISION_MODEL};

pub const APP_DIR_NAME: &str = "screen-translator";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const API_KEY_ENV: &str = "TRANSLATOR_API_KEY";

pub fn default_true() -> bool {
    true
}

pub fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

pub fn default_translate_model() -> String {
    DEFAULT_TRANSLATE_MODEL.to_string()
}

pub fn default_vision_model() -> String {
    DEFAULT_VISION_MODEL.to_string()
}

pub fn default_source_language() -> String {
    "auto".to_string()
}

pub fn default_target_language() -> String {
    "zh-CN".to_string()
}
