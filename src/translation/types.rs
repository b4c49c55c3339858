use std::fmt;
use std::time::Duration;

use serde::Serialize;

/// Runtime switches read by every pipeline call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Options {
    pub stream_enabled: bool,
    pub use_vision_for_translation: bool,
    pub source_language: String,
    pub target_language: String,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            stream_enabled: true,
            use_vision_for_translation: true,
            source_language: "auto".to_string(),
            target_language: "zh-CN".to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Capture,
    Extract,
    Translate,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Capture => "capture",
            Stage::Extract => "extract",
            Stage::Translate => "translate",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TranslationMode {
    /// OCR first, then a separate text translation call.
    OcrRelay,
    /// One vision call reads and translates.
    VisionDirect,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
    Sync,
    Streaming,
}

/// Mode x delivery for one pipeline run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct PipelinePlan {
    pub mode: TranslationMode,
    pub delivery: Delivery,
}

impl PipelinePlan {
    /// Streaming needs both the option and a registered handler.
    pub fn resolve(options: &Options, has_stream_handler: bool) -> Self {
        let mode = if options.use_vision_for_translation {
            TranslationMode::VisionDirect
        } else {
            TranslationMode::OcrRelay
        };
        let delivery = if options.stream_enabled && has_stream_handler {
            Delivery::Streaming
        } else {
            Delivery::Sync
        };
        Self { mode, delivery }
    }

    /// Screenshot stages in execution order.
    pub fn stages(&self) -> &'static [Stage] {
        match self.mode {
            TranslationMode::VisionDirect => &[Stage::Capture, Stage::Translate],
            TranslationMode::OcrRelay => &[Stage::Capture, Stage::Extract, Stage::Translate],
        }
    }
}

/// Screen region normalized from two arbitrary corners.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Bounds {
    pub start_x: i32,
    pub start_y: i32,
    pub end_x: i32,
    pub end_y: i32,
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
}

impl Bounds {
    /// Width and height never drop below 1.
    pub fn new(start_x: i32, start_y: i32, end_x: i32, end_y: i32) -> Self {
        let (left, right) = (start_x.min(end_x), start_x.max(end_x));
        let (top, bottom) = (start_y.min(end_y), start_y.max(end_y));
        Self {
            start_x,
            start_y,
            end_x,
            end_y,
            left,
            top,
            width: (right - left).max(1),
            height: (bottom - top).max(1),
        }
    }

    pub fn right(&self) -> i32 {
        self.left + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.top + self.height
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenshotTranslationResult {
    pub extracted_text: String,
    pub translated_text: String,
    pub extract_prompt: String,
    pub translate_prompt: String,
    pub bounds: Bounds,
    #[serde(serialize_with = "as_millis")]
    pub elapsed: Duration,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextTranslationResult {
    pub original_text: String,
    pub translated_text: String,
    pub translate_prompt: String,
    #[serde(serialize_with = "as_millis")]
    pub elapsed: Duration,
}

fn as_millis<S: serde::Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(value.as_millis() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_from_reversed_corners() {
        let b = Bounds::new(50, 50, 10, 10);
        assert_eq!((b.left, b.top, b.width, b.height), (10, 10, 40, 40));
        assert_eq!((b.right(), b.bottom()), (50, 50));
        assert_eq!((b.start_x, b.end_x), (50, 10));
    }

    #[test]
    fn bounds_never_zero() {
        let b = Bounds::new(5, 5, 5, 5);
        assert_eq!((b.left, b.top, b.width, b.height), (5, 5, 1, 1));
    }

    #[test]
    fn plan_lookup() {
        let mut options = Options::default();
        let plan = PipelinePlan::resolve(&options, false);
        assert_eq!(plan.mode, TranslationMode::VisionDirect);
        assert_eq!(plan.delivery, Delivery::Sync);
        assert_eq!(plan.stages(), &[Stage::Capture, Stage::Translate]);

        options.use_vision_for_translation = false;
        let plan = PipelinePlan::resolve(&options, true);
        assert_eq!(plan.delivery, Delivery::Streaming);
        assert_eq!(plan.stages(), &[Stage::Capture, Stage::Extract, Stage::Translate]);

        options.stream_enabled = false;
        assert_eq!(PipelinePlan::resolve(&options, true).delivery, Delivery::Sync);
    }

    #[test]
    fn result_serializes_camel_case() {
        let result = TextTranslationResult {
            original_text: "a".to_string(),
            translated_text: "b".to_string(),
            translate_prompt: "p".to_string(),
            elapsed: Duration::from_millis(1500),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["originalText"], "a");
        assert_eq!(json["elapsed"], 1500);
    }
}
