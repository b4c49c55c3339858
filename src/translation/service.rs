use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

use serde_json::json;
use tracing::{debug, info, warn};

use super::error::TranslationError;
use super::events::{
    EventSink, StreamHandler, EVENT_ERROR, EVENT_PROGRESS, EVENT_RESULT, EVENT_STARTED,
};
use super::types::{
    Bounds, Delivery, Options, PipelinePlan, ScreenshotTranslationResult, Stage,
    TextTranslationResult, TranslationMode,
};
use crate::api::{CancellationToken, ChatClient, ChatCompletionResponse, ClientConfig, Endpoint, ImageInput};
use crate::capture::{sniff_mime_type, ScreenCapture};
use crate::error::ApiError;
use crate::prompts::{
    build_vision_direct_prompt, process_extract_prompt, process_translate_prompt,
    PromptVariables, DEFAULT_EXTRACT_PROMPT, DEFAULT_TRANSLATE_PROMPT,
};

/// Extract and translate templates, before placeholder substitution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PromptSet {
    pub extract: String,
    pub translate: String,
}

impl PromptSet {
    /// Blank templates fall back to the built-in defaults.
    pub fn new(extract: &str, translate: &str) -> Self {
        Self {
            extract: normalize_prompt(extract, DEFAULT_EXTRACT_PROMPT),
            translate: normalize_prompt(translate, DEFAULT_TRANSLATE_PROMPT),
        }
    }
}

impl Default for PromptSet {
    fn default() -> Self {
        Self::new("", "")
    }
}

fn normalize_prompt(value: &str, fallback: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

struct CachedClient {
    key: (Endpoint, Endpoint),
    client: Arc<ChatClient>,
}

/// Screenshot and text translation pipeline.
///
/// Calls run on the caller's thread. Settings can be swapped between (or
/// during) calls from other threads; each call works on a snapshot taken
/// when it starts, except stream forwarding which re-reads the handler
/// slot for every delta.
pub struct TranslationService {
    capture: Arc<dyn ScreenCapture>,
    client_config: RwLock<Option<ClientConfig>>,
    client: Mutex<Option<CachedClient>>,
    agent: Option<ureq::Agent>,
    prompts: RwLock<PromptSet>,
    options: RwLock<Options>,
    stream_handler: RwLock<Option<StreamHandler>>,
    events: Option<Arc<dyn EventSink>>,
    current_call: Mutex<CancellationToken>,
}

impl TranslationService {
    pub fn new(capture: Arc<dyn ScreenCapture>) -> Self {
        Self {
            capture,
            client_config: RwLock::new(None),
            client: Mutex::new(None),
            agent: None,
            prompts: RwLock::new(PromptSet::default()),
            options: RwLock::new(Options::default()),
            stream_handler: RwLock::new(None),
            events: None,
            current_call: Mutex::new(CancellationToken::new()),
        }
    }

    pub fn with_client_config(self, config: ClientConfig) -> Self {
        self.update_client_config(config);
        self
    }

    /// HTTP agent used whenever the client is rebuilt.
    pub fn with_agent(mut self, agent: ureq::Agent) -> Self {
        self.agent = Some(agent);
        self
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = Some(sink);
        self
    }

    pub fn with_prompts(self, prompts: PromptSet) -> Self {
        *write(&self.prompts) = prompts;
        self
    }

    pub fn with_options(self, options: Options) -> Self {
        self.update_options(options);
        self
    }

    // --- RUNTIME CONFIGURATION ---

    /// The client itself is rebuilt lazily, on the next call.
    pub fn update_client_config(&self, config: ClientConfig) {
        *write(&self.client_config) = Some(config);
    }

    pub fn update_prompts(&self, extract: &str, translate: &str) {
        *write(&self.prompts) = PromptSet::new(extract, translate);
    }

    pub fn update_options(&self, options: Options) {
        *write(&self.options) = options;
    }

    pub fn set_stream_handler(&self, handler: Option<StreamHandler>) {
        *write(&self.stream_handler) = handler;
    }

    pub fn options(&self) -> Options {
        read(&self.options).clone()
    }

    pub fn prompts(&self) -> PromptSet {
        read(&self.prompts).clone()
    }

    /// Abort the in-flight streaming call, if any.
    pub fn cancel(&self) {
        lock(&self.current_call).cancel();
    }

    /// Current client, rebuilt only when the resolved endpoints changed.
    pub fn client(&self) -> Result<Arc<ChatClient>, TranslationError> {
        let config = read(&self.client_config)
            .clone()
            .ok_or_else(|| TranslationError::Config("AI client is not configured".to_string()))?;
        let key = (config.translate_endpoint(), config.vision_endpoint());

        let mut cached = lock(&self.client);
        if let Some(entry) = cached.as_ref() {
            if entry.key == key {
                return Ok(entry.client.clone());
            }
        }

        info!(
            base_url = %key.0.base_url,
            translate_model = %key.0.model,
            vision_base_url = %key.1.base_url,
            vision_model = %key.1.model,
            "building chat client"
        );
        let client = Arc::new(match &self.agent {
            Some(agent) => ChatClient::with_agent(&config, agent.clone()),
            None => ChatClient::new(&config),
        });
        *cached = Some(CachedClient {
            key,
            client: client.clone(),
        });
        Ok(client)
    }

    // --- PIPELINES ---

    /// Capture the region, then OCR + translate or translate directly.
    pub fn process_screenshot_detailed(
        &self,
        start_x: i32,
        start_y: i32,
        end_x: i32,
        end_y: i32,
    ) -> Result<ScreenshotTranslationResult, TranslationError> {
        let started = Instant::now();
        let bounds = Bounds::new(start_x, start_y, end_x, end_y);

        let outcome = self.client().and_then(|client| {
            let options = self.options();
            let prompts = self.prompts();
            let plan = PipelinePlan::resolve(&options, self.has_stream_handler());
            let cancel = self.begin_call();

            self.emit(
                EVENT_STARTED,
                json!({ "kind": "screenshot", "plan": plan, "bounds": bounds }),
            );
            debug!(?plan, ?bounds, "screenshot pipeline started");

            self.run_screenshot(&client, plan, &options, &prompts, bounds, &cancel)
        });

        match outcome {
            Ok(mut result) => {
                result.elapsed = started.elapsed();
                self.emit(EVENT_RESULT, serde_json::to_value(&result).unwrap_or_default());
                Ok(result)
            }
            Err(err) => {
                self.report_error(&err, Some(bounds), started);
                Err(err)
            }
        }
    }

    /// Translate raw text with the translate endpoint only.
    pub fn translate_text(&self, input: &str) -> Result<TextTranslationResult, TranslationError> {
        let started = Instant::now();

        let outcome = self.client().and_then(|client| {
            if input.trim().is_empty() {
                return Err(TranslationError::EmptyInput);
            }

            let options = self.options();
            let prompts = self.prompts();
            let plan = PipelinePlan::resolve(&options, self.has_stream_handler());
            let cancel = self.begin_call();
            self.emit(EVENT_STARTED, json!({ "kind": "text", "plan": plan }));

            let translate_prompt = process_translate_prompt(&prompts.translate, &prompt_vars(&options));
            self.progress(Stage::Translate);
            let translated_text = self
                .request_translation(&client, plan.delivery, input, &translate_prompt, &cancel)
                .and_then(|resp| resp.first_text())
                .map_err(TranslationError::at(Stage::Translate))?;

            Ok(TextTranslationResult {
                original_text: input.to_string(),
                translated_text,
                translate_prompt,
                elapsed: started.elapsed(),
            })
        });

        match outcome {
            Ok(result) => {
                self.emit(EVENT_RESULT, serde_json::to_value(&result).unwrap_or_default());
                Ok(result)
            }
            Err(err) => {
                self.report_error(&err, None, started);
                Err(err)
            }
        }
    }

    /// Runs `plan.stages()` in order; each stage reports progress first.
    fn run_screenshot(
        &self,
        client: &ChatClient,
        plan: PipelinePlan,
        options: &Options,
        prompts: &PromptSet,
        bounds: Bounds,
        cancel: &CancellationToken,
    ) -> Result<ScreenshotTranslationResult, TranslationError> {
        let vars = prompt_vars(options);
        let mut result = ScreenshotTranslationResult {
            extract_prompt: process_extract_prompt(&prompts.extract, &vars),
            translate_prompt: process_translate_prompt(&prompts.translate, &vars),
            bounds,
            ..Default::default()
        };
        let mut image = ImageInput::png(Vec::new());

        for &stage in plan.stages() {
            self.progress(stage);
            match stage {
                Stage::Capture => {
                    let png = self
                        .capture
                        .capture_to_bytes(bounds.start_x, bounds.start_y, bounds.end_x, bounds.end_y)
                        .map_err(TranslationError::Capture)?;
                    let mime = sniff_mime_type(&png);
                    image = ImageInput::new(png, mime);
                }
                Stage::Extract => {
                    // OCR output feeds the next call, so it is never streamed.
                    result.extracted_text = client
                        .vision(&result.extract_prompt, &image, "")
                        .and_then(|resp| resp.first_text())
                        .map_err(TranslationError::at(Stage::Extract))?;

                    if result.extracted_text.trim().is_empty() {
                        info!("no text found in capture, skipping translation");
                        break;
                    }
                }
                Stage::Translate => {
                    let response = match plan.mode {
                        TranslationMode::VisionDirect => {
                            let prompt = build_vision_direct_prompt(&vars);
                            self.request_vision_translation(client, plan.delivery, &prompt, &image, cancel)
                        }
                        TranslationMode::OcrRelay => self.request_translation(
                            client,
                            plan.delivery,
                            &result.extracted_text,
                            &result.translate_prompt,
                            cancel,
                        ),
                    };
                    result.translated_text = response
                        .and_then(|resp| resp.first_text())
                        .map_err(TranslationError::at(Stage::Translate))?;
                }
            }
        }

        Ok(result)
    }

    // --- DELIVERY ---

    fn request_translation(
        &self,
        client: &ChatClient,
        delivery: Delivery,
        input: &str,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<ChatCompletionResponse, ApiError> {
        match delivery {
            Delivery::Sync => client.translate(input, prompt),
            Delivery::Streaming => client.translate_stream(
                input,
                prompt,
                |text: &str| self.forward_stream(Stage::Translate, text),
                cancel,
            ),
        }
    }

    fn request_vision_translation(
        &self,
        client: &ChatClient,
        delivery: Delivery,
        prompt: &str,
        image: &ImageInput,
        cancel: &CancellationToken,
    ) -> Result<ChatCompletionResponse, ApiError> {
        match delivery {
            Delivery::Sync => client.vision(prompt, image, ""),
            Delivery::Streaming => client.vision_stream(
                prompt,
                image,
                "",
                |text: &str| self.forward_stream(Stage::Translate, text),
                cancel,
            ),
        }
    }

    // --- NOTIFICATIONS ---

    fn has_stream_handler(&self) -> bool {
        read(&self.stream_handler).is_some()
    }

    /// Dropped unless streaming is on and a handler is registered right now.
    fn forward_stream(&self, stage: Stage, text: &str) {
        if !read(&self.options).stream_enabled {
            return;
        }
        let handler = read(&self.stream_handler).clone();
        if let Some(handler) = handler {
            handler(stage, text);
        }
    }

    fn progress(&self, stage: Stage) {
        debug!(%stage, "pipeline stage");
        self.emit(EVENT_PROGRESS, json!({ "stage": stage }));
    }

    fn emit(&self, event: &str, payload: serde_json::Value) {
        if let Some(sink) = &self.events {
            sink.emit(event, payload);
        }
    }

    fn report_error(&self, err: &TranslationError, bounds: Option<Bounds>, started: Instant) {
        let stage = err.stage().map(|s| s.as_str()).unwrap_or("init");
        warn!(stage, error = %err, "translation failed");
        self.emit(
            EVENT_ERROR,
            json!({
                "stage": stage,
                "message": err.to_string(),
                "bounds": bounds,
                "elapsed": started.elapsed().as_millis() as u64,
            }),
        );
    }

    fn begin_call(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *lock(&self.current_call) = token.clone();
        token
    }
}

fn prompt_vars(options: &Options) -> PromptVariables {
    PromptVariables {
        source_language: options.source_language.clone(),
        target_language: options.target_language.clone(),
        use_vision_for_translation: options.use_vision_for_translation,
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::NoCapture;

    fn service() -> TranslationService {
        TranslationService::new(Arc::new(NoCapture))
    }

    #[test]
    fn blank_prompts_use_defaults() {
        let prompts = PromptSet::new("  ", " custom ");
        assert_eq!(prompts.extract, DEFAULT_EXTRACT_PROMPT);
        assert_eq!(prompts.translate, "custom");
    }

    #[test]
    fn unconfigured_client_is_config_error() {
        let err = service().translate_text("hello").unwrap_err();
        assert!(matches!(err, TranslationError::Config(_)));
        assert_eq!(err.stage(), None);
    }

    #[test]
    fn blank_text_rejected() {
        let svc = service().with_client_config(ClientConfig::default());
        let err = svc.translate_text(" \n ").unwrap_err();
        assert!(matches!(err, TranslationError::EmptyInput));
    }

    #[test]
    fn capture_failure_is_capture_stage() {
        let svc = service().with_client_config(ClientConfig::default());
        let err = svc.process_screenshot_detailed(0, 0, 10, 10).unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Capture));
        assert!(err.to_string().starts_with("capture failed"));
    }

    #[test]
    fn client_rebuilt_only_on_endpoint_change() {
        let svc = service().with_client_config(ClientConfig {
            api_key: "k".to_string(),
            ..Default::default()
        });
        let first = svc.client().unwrap();
        let again = svc.client().unwrap();
        assert!(Arc::ptr_eq(&first, &again));

        // Same resolved endpoints, different raw spelling.
        svc.update_client_config(ClientConfig {
            api_key: " k ".to_string(),
            base_url: format!("{}/", crate::api::DEFAULT_BASE_URL),
            ..Default::default()
        });
        assert!(Arc::ptr_eq(&first, &svc.client().unwrap()));

        svc.update_client_config(ClientConfig {
            api_key: "other".to_string(),
            ..Default::default()
        });
        let rebuilt = svc.client().unwrap();
        assert!(!Arc::ptr_eq(&first, &rebuilt));
        assert_eq!(rebuilt.translate_endpoint().api_key, "other");
    }

    #[test]
    fn forward_respects_stream_flag() {
        let svc = service();
        let (handler, rx) = crate::translation::stream_channel();
        svc.set_stream_handler(Some(handler));

        svc.forward_stream(Stage::Translate, "one");
        svc.update_options(Options {
            stream_enabled: false,
            ..Options::default()
        });
        svc.forward_stream(Stage::Translate, "two");
        svc.set_stream_handler(None);

        let texts: Vec<String> = rx.try_iter().map(|u| u.text).collect();
        assert_eq!(texts, vec!["one"]);
    }
}
