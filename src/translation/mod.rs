//! Translation pipeline: capture -> extract -> translate, or a single
//! vision call, delivered synchronously or streamed.

mod error;
mod events;
mod service;
mod types;

pub use error::TranslationError;
pub use events::{
    stream_channel, ChannelSink, EventSink, StreamHandler, StreamUpdate, EVENT_ERROR,
    EVENT_PROGRESS, EVENT_RESULT, EVENT_STARTED,
};
pub use service::{PromptSet, TranslationService};
pub use types::{
    Bounds, Delivery, Options, PipelinePlan, ScreenshotTranslationResult, Stage,
    TextTranslationResult, TranslationMode,
};
