pub mod client;
pub mod stream;
pub mod types;

pub use client::{
    normalize_base_url, normalize_base_url_or, normalize_model, ChatClient, ClientConfig,
    Endpoint, ImageInput, DEFAULT_BASE_URL, DEFAULT_TRANSLATE_MODEL, DEFAULT_VISION_MODEL,
    UREQ_AGENT,
};
pub use stream::{
    read_event_stream, read_event_stream_detached, CancellationToken, DeltaAccumulator, SseEvent,
    SseFrameReader, CANCEL_POLL_INTERVAL,
};
pub use types::{
    ChatCompletionRequest, ChatCompletionResponse, Choice, ContentPart, Message, MessageContent,
    Role, Usage,
};
