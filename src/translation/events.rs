//! Outbound notifications: streamed text and pipeline lifecycle events.

use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};

use super::types::Stage;

pub const EVENT_STARTED: &str = "translation:started";
pub const EVENT_PROGRESS: &str = "translation:progress";
pub const EVENT_RESULT: &str = "translation:result";
pub const EVENT_ERROR: &str = "translation:error";

/// Receives the cumulative text of a streaming call.
pub type StreamHandler = Arc<dyn Fn(Stage, &str) + Send + Sync>;

/// Fire-and-forget event bus towards the UI. Must not block.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &str, payload: serde_json::Value);
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamUpdate {
    pub stage: Stage,
    pub text: String,
}

/// Handler that forwards every update into a channel.
pub fn stream_channel() -> (StreamHandler, Receiver<StreamUpdate>) {
    let (tx, rx) = channel::<StreamUpdate>();
    let tx = Mutex::new(tx);
    let handler: StreamHandler = Arc::new(move |stage: Stage, text: &str| {
        if let Ok(tx) = tx.lock() {
            // Receiver gone means nobody is listening any more.
            let _ = tx.send(StreamUpdate {
                stage,
                text: text.to_string(),
            });
        }
    });
    (handler, rx)
}

/// [`EventSink`] backed by a channel of `(event, payload)` pairs.
pub struct ChannelSink {
    tx: Mutex<Sender<(String, serde_json::Value)>>,
}

impl ChannelSink {
    pub fn new() -> (Self, Receiver<(String, serde_json::Value)>) {
        let (tx, rx) = channel();
        (Self { tx: Mutex::new(tx) }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: &str, payload: serde_json::Value) {
        if let Ok(tx) = self.tx.lock() {
            let _ = tx.send((event.to_string(), payload));
        }
    }
}
