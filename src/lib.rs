//! Screen and text translation over OpenAI-compatible chat completions.
//!
//! - `api`: chat-completions client, blocking and SSE streaming
//! - `prompts`: extract/translate prompt templates
//! - `translation`: capture -> extract -> translate pipeline
//! - `capture`: region capture seam
//! - `config`: persisted settings

pub mod api;
pub mod capture;
pub mod config;
pub mod error;
pub mod prompts;
pub mod translation;

pub use error::ApiError;
