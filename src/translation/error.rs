use thiserror::Error;

use super::types::Stage;
use crate::error::ApiError;

/// Pipeline failure, tagged with the stage that produced it.
#[derive(Debug, Error)]
pub enum TranslationError {
    #[error("capture failed: {0}")]
    Capture(#[source] anyhow::Error),

    #[error("{stage} failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: ApiError,
    },

    #[error("translate failed: input text is empty")]
    EmptyInput,

    #[error("configuration error: {0}")]
    Config(String),
}

impl TranslationError {
    pub(crate) fn at(stage: Stage) -> impl FnOnce(ApiError) -> TranslationError {
        move |source| TranslationError::Stage { stage, source }
    }

    /// `None` for errors raised before any stage ran.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            TranslationError::Capture(_) => Some(Stage::Capture),
            TranslationError::Stage { stage, .. } => Some(*stage),
            TranslationError::EmptyInput => Some(Stage::Translate),
            TranslationError::Config(_) => None,
        }
    }

    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            TranslationError::Stage { source, .. } => Some(source),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.api_error().is_some_and(ApiError::is_cancelled)
    }
}
