//! Pipeline errors.

use groundchat_core::error::{ProviderError, SearchError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApproachError {
    /// The caller's overrides cannot be honoured together.
    #[error("Invalid overrides: {0}")]
    InvalidOverrides(String),

    /// No BPE vocabulary could be loaded for the model.
    #[error("Tokenizer unavailable for model '{model}': {reason}")]
    Tokenizer { model: String, reason: String },

    /// An upstream collaborator failed; propagated unchanged.
    #[error(transparent)]
    Core(#[from] groundchat_core::Error),
}

impl From<ProviderError> for ApproachError {
    fn from(e: ProviderError) -> Self {
        Self::Core(e.into())
    }
}

impl From<SearchError> for ApproachError {
    fn from(e: SearchError) -> Self {
        Self::Core(e.into())
    }
}

pub type Result<T> = std::result::Result<T, ApproachError>;
