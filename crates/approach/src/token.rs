//! Token counting.
//!
//! Two counters behind one trait:
//! - [`HeuristicCounter`]: ~4 characters per token. Deterministic, used by
//!   default and in tests.
//! - [`TiktokenCounter`]: the model's BPE vocabulary via `tiktoken-rs`.
//!
//! Every message costs a fixed overhead on top of its content for the role
//! name and wire-format delimiters.

use groundchat_core::message::Message;
use std::sync::Arc;
use tiktoken_rs::CoreBPE;
use tracing::warn;

use crate::error::ApproachError;

/// Per-message overhead in tokens.
pub const MESSAGE_OVERHEAD: usize = 4;

pub trait TokenCounter: Send + Sync {
    fn name(&self) -> &str;

    /// Tokens in a bare string.
    fn count_text(&self, text: &str) -> usize;

    /// Tokens for one message including overhead.
    fn count_message(&self, message: &Message) -> usize {
        MESSAGE_OVERHEAD + self.count_text(&message.content)
    }

    fn count_messages(&self, messages: &[Message]) -> usize {
        messages.iter().map(|m| self.count_message(m)).sum()
    }
}

/// 1 token ≈ 4 characters, rounded up.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicCounter;

impl TokenCounter for HeuristicCounter {
    fn name(&self) -> &str {
        "heuristic"
    }

    fn count_text(&self, text: &str) -> usize {
        text.len().div_ceil(4)
    }
}

/// BPE counter for OpenAI-family models.
pub struct TiktokenCounter {
    bpe: Arc<CoreBPE>,
}

impl TiktokenCounter {
    /// Load the vocabulary for `model`, falling back to `cl100k_base` for
    /// models tiktoken does not know (e.g. Azure deployment names).
    pub fn for_model(model: &str) -> Result<Self, ApproachError> {
        let bpe = match tiktoken_rs::get_bpe_from_model(model) {
            Ok(bpe) => bpe,
            Err(_) => tiktoken_rs::cl100k_base().map_err(|e| ApproachError::Tokenizer {
                model: model.to_string(),
                reason: e.to_string(),
            })?,
        };
        Ok(Self { bpe: Arc::new(bpe) })
    }
}

impl TokenCounter for TiktokenCounter {
    fn name(&self) -> &str {
        "tiktoken"
    }

    fn count_text(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }
}

/// Pick the counter named by the `tokenizer` setting.
///
/// Falls back to the heuristic when the BPE vocabulary cannot be loaded.
pub fn counter_for(tokenizer: &str, model: &str) -> Arc<dyn TokenCounter> {
    if tokenizer != "tiktoken" {
        return Arc::new(HeuristicCounter);
    }
    match TiktokenCounter::for_model(model) {
        Ok(counter) => Arc::new(counter),
        Err(e) => {
            warn!(model, error = %e, "Tokenizer unavailable, using heuristic counter");
            Arc::new(HeuristicCounter)
        }
    }
}
