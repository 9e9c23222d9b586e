//! History budgeting.
//!
//! Builds the message list for a model call:
//! `[system] + few_shots + <history, newest kept first> + [current user turn]`.
//! The system prompt, few-shots and current turn are mandatory. Older
//! history is dropped once the next turn would push the total past the
//! limit; equality with the limit still fits.

use groundchat_core::message::{Message, Role};
use std::sync::Arc;
use tracing::debug;

use crate::token::TokenCounter;

/// Prompt budget for one model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenBudget {
    pub token_limit: usize,
    pub model: String,
}

impl TokenBudget {
    pub fn new(token_limit: usize, model: impl Into<String>) -> Self {
        Self {
            token_limit,
            model: model.into(),
        }
    }

    /// Limit left for the prompt once `reserved` tokens are kept for the response.
    pub fn remaining_after(&self, reserved: usize) -> usize {
        self.token_limit.saturating_sub(reserved)
    }
}

/// Selects the newest history that fits a token limit.
#[derive(Clone)]
pub struct HistoryBudgeter {
    counter: Arc<dyn TokenCounter>,
}

impl HistoryBudgeter {
    pub fn new(counter: Arc<dyn TokenCounter>) -> Self {
        Self { counter }
    }

    pub fn counter(&self) -> &dyn TokenCounter {
        self.counter.as_ref()
    }

    /// Build the message list.
    ///
    /// `history` is the whole conversation; its last entry is the turn that
    /// became `current_user_content` and is not walked. Never fails: at
    /// worst the result is the mandatory core alone, which may exceed
    /// `token_limit` if the core itself does.
    pub fn build(
        &self,
        system_prompt: &str,
        few_shots: &[Message],
        history: &[Message],
        current_user_content: &str,
        token_limit: usize,
    ) -> Vec<Message> {
        let mut messages = Vec::with_capacity(few_shots.len() + history.len() + 1);
        messages.push(Message::system(system_prompt));
        messages.extend_from_slice(few_shots);
        messages.push(Message::user(current_user_content));

        let insert_at = few_shots.len() + 1;
        let mut total = self.counter.count_messages(&messages);

        let earlier = &history[..history.len().saturating_sub(1)];
        let mut included = 0;
        for turn in earlier.iter().rev() {
            let cost = self.counter.count_message(turn);
            if total + cost > token_limit {
                debug!(
                    token_limit,
                    kept = included,
                    dropped = earlier.len() - included,
                    "History truncated to fit token budget"
                );
                break;
            }
            messages.insert(insert_at, Message::new(turn.role, turn.content.clone()));
            total += cost;
            included += 1;
        }

        messages
    }
}

/// Whether a message list is shaped as `build` produces it.
pub fn is_well_formed(messages: &[Message]) -> bool {
    matches!(messages.first(), Some(m) if m.role == Role::System)
        && matches!(messages.last(), Some(m) if m.role == Role::User)
}
