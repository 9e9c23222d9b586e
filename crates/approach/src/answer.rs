//! Grounded answer generation.

use groundchat_core::message::Message;
use groundchat_core::provider::{ChunkReceiver, Provider, ProviderRequest, ProviderResponse};
use std::sync::Arc;
use tracing::info;

use crate::error::Result;

/// The answer call's result: a whole message, or a live stream of deltas.
pub enum Completion {
    Full(ProviderResponse),
    Stream(ChunkReceiver),
}

impl std::fmt::Debug for Completion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Full(response) => f.debug_tuple("Full").field(response).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

pub struct AnswerGenerator {
    provider: Arc<dyn Provider>,
    model: String,
}

impl AnswerGenerator {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    /// Issue the answer call. `stream` selects the [`Completion`] variant.
    pub async fn generate(
        &self,
        messages: Vec<Message>,
        temperature: f32,
        max_tokens: u32,
        stream: bool,
    ) -> Result<Completion> {
        let request = ProviderRequest {
            model: self.model.clone(),
            messages,
            temperature,
            max_tokens: Some(max_tokens),
            tools: vec![],
            stream,
            stop: vec![],
        };

        info!(
            model = %self.model,
            messages = request.messages.len(),
            stream,
            "Answer: calling model"
        );

        if stream {
            Ok(Completion::Stream(self.provider.stream(request).await?))
        } else {
            Ok(Completion::Full(self.provider.complete(request).await?))
        }
    }
}
