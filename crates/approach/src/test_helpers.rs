//! Scripted collaborators for pipeline tests.
//!
//! [`ScriptedProvider`] replays completions and streams in order and records
//! every request; [`RecordingSearch`] returns fixed passages and records
//! every query.

use async_trait::async_trait;
use groundchat_core::error::{ProviderError, SearchError};
use groundchat_core::message::{Message, MessageToolCall};
use groundchat_core::provider::*;
use groundchat_core::search::{Passage, SearchClient, SearchRequest};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Usage reported by scripted responses.
pub const SCRIPTED_USAGE: Usage = Usage {
    prompt_tokens: 10,
    completion_tokens: 5,
    total_tokens: 15,
};

/// A provider that replays scripted responses.
///
/// `complete` pops the next response; `stream` pops the next chunk list.
/// An exhausted script is an `ApiError`, not a panic, so failure paths
/// can be tested too.
pub struct ScriptedProvider {
    responses: Mutex<VecDeque<ProviderResponse>>,
    streams: Mutex<VecDeque<Vec<String>>>,
    embedding: Vec<f32>,
    requests: Mutex<Vec<ProviderRequest>>,
    embed_requests: Mutex<Vec<EmbeddingRequest>>,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            streams: Mutex::new(VecDeque::new()),
            embedding: vec![0.0, 0.0, 1.0],
            requests: Mutex::new(Vec::new()),
            embed_requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a streamed answer delivered as these deltas.
    pub fn with_stream<S: Into<String>>(self, deltas: Vec<S>) -> Self {
        lock(&self.streams).push_back(deltas.into_iter().map(Into::into).collect());
        self
    }

    /// The vector returned for every embedding input.
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = embedding;
        self
    }

    /// Chat requests seen so far (completions and streams).
    pub fn requests(&self) -> Vec<ProviderRequest> {
        lock(&self.requests).clone()
    }

    pub fn embed_requests(&self) -> Vec<EmbeddingRequest> {
        lock(&self.embed_requests).clone()
    }

    fn exhausted(what: &str) -> ProviderError {
        ProviderError::ApiError {
            status_code: 500,
            message: format!("scripted provider has no {what} left"),
        }
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        lock(&self.requests).push(request);
        lock(&self.responses)
            .pop_front()
            .ok_or_else(|| Self::exhausted("responses"))
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        lock(&self.requests).push(request);
        let deltas = lock(&self.streams)
            .pop_front()
            .ok_or_else(|| Self::exhausted("streams"))?;

        let (tx, rx) = tokio::sync::mpsc::channel(deltas.len() + 1);
        for delta in deltas {
            let _ = tx.send(Ok(StreamChunk::text(delta))).await;
        }
        let _ = tx.send(Ok(StreamChunk::finished(Some(SCRIPTED_USAGE)))).await;
        Ok(rx)
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, ProviderError> {
        let embeddings = vec![self.embedding.clone(); request.inputs.len()];
        let model = request.model.clone();
        lock(&self.embed_requests).push(request);
        Ok(EmbeddingResponse {
            embeddings,
            model,
            usage: None,
        })
    }
}

/// A plain text completion.
pub fn text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(SCRIPTED_USAGE),
        model: "mock-model".into(),
    }
}

/// A completion that calls `name` with raw JSON `arguments`.
pub fn tool_call_response(name: &str, arguments: &str) -> ProviderResponse {
    let mut message = Message::assistant("");
    message.tool_calls = vec![MessageToolCall {
        id: format!("call_{name}"),
        name: name.to_string(),
        arguments: arguments.to_string(),
    }];
    ProviderResponse {
        message,
        usage: Some(SCRIPTED_USAGE),
        model: "mock-model".into(),
    }
}

/// A passage with content only.
pub fn passage(source_id: &str, content: &str) -> Passage {
    Passage {
        source_id: source_id.to_string(),
        content: content.to_string(),
        captions: None,
        score: 1.0,
        reranker_score: None,
    }
}

/// A search client that returns fixed passages and records queries.
pub struct RecordingSearch {
    passages: Vec<Passage>,
    fail: bool,
    requests: Mutex<Vec<SearchRequest>>,
}

impl RecordingSearch {
    pub fn new(passages: Vec<Passage>) -> Self {
        Self {
            passages,
            fail: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A client whose every search fails.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(vec![])
        }
    }

    pub fn requests(&self) -> Vec<SearchRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl SearchClient for RecordingSearch {
    fn name(&self) -> &str {
        "recording"
    }

    async fn search(&self, request: SearchRequest) -> Result<Vec<Passage>, SearchError> {
        let top = request.top;
        lock(&self.requests).push(request);
        if self.fail {
            return Err(SearchError::Request("connection refused".into()));
        }
        Ok(self.passages.iter().take(top).cloned().collect())
    }
}
