//! The read-retrieve-read orchestrator.
//!
//! Wires the stages together for one request. Blocking callers get a
//! [`ChatResponse`]; streaming callers get a pull-based stream of
//! [`ChatStreamEvent`]s that starts with the retrieval context. Dropping the
//! stream drops the provider's receiver, which ends the upstream call.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;

use futures::stream::{self, Stream, StreamExt};
use groundchat_config::AppConfig;
use groundchat_core::error::ProviderError;
use groundchat_core::message::Message;
use groundchat_core::provider::{Provider, StreamChunk, Usage};
use groundchat_core::search::SearchClient;
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

use crate::answer::{AnswerGenerator, Completion};
use crate::budget::{HistoryBudgeter, TokenBudget};
use crate::context::assemble;
use crate::error::{ApproachError, Result};
use crate::overrides::{AuthClaims, Overrides, SecurityScope};
use crate::prompts::{answer_system_message, with_sources};
use crate::query::QueryRewriter;
use crate::retrieval::{Retriever, SemanticSettings};
use crate::stream::{ChatStreamEvent, StreamClassifier, split_followups};
use crate::token::{HeuristicCounter, TokenCounter, counter_for};

/// Stand-in question when the conversation is empty.
pub const EMPTY_HISTORY_PLACEHOLDER: &str = "Hello";

/// Everything the pipeline needs besides its collaborators.
#[derive(Debug, Clone, PartialEq)]
pub struct ApproachSettings {
    /// Chat model and total context window
    pub budget: TokenBudget,
    pub embedding_model: String,
    /// Tokens reserved for the answer
    pub response_token_limit: u32,
    pub default_temperature: f32,
    pub embedding_field: String,
    pub semantic: SemanticSettings,
}

impl Default for ApproachSettings {
    fn default() -> Self {
        Self {
            budget: TokenBudget::new(4096, "gpt-4o-mini"),
            embedding_model: "text-embedding-3-small".into(),
            response_token_limit: 1024,
            default_temperature: 0.3,
            embedding_field: "embedding".into(),
            semantic: SemanticSettings::default(),
        }
    }
}

impl ApproachSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            budget: TokenBudget::new(config.token_limit, &config.chat_model),
            embedding_model: config.embedding_model.clone(),
            response_token_limit: config.response_token_limit,
            default_temperature: config.default_temperature,
            embedding_field: config.search.embedding_field.clone(),
            semantic: SemanticSettings {
                query_language: config.search.query_language.clone(),
                query_speller: config.search.query_speller.clone(),
                configuration: config.search.semantic_configuration.clone(),
            },
        }
    }

    /// Prompt limit for the answer call, leaving room for the response.
    pub fn answer_prompt_limit(&self) -> usize {
        self.budget.remaining_after(self.response_token_limit as usize)
    }
}

/// Citation and diagnostic payload returned with an answer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtraInfo {
    pub data_points: Vec<String>,
    pub thoughts: String,
    pub followup_questions: Vec<String>,
}

/// A blocking-mode answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub message: Message,
    #[serde(flatten)]
    pub extra: ExtraInfo,
}

/// Events of a streamed answer.
pub type ChatEventStream = Pin<Box<dyn Stream<Item = Result<ChatStreamEvent>> + Send>>;

pub struct ChatReadRetrieveRead {
    budgeter: HistoryBudgeter,
    rewriter: QueryRewriter,
    retriever: Retriever,
    generator: AnswerGenerator,
    settings: ApproachSettings,
}

impl ChatReadRetrieveRead {
    /// Build with the heuristic token counter.
    pub fn new(provider: Arc<dyn Provider>, search: Arc<dyn SearchClient>, settings: ApproachSettings) -> Self {
        Self::with_counter(provider, search, settings, Arc::new(HeuristicCounter))
    }

    pub fn with_counter(
        provider: Arc<dyn Provider>,
        search: Arc<dyn SearchClient>,
        settings: ApproachSettings,
        counter: Arc<dyn TokenCounter>,
    ) -> Self {
        let budgeter = HistoryBudgeter::new(counter);
        let model = settings.budget.model.clone();
        Self {
            rewriter: QueryRewriter::new(
                provider.clone(),
                budgeter.clone(),
                &model,
                settings.budget.token_limit,
            ),
            retriever: Retriever::new(
                provider.clone(),
                search,
                &settings.embedding_model,
                &settings.embedding_field,
                settings.semantic.clone(),
            ),
            generator: AnswerGenerator::new(provider, &model),
            budgeter,
            settings,
        }
    }

    /// Build from application config, honouring its `tokenizer` choice.
    pub fn from_config(provider: Arc<dyn Provider>, search: Arc<dyn SearchClient>, config: &AppConfig) -> Self {
        let counter = counter_for(&config.tokenizer, &config.chat_model);
        Self::with_counter(provider, search, ApproachSettings::from_config(config), counter)
    }

    pub fn settings(&self) -> &ApproachSettings {
        &self.settings
    }

    /// Answer the last turn of `history` in one response.
    pub async fn run(
        &self,
        history: &[Message],
        overrides: &Overrides,
        claims: &AuthClaims,
    ) -> Result<ChatResponse> {
        let (mut extra, completion) = self.prepare(history, overrides, claims, false).await?;

        let response = match completion {
            Completion::Full(response) => response,
            Completion::Stream(_) => {
                return Err(ApproachError::Core(groundchat_core::Error::Internal(
                    "blocking answer call returned a stream".into(),
                )));
            }
        };

        let (content, followup_questions) = split_followups(&response.message.content);
        extra.followup_questions = followup_questions;
        info!(
            followups = extra.followup_questions.len(),
            chars = content.len(),
            "Answer: complete"
        );

        Ok(ChatResponse {
            message: Message::assistant(content),
            extra,
        })
    }

    /// Answer the last turn of `history` as a stream of events.
    ///
    /// Errors before the answer call starts are returned directly; errors
    /// from the answer stream are yielded as the final item.
    pub async fn run_stream(
        &self,
        history: &[Message],
        overrides: &Overrides,
        claims: &AuthClaims,
    ) -> Result<ChatEventStream> {
        let (extra, completion) = self.prepare(history, overrides, claims, true).await?;

        let context = ChatStreamEvent::Context {
            data_points: extra.data_points,
            thoughts: extra.thoughts,
        };

        let chunks = match completion {
            Completion::Stream(rx) => ReceiverStream::new(rx).boxed(),
            Completion::Full(response) => stream::iter([Ok(StreamChunk {
                content: Some(response.message.content),
                tool_calls: vec![],
                done: true,
                usage: response.usage,
            })])
            .boxed(),
        };

        let events = stream::unfold(ClassifiedStream::new(chunks), |mut state| async move {
            state.next_event().await.map(|event| (event, state))
        });

        Ok(stream::once(async move { Ok(context) }).chain(events).boxed())
    }

    /// Everything up to the answer call.
    async fn prepare(
        &self,
        history: &[Message],
        overrides: &Overrides,
        claims: &AuthClaims,
        stream: bool,
    ) -> Result<(ExtraInfo, Completion)> {
        let question = history
            .last()
            .map(|m| m.content.as_str())
            .unwrap_or(EMPTY_HISTORY_PLACEHOLDER);

        info!(turns = history.len(), stream, "Pipeline: starting");

        // Reject conflicting security flags before any model call.
        SecurityScope::resolve(overrides, claims)?;

        let query = self.rewriter.rewrite(history, question).await?;
        let passages = self.retriever.search(&query, overrides, claims).await?;

        let use_captions = overrides.semantic_captions && overrides.retrieval_mode.has_text();
        let context = assemble(&passages, use_captions);

        let system = answer_system_message(
            overrides.prompt_template.as_deref(),
            overrides.suggest_followup_questions,
        );
        let messages = self.budgeter.build(
            &system,
            &[],
            history,
            &with_sources(question, &context.block),
            self.settings.answer_prompt_limit(),
        );

        let extra = ExtraInfo {
            thoughts: thoughts(&query, &messages),
            data_points: context.data_points,
            followup_questions: Vec::new(),
        };

        let temperature = overrides.temperature.unwrap_or(self.settings.default_temperature);
        let completion = self
            .generator
            .generate(messages, temperature, self.settings.response_token_limit, stream)
            .await?;

        Ok((extra, completion))
    }
}

/// `Searched for:<br>{query}<br><br>Conversations:<br>{messages}` with
/// newlines rendered as `<br>`.
fn thoughts(query: &str, messages: &[Message]) -> String {
    let conversation = messages
        .iter()
        .map(|m| m.to_string())
        .collect::<Vec<_>>()
        .join("\n\n");
    format!(
        "Searched for:<br>{query}<br><br>Conversations:<br>{}",
        conversation.replace('\n', "<br>")
    )
}

type ChunkStream = Pin<Box<dyn Stream<Item = std::result::Result<StreamChunk, ProviderError>> + Send>>;

/// Drives a [`StreamClassifier`] over provider chunks.
struct ClassifiedStream {
    chunks: ChunkStream,
    classifier: StreamClassifier,
    pending: VecDeque<Result<ChatStreamEvent>>,
    usage: Option<Usage>,
    finished: bool,
}

impl ClassifiedStream {
    fn new(chunks: ChunkStream) -> Self {
        Self {
            chunks,
            classifier: StreamClassifier::new(),
            pending: VecDeque::new(),
            usage: None,
            finished: false,
        }
    }

    async fn next_event(&mut self) -> Option<Result<ChatStreamEvent>> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            if self.finished {
                return None;
            }

            match self.chunks.next().await {
                Some(Ok(chunk)) => {
                    if chunk.usage.is_some() {
                        self.usage = chunk.usage;
                    }
                    if let Some(content) = &chunk.content {
                        self.pending.extend(self.classifier.push(content).into_iter().map(Ok));
                    }
                    if chunk.done {
                        self.finish();
                    }
                }
                Some(Err(e)) => {
                    warn!(error = %e, "Answer stream failed");
                    self.finished = true;
                    self.pending.push_back(Err(e.into()));
                }
                None => self.finish(),
            }
        }
    }

    fn finish(&mut self) {
        self.pending
            .extend(self.classifier.finish(self.usage).into_iter().map(Ok));
        self.finished = true;
    }
}
