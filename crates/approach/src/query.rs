//! Query rewriting.
//!
//! One model call turns the conversation into a keyword search query. The
//! model either calls `search_sources` with a query or answers in text;
//! `"0"` in either place means no search query could be formed, and the
//! latest user utterance is searched as-is.

use groundchat_core::message::Message;
use groundchat_core::provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition};
use std::sync::Arc;
use tracing::{debug, info};

use crate::budget::HistoryBudgeter;
use crate::error::Result;
use crate::prompts::{QUERY_PROMPT, QUERY_REQUEST_PREFIX, query_few_shots};

/// The model's reply meaning "no search query".
pub const NO_QUERY: &str = "0";

pub const SEARCH_TOOL_NAME: &str = "search_sources";

/// Output cap for the rewrite call.
const REWRITE_MAX_TOKENS: u32 = 100;

/// The function the model may call with its search query.
pub fn search_sources_tool() -> ToolDefinition {
    ToolDefinition {
        name: SEARCH_TOOL_NAME.into(),
        description: "Retrieve sources from the search index".into(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "search_query": {
                    "type": "string",
                    "description": "Query string to retrieve documents from store search eg: 'health care plan'"
                }
            },
            "required": ["search_query"]
        }),
    }
}

/// Read the search query out of a rewrite response.
///
/// `None` when the model declined: `"0"`, empty text, a `search_sources`
/// call without a usable `search_query`, or arguments that are not JSON.
pub fn resolve_search_query(response: &ProviderResponse) -> Option<String> {
    let message = &response.message;

    if let Some(call) = message.tool_calls.first() {
        if call.name != SEARCH_TOOL_NAME {
            return None;
        }
        let args: serde_json::Value = match serde_json::from_str(&call.arguments) {
            Ok(args) => args,
            Err(e) => {
                debug!(error = %e, "Query rewrite: unparseable tool arguments");
                return None;
            }
        };
        return args
            .get("search_query")
            .and_then(|q| q.as_str())
            .filter(|q| !q.trim().is_empty() && *q != NO_QUERY)
            .map(str::to_string);
    }

    let text = message.content.trim();
    if text.is_empty() || text == NO_QUERY {
        None
    } else {
        Some(text.to_string())
    }
}

/// Rewrites the latest question into a search query.
pub struct QueryRewriter {
    provider: Arc<dyn Provider>,
    budgeter: HistoryBudgeter,
    model: String,
    token_limit: usize,
}

impl QueryRewriter {
    pub fn new(
        provider: Arc<dyn Provider>,
        budgeter: HistoryBudgeter,
        model: impl Into<String>,
        token_limit: usize,
    ) -> Self {
        Self {
            provider,
            budgeter,
            model: model.into(),
            token_limit,
        }
    }

    /// The messages sent for a rewrite.
    pub fn build_messages(&self, history: &[Message], current_user_content: &str) -> Vec<Message> {
        let request = format!("{QUERY_REQUEST_PREFIX}{current_user_content}");
        let limit = self.token_limit.saturating_sub(request.chars().count());
        self.budgeter
            .build(QUERY_PROMPT, &query_few_shots(), history, &request, limit)
    }

    /// Produce the search query. Never empty and never `"0"`: falls back to
    /// `current_user_content` when the model offers no query.
    pub async fn rewrite(&self, history: &[Message], current_user_content: &str) -> Result<String> {
        let request = ProviderRequest {
            model: self.model.clone(),
            messages: self.build_messages(history, current_user_content),
            temperature: 0.0,
            max_tokens: Some(REWRITE_MAX_TOKENS),
            tools: vec![search_sources_tool()],
            stream: false,
            stop: vec![],
        };

        let response = self.provider.complete(request).await?;

        Ok(match resolve_search_query(&response) {
            Some(query) => {
                info!(query = %query, "Query rewrite: model produced search query");
                query
            }
            None => {
                info!("Query rewrite: no query from model, searching the question as asked");
                current_user_content.to_string()
            }
        })
    }
}
