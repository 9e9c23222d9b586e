//! Stream classification.
//!
//! The answer model appends follow-up questions as `<<question>>` after
//! the visible answer. [`StreamClassifier`] is a two-state machine over
//! streamed deltas:
//!
//! - `StreamingContent`: deltas are forwarded as [`ChatStreamEvent::ContentDelta`]
//!   until the `<<` marker is seen.
//! - `StreamingFollowups`: everything from the marker on is buffered and
//!   parsed when the stream ends.
//!
//! A trailing `<` is held back until the next delta shows whether it opens
//! a marker, so a `<<` split across two deltas is still caught.

use groundchat_core::provider::Usage;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

pub const FOLLOWUP_MARKER: &str = "<<";

static FOLLOWUP_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"<<(.*?)>>").ok());

/// Events yielded to the caller in streaming mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatStreamEvent {
    /// Retrieval provenance, sent before any content.
    Context { data_points: Vec<String>, thoughts: String },

    /// Visible answer text.
    ContentDelta { content: String },

    /// Follow-up questions parsed from the tail of the answer.
    FollowupMetadata { questions: Vec<String> },

    /// The stream is complete.
    Done {
        followup_questions: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
    },
}

impl ChatStreamEvent {
    /// SSE event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Context { .. } => "context",
            Self::ContentDelta { .. } => "content_delta",
            Self::FollowupMetadata { .. } => "followup_metadata",
            Self::Done { .. } => "done",
        }
    }
}

/// Extract every `<<...>>` question, trimmed, skipping empty ones.
pub fn extract_followups(text: &str) -> Vec<String> {
    FOLLOWUP_PATTERN
        .iter()
        .flat_map(|re| re.captures_iter(text))
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|q| !q.is_empty())
        .collect()
}

/// Split a complete answer into visible content and follow-up questions.
///
/// Visible content is everything before the first `<<`.
pub fn split_followups(content: &str) -> (String, Vec<String>) {
    match content.find(FOLLOWUP_MARKER) {
        Some(i) => (content[..i].to_string(), extract_followups(&content[i..])),
        None => (content.to_string(), Vec::new()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifierState {
    StreamingContent,
    StreamingFollowups,
}

#[derive(Debug)]
pub struct StreamClassifier {
    state: ClassifierState,
    /// A trailing `<` not yet known to be content.
    held: Option<char>,
    followup_buffer: String,
}

impl Default for StreamClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamClassifier {
    pub fn new() -> Self {
        Self {
            state: ClassifierState::StreamingContent,
            held: None,
            followup_buffer: String::new(),
        }
    }

    pub fn state(&self) -> ClassifierState {
        self.state
    }

    /// Feed one delta.
    pub fn push(&mut self, delta: &str) -> Vec<ChatStreamEvent> {
        if delta.is_empty() {
            return Vec::new();
        }

        match self.state {
            ClassifierState::StreamingFollowups => {
                self.followup_buffer.push_str(delta);
                Vec::new()
            }
            ClassifierState::StreamingContent => {
                let mut text = String::with_capacity(delta.len() + 1);
                text.extend(self.held.take());
                text.push_str(delta);

                if let Some(i) = text.find(FOLLOWUP_MARKER) {
                    self.state = ClassifierState::StreamingFollowups;
                    self.followup_buffer.push_str(&text[i..]);
                    return content_event(&text[..i]);
                }

                if text.ends_with('<') {
                    text.pop();
                    self.held = Some('<');
                }
                content_event(&text)
            }
        }
    }

    /// End of stream: flush held content, then report follow-ups and finish.
    pub fn finish(&mut self, usage: Option<Usage>) -> Vec<ChatStreamEvent> {
        let mut events = Vec::new();

        if let Some(c) = self.held.take() {
            events.push(ChatStreamEvent::ContentDelta { content: c.to_string() });
        }

        let questions = extract_followups(&self.followup_buffer);
        if self.state == ClassifierState::StreamingFollowups {
            events.push(ChatStreamEvent::FollowupMetadata { questions: questions.clone() });
        }
        events.push(ChatStreamEvent::Done { followup_questions: questions, usage });
        events
    }
}

fn content_event(text: &str) -> Vec<ChatStreamEvent> {
    if text.is_empty() {
        Vec::new()
    } else {
        vec![ChatStreamEvent::ContentDelta { content: text.to_string() }]
    }
}
