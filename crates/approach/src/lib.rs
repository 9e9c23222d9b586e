//! The chat read-retrieve-read pipeline, the heart of groundchat.
//!
//! Each request runs one strictly sequential pass:
//!
//! 1. **Budget** the conversation history to fit the model's context window
//! 2. **Rewrite** the latest question into a search query (one model call)
//! 3. **Retrieve** passages from the index (text, vector or hybrid)
//! 4. **Assemble** the passages into a context block with citation keys
//! 5. **Answer** with a grounded model call, blocking or streamed
//! 6. **Classify** streamed output into visible content and follow-up questions
//!
//! Collaborators (`Provider`, `SearchClient`) are injected at construction;
//! nothing here holds global state.

pub mod answer;
pub mod approach;
pub mod budget;
pub mod context;
pub mod error;
pub mod overrides;
pub mod prompts;
pub mod query;
pub mod retrieval;
pub mod stream;
#[cfg(any(test, feature = "test-util"))]
pub mod test_helpers;
pub mod token;

pub use answer::{AnswerGenerator, Completion};
pub use approach::{ApproachSettings, ChatEventStream, ChatReadRetrieveRead, ChatResponse, ExtraInfo};
pub use budget::{HistoryBudgeter, TokenBudget};
pub use context::{AssembledContext, assemble};
pub use error::ApproachError;
pub use overrides::{AuthClaims, Overrides, RetrievalMode, SecurityScope};
pub use query::QueryRewriter;
pub use retrieval::Retriever;
pub use stream::{ChatStreamEvent, ClassifierState, StreamClassifier, split_followups};
pub use token::{HeuristicCounter, TiktokenCounter, TokenCounter};
