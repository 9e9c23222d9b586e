//! # groundchat core
//!
//! Domain types, collaborator traits, and error definitions for the groundchat
//! retrieve-then-read pipeline. This crate has **no service dependencies**: it
//! defines the model that the provider, search, and approach crates implement
//! against.
//!
//! ## Collaborators
//!
//! The answering pipeline needs exactly three external capabilities, each
//! defined as a trait here:
//! - [`Provider::complete`] / [`Provider::stream`]: chat completions
//! - [`Provider::embed`]: text embeddings
//! - [`SearchClient::search`]: ranked passage retrieval from an index
//!
//! Implementations live in `groundchat-providers` and `groundchat-search`,
//! which keeps the pipeline testable with scripted stand-ins.

pub mod error;
pub mod message;
pub mod provider;
pub mod search;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, Result, SearchError};
pub use message::{Message, MessageToolCall, Role};
pub use provider::{
    ChunkReceiver, EmbeddingRequest, EmbeddingResponse, Provider, ProviderRequest,
    ProviderResponse, StreamChunk, ToolDefinition, Usage,
};
pub use search::{Passage, Ranking, SearchClient, SearchRequest, VectorQuery};
