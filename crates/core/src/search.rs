//! Search trait: ranked passage retrieval from a document index.
//!
//! The index supports:
//! - Full-text search (with optional semantic re-ranking and captions)
//! - Vector search (nearest neighbours on an embedding field)
//! - Hybrid search (both in one request)
//!
//! Results come back in the service's ranked order. Callers never re-rank.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::SearchError;

/// A vector similarity clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorQuery {
    /// Query embedding
    pub vector: Vec<f32>,

    /// Nearest neighbours to consider
    pub k: usize,

    /// Index field holding document embeddings
    pub field: String,
}

/// How the service ranks text matches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Ranking {
    /// Plain relevance ranking; vector clauses are honoured.
    #[default]
    Simple,
    /// Semantic re-ranking over the text results.
    Semantic {
        query_language: String,
        query_speller: String,
        configuration: String,
        /// Ask the service for extractive captions
        captions: bool,
    },
}

/// A query against the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Search text. `None` when text search is disabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// OData filter expression
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,

    /// Vector clauses. Empty when vector search is disabled.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vectors: Vec<VectorQuery>,

    /// Maximum number of passages
    #[serde(default = "default_top")]
    pub top: usize,

    /// Ranking mode
    #[serde(default)]
    pub ranking: Ranking,
}

fn default_top() -> usize {
    3
}

/// A retrieved passage. Read-only once returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    /// Citation key, typically the source page (e.g. "benefits.pdf#page=2")
    pub source_id: String,

    /// Full passage text
    pub content: String,

    /// Semantic captions, when requested and available
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captions: Option<Vec<String>>,

    /// Relevance score reported by the service
    #[serde(default)]
    pub score: f32,

    /// Semantic re-ranker score, when semantic ranking ran
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reranker_score: Option<f32>,
}

/// The core SearchClient trait.
///
/// Implementations: Azure AI Search (REST), in-memory (testing and offline use).
#[async_trait]
pub trait SearchClient: Send + Sync {
    /// The backend name (e.g., "azure", "in_memory").
    fn name(&self) -> &str;

    /// Run a query and return passages in ranked order.
    async fn search(&self, request: SearchRequest) -> std::result::Result<Vec<Passage>, SearchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_request_defaults() {
        let req: SearchRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(req.top, 3);
        assert!(req.text.is_none());
        assert!(req.vectors.is_empty());
        assert_eq!(req.ranking, Ranking::Simple);
    }

    #[test]
    fn semantic_ranking_serialization() {
        let ranking = Ranking::Semantic {
            query_language: "en-us".into(),
            query_speller: "lexicon".into(),
            configuration: "default".into(),
            captions: true,
        };
        let json = serde_json::to_string(&ranking).unwrap();
        assert!(json.contains(r#""type":"semantic""#));
        assert!(json.contains("lexicon"));
    }

    #[test]
    fn passage_serialization_skips_missing_captions() {
        let passage = Passage {
            source_id: "doc1.pdf".into(),
            content: "text".into(),
            captions: None,
            score: 0.5,
            reranker_score: None,
        };
        let json = serde_json::to_string(&passage).unwrap();
        assert!(!json.contains("captions"));
        assert!(json.contains("doc1.pdf"));
    }
}
