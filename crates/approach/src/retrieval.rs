//! Retrieval: builds the search request and runs it.
//!
//! Mode selection follows [`RetrievalMode`]: the text clause carries the
//! query when text search is on, a k=50 vector clause carries its
//! embedding when vector search is on. A semantically ranked query is
//! text-only: it carries no vector clause. Results come back in the
//! index's ranked order and are not re-ranked here.

use groundchat_core::provider::{EmbeddingRequest, Provider};
use groundchat_core::search::{Passage, Ranking, SearchClient, SearchRequest, VectorQuery};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{ApproachError, Result};
use crate::overrides::{AuthClaims, Overrides, SecurityScope, escape_literal};

/// Nearest neighbours requested per vector clause.
pub const VECTOR_K: usize = 50;

/// Semantic ranker settings taken from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SemanticSettings {
    pub query_language: String,
    pub query_speller: String,
    pub configuration: String,
}

impl Default for SemanticSettings {
    fn default() -> Self {
        Self {
            query_language: "en-us".into(),
            query_speller: "lexicon".into(),
            configuration: "default".into(),
        }
    }
}

/// Compose the OData filter: category clause AND security clause.
pub fn build_filter(overrides: &Overrides, claims: &AuthClaims) -> Result<Option<String>> {
    let mut clauses = Vec::new();

    if let Some(category) = overrides.category() {
        clauses.push(format!("category eq '{}'", escape_literal(category)));
    }

    if let Some(scope) = SecurityScope::resolve(overrides, claims)? {
        match scope.clause() {
            Some(clause) if matches!(scope, SecurityScope::Groups(_)) && !clauses.is_empty() => {
                clauses.push(format!("({clause})"));
            }
            Some(clause) => clauses.push(clause),
            None => debug!("Groups security filter requested but the caller has no groups"),
        }
    }

    Ok(if clauses.is_empty() {
        None
    } else {
        Some(clauses.join(" and "))
    })
}

/// Semantic ranking applies only when the query has a text clause.
fn uses_semantic_ranker(overrides: &Overrides) -> bool {
    overrides.semantic_ranker && overrides.retrieval_mode.has_text()
}

pub struct Retriever {
    provider: Arc<dyn Provider>,
    search: Arc<dyn SearchClient>,
    embedding_model: String,
    embedding_field: String,
    semantic: SemanticSettings,
}

impl Retriever {
    pub fn new(
        provider: Arc<dyn Provider>,
        search: Arc<dyn SearchClient>,
        embedding_model: impl Into<String>,
        embedding_field: impl Into<String>,
        semantic: SemanticSettings,
    ) -> Self {
        Self {
            provider,
            search,
            embedding_model: embedding_model.into(),
            embedding_field: embedding_field.into(),
            semantic,
        }
    }

    /// Build the request for `query_text`, given the vector clauses already computed.
    pub fn build_request(
        &self,
        query_text: &str,
        vectors: Vec<VectorQuery>,
        overrides: &Overrides,
        filter: Option<String>,
    ) -> SearchRequest {
        let has_text = overrides.retrieval_mode.has_text();
        let semantic = uses_semantic_ranker(overrides);

        let ranking = if semantic {
            Ranking::Semantic {
                query_language: self.semantic.query_language.clone(),
                query_speller: self.semantic.query_speller.clone(),
                configuration: self.semantic.configuration.clone(),
                captions: overrides.semantic_captions,
            }
        } else {
            Ranking::Simple
        };

        SearchRequest {
            text: has_text.then(|| query_text.to_string()),
            filter,
            vectors: if semantic { Vec::new() } else { vectors },
            top: overrides.top,
            ranking,
        }
    }

    async fn embed(&self, query_text: &str) -> Result<Vec<f32>> {
        let response = self
            .provider
            .embed(EmbeddingRequest {
                model: self.embedding_model.clone(),
                inputs: vec![query_text.to_string()],
            })
            .await?;

        response.embeddings.into_iter().next().ok_or_else(|| {
            ApproachError::Core(groundchat_core::Error::Internal(
                "embedding response contained no vectors".into(),
            ))
        })
    }

    /// Retrieve passages for `query_text`.
    pub async fn search(
        &self,
        query_text: &str,
        overrides: &Overrides,
        claims: &AuthClaims,
    ) -> Result<Vec<Passage>> {
        let filter = build_filter(overrides, claims)?;
        debug!(filter = ?filter, "Retrieval: filter composed");

        if overrides.minimum_search_score.is_some() || overrides.minimum_reranker_score.is_some() {
            debug!(
                minimum_search_score = ?overrides.minimum_search_score,
                minimum_reranker_score = ?overrides.minimum_reranker_score,
                "Retrieval: score thresholds are advisory and not applied"
            );
        }

        let mut vectors = Vec::new();
        if overrides.retrieval_mode.has_vectors() && !uses_semantic_ranker(overrides) {
            vectors.push(VectorQuery {
                vector: self.embed(query_text).await?,
                k: VECTOR_K,
                field: self.embedding_field.clone(),
            });
        }

        let request = self.build_request(query_text, vectors, overrides, filter);
        let passages = self.search.search(request).await?;

        info!(
            backend = self.search.name(),
            mode = ?overrides.retrieval_mode,
            passages = passages.len(),
            "Retrieval: search complete"
        );
        Ok(passages)
    }
}
