//! In-memory index, useful for testing and offline runs.
//!
//! Mirrors the behaviour of the hosted index closely enough for the
//! pipeline: keyword ranking for text clauses, cosine ranking for vector
//! clauses, RRF fusion when both are present, OData filters, top-k, and
//! extractive captions under semantic ranking.

use async_trait::async_trait;
use groundchat_core::error::SearchError;
use groundchat_core::search::{Passage, Ranking, SearchClient, SearchRequest};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::filter::{FilterExpr, Filterable};
use crate::ranking::{self, Hit, RRF_K};

/// A document chunk held by the index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexedDocument {
    /// Unique key. Assigned on insert when empty.
    #[serde(default)]
    pub id: String,

    /// Citation key returned as the passage source id
    pub sourcepage: String,

    pub content: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    /// Owner object id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oid: Option<String>,

    /// Groups allowed to read this document
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl IndexedDocument {
    pub fn new(sourcepage: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            sourcepage: sourcepage.into(),
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_oid(mut self, oid: impl Into<String>) -> Self {
        self.oid = Some(oid.into());
        self
    }

    pub fn with_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups = groups.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }
}

impl Filterable for IndexedDocument {
    fn field_values(&self, field: &str) -> Vec<&str> {
        match field {
            "id" => vec![self.id.as_str()],
            "sourcepage" => vec![self.sourcepage.as_str()],
            "category" => self.category.as_deref().into_iter().collect(),
            "oid" => self.oid.as_deref().into_iter().collect(),
            "groups" => self.groups.iter().map(String::as_str).collect(),
            _ => vec![],
        }
    }

    /// Searchable fields are `content` and `groups`.
    fn matches_term(&self, term: &str) -> bool {
        let term = term.to_lowercase();
        self.groups.iter().any(|g| g.to_lowercase() == term)
            || ranking::terms(&self.content).contains(&term)
    }
}

/// An index that keeps its documents in a Vec.
pub struct InMemoryIndex {
    documents: Arc<RwLock<Vec<IndexedDocument>>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self {
            documents: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Add a document, returning its id.
    pub async fn add(&self, mut document: IndexedDocument) -> String {
        if document.id.is_empty() {
            document.id = Uuid::new_v4().to_string();
        }
        let id = document.id.clone();
        self.documents.write().await.push(document);
        id
    }

    pub async fn add_all(&self, documents: impl IntoIterator<Item = IndexedDocument>) {
        for document in documents {
            self.add(document).await;
        }
    }

    pub async fn count(&self) -> usize {
        self.documents.read().await.len()
    }
}

impl Default for InMemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SearchClient for InMemoryIndex {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn search(&self, request: SearchRequest) -> Result<Vec<Passage>, SearchError> {
        let filter = request.filter.as_deref().map(FilterExpr::parse).transpose()?;
        let documents = self.documents.read().await;

        let candidates: Vec<usize> = documents
            .iter()
            .enumerate()
            .filter(|(_, doc)| filter.as_ref().is_none_or(|f| f.matches(*doc)))
            .map(|(i, _)| i)
            .collect();

        let query_terms = request.text.as_deref().map(ranking::terms);

        let mut lists: Vec<Vec<Hit>> = Vec::new();

        // "*" and an empty text clause match everything, like the hosted service.
        if let Some(terms) = &query_terms {
            let mut hits: Vec<Hit> = if terms.is_empty() {
                candidates.iter().map(|&doc| Hit { doc, score: 1.0 }).collect()
            } else {
                candidates
                    .iter()
                    .map(|&doc| Hit { doc, score: ranking::keyword_score(terms, &documents[doc].content) })
                    .filter(|hit| hit.score > 0.0)
                    .collect()
            };
            ranking::sort_desc(&mut hits);
            lists.push(hits);
        }

        for vector in &request.vectors {
            let mut hits: Vec<Hit> = candidates
                .iter()
                .filter_map(|&doc| {
                    documents[doc].embedding.as_ref().map(|embedding| Hit {
                        doc,
                        score: ranking::cosine_similarity(&vector.vector, embedding),
                    })
                })
                .collect();
            ranking::sort_desc(&mut hits);
            hits.truncate(vector.k);
            lists.push(hits);
        }

        let mut ranked = match lists.len() {
            0 => candidates.iter().map(|&doc| Hit { doc, score: 1.0 }).collect(),
            1 => lists.remove(0),
            _ => ranking::reciprocal_rank_fusion(&lists, RRF_K),
        };
        ranked.truncate(request.top);

        debug!(
            candidates = candidates.len(),
            returned = ranked.len(),
            filtered = filter.is_some(),
            "In-memory search"
        );

        let semantic = match &request.ranking {
            Ranking::Semantic { captions, .. } => Some(*captions),
            Ranking::Simple => None,
        };

        Ok(ranked
            .into_iter()
            .map(|hit| {
                let doc = &documents[hit.doc];
                let mut passage = Passage {
                    source_id: doc.sourcepage.clone(),
                    content: doc.content.clone(),
                    captions: None,
                    score: hit.score,
                    reranker_score: None,
                };
                if let (Some(want_captions), Some(terms)) = (semantic, &query_terms) {
                    passage.reranker_score = Some(ranking::keyword_score(terms, &doc.content));
                    if want_captions {
                        passage.captions = Some(vec![caption(&doc.content, terms)]);
                    }
                }
                passage
            })
            .collect())
    }
}

/// First sentence mentioning a query term, else the first sentence.
fn caption(content: &str, query_terms: &[String]) -> String {
    let sentences: Vec<&str> = content
        .split_inclusive(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    sentences
        .iter()
        .find(|s| ranking::terms(s).iter().any(|t| query_terms.contains(t)))
        .or_else(|| sentences.first())
        .map(|s| s.to_string())
        .unwrap_or_default()
}
