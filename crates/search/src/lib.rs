//! Search index clients for groundchat.
//!
//! All clients implement the `groundchat_core::SearchClient` trait:
//! - [`AzureSearchClient`]: Azure AI Search over its REST API
//! - [`InMemoryIndex`]: keyword, vector and hybrid ranking over documents
//!   held in process, with OData-style filter evaluation. Used by tests and
//!   for offline runs.

pub mod azure;
pub mod filter;
pub mod in_memory;
pub mod ranking;

use std::sync::Arc;

use groundchat_config::SearchConfig;
use groundchat_core::SearchClient;
use groundchat_core::error::SearchError;

pub use azure::AzureSearchClient;
pub use filter::FilterExpr;
pub use in_memory::{IndexedDocument, InMemoryIndex};

/// Build the search client selected by the `[search]` configuration section.
pub fn build_from_config(config: &SearchConfig) -> Result<Arc<dyn SearchClient>, SearchError> {
    match config.backend.as_str() {
        "azure" => Ok(Arc::new(AzureSearchClient::from_config(config)?)),
        "in_memory" => Ok(Arc::new(InMemoryIndex::new())),
        other => Err(SearchError::NotConfigured(format!(
            "unknown search backend '{other}'"
        ))),
    }
}
