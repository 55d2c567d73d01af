use std::sync::Arc;

use super::vector::VectorIndex;
use crate::error::{Error, Result};
use crate::llm::embeddings::Embedder;
use crate::models::SearchHit;

/// Natural-language queries over the index. The embedder must be the one
/// the index was built with.
pub struct SearchEngine {
    embedder: Arc<dyn Embedder>,
    index: Arc<VectorIndex>,
}

impl SearchEngine {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<VectorIndex>) -> Self {
        Self { embedder, index }
    }

    /// Up to `limit` records nearest to `query`, closest first.
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::Input("search query is empty".to_string()));
        }
        if limit == 0 {
            return Err(Error::Input("limit must be at least 1".to_string()));
        }
        if self.index.is_empty() {
            return Ok(Vec::new());
        }

        let embedding = self.embedder.embed(query).await?;
        let hits = self.index.search(&embedding, limit)?;
        tracing::debug!("Query {query:?} matched {} records", hits.len());
        Ok(hits)
    }
}
