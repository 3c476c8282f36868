//! Search layer: tag, semantic, and hybrid queries.

use anyhow::{Result, ensure};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use crate::backend::manager::ModelManager;
use crate::model::types::{HybridResults, SearchResult};
use crate::storage::sqlite::MetadataStore;
use crate::storage::vector::VectorStore;

pub const DEFAULT_TOP_K: usize = 10;

pub struct SearchEngine {
    metadata: Arc<MetadataStore>,
    vectors: Arc<VectorStore>,
    models: Arc<ModelManager>,
}

impl SearchEngine {
    pub fn new(
        metadata: Arc<MetadataStore>,
        vectors: Arc<VectorStore>,
        models: Arc<ModelManager>,
    ) -> Self {
        Self {
            metadata,
            vectors,
            models,
        }
    }

    /// Substring match against stored tag strings, case-sensitive as
    /// stored; callers are expected to normalize. Store order.
    pub fn search_by_tag(&self, query: &str) -> Result<Vec<SearchResult>> {
        self.metadata.search_by_tag(query)
    }

    /// Embed `query` with the active backend and return the `top_k`
    /// nearest indexed images, nearest first. Semantic hits carry identity
    /// only: empty tags and timestamp.
    pub fn search_semantic(&self, query: &str, top_k: usize) -> Result<Vec<SearchResult>> {
        ensure!(top_k > 0, "top_k must be positive, got {top_k}");
        let model = self.models.get_active_model()?;
        let query_embedding = model.encode_text(query)?;
        let hits = self.vectors.search(&query_embedding, top_k);
        Ok(hits
            .into_iter()
            .map(|(id, _score)| SearchResult::semantic_hit(PathBuf::from(id)))
            .collect())
    }

    /// Run tag and semantic search independently, keyed separately so the
    /// caller can merge (see [`merge_hybrid`]).
    pub fn search_hybrid(
        &self,
        query: &str,
        tag_filter: &str,
        top_k: usize,
    ) -> Result<HybridResults> {
        let tag_results = self.search_by_tag(tag_filter)?;
        let semantic_results = self.search_semantic(query, top_k)?;
        Ok(HybridResults {
            tag_results,
            semantic_results,
        })
    }
}

/// Reference merge policy: tag results first, then semantic results,
/// deduplicated by path keeping the first occurrence. An image matched
/// both ways therefore surfaces once, with its tag-derived metadata.
pub fn merge_hybrid(results: &HybridResults) -> Vec<SearchResult> {
    let mut seen: HashSet<&std::path::Path> = HashSet::new();
    let mut merged = Vec::new();
    for result in results
        .tag_results
        .iter()
        .chain(results.semantic_results.iter())
    {
        if seen.insert(result.path.as_path()) {
            merged.push(result.clone());
        }
    }
    merged
}
