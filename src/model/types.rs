//! Normalized entity structs.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One indexed image as persisted in the metadata store.
///
/// The absolute file path is the identity key in both stores: a metadata row
/// exists if and only if a vector entry with the same path exists. Tags and
/// the embedding are replaced wholesale on re-index, never merged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRecord {
    pub path: PathBuf,
    pub tags: Vec<String>,
    /// Fixed-length f32 vector; length is set by whichever backend was active
    /// when the image was indexed.
    pub embedding: Vec<f32>,
    /// ISO-8601, second precision.
    pub indexed_at: String,
}

/// A search hit: a view over [`ImageRecord`] without the embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub path: PathBuf,
    pub tags: Vec<String>,
    /// Empty for semantic-only hits, which carry identity but no metadata.
    pub indexed_at: String,
}

impl SearchResult {
    /// A semantic-only hit: path identity with empty tags and timestamp.
    pub fn semantic_hit(path: PathBuf) -> Self {
        Self {
            path,
            tags: Vec::new(),
            indexed_at: String::new(),
        }
    }
}

/// Hybrid search output, keyed separately so callers can apply their own
/// merge policy. See [`crate::search::merge_hybrid`] for the default one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HybridResults {
    pub tag_results: Vec<SearchResult>,
    pub semantic_results: Vec<SearchResult>,
}
