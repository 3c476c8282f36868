//! Per-image indexing: caption, tag extraction, and the dual-store write.

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::backend::manager::ModelManager;
use crate::storage::sqlite::MetadataStore;
use crate::storage::vector::VectorStore;

/// Pure function from a caption to a tag set.
pub trait Tagger: Send + Sync {
    fn extract_tags(&self, caption: &str) -> Vec<String>;
}

/// Tokens with no tagging value on their own.
static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "a", "an", "the", "this", "that", "these", "those", "and", "or", "but", "of", "in",
        "on", "at", "to", "from", "by", "with", "without", "for", "as", "is", "are", "was",
        "were", "be", "been", "being", "it", "its", "there", "here", "some", "several",
        "very", "over", "under", "near", "into", "onto", "up", "down", "out", "off",
    ]
    .into_iter()
    .collect()
});

/// Default tagger: lowercase, split on non-alphabetic characters, drop stop
/// words and one-letter tokens, dedup. Ordering is irrelevant for tags, so
/// the output is sorted for stable storage.
#[derive(Debug, Default)]
pub struct StopwordTagger;

impl Tagger for StopwordTagger {
    fn extract_tags(&self, caption: &str) -> Vec<String> {
        let mut tags = BTreeSet::new();
        for token in caption
            .to_lowercase()
            .split(|c: char| !c.is_alphabetic())
            .filter(|t| t.len() > 1)
        {
            if !STOP_WORDS.contains(token) {
                tags.insert(token.to_string());
            }
        }
        tags.into_iter().collect()
    }
}

/// Stateless per-image orchestration over the active backend and both
/// stores. Batch concerns (progress, per-item error isolation, mutual
/// exclusion) live in [`crate::sync`], not here.
pub struct Indexer {
    models: Arc<ModelManager>,
    metadata: Arc<MetadataStore>,
    vectors: Arc<VectorStore>,
    tagger: Box<dyn Tagger>,
}

impl Indexer {
    pub fn new(
        models: Arc<ModelManager>,
        metadata: Arc<MetadataStore>,
        vectors: Arc<VectorStore>,
    ) -> Self {
        Self {
            models,
            metadata,
            vectors,
            tagger: Box::new(StopwordTagger),
        }
    }

    pub fn with_tagger(mut self, tagger: Box<dyn Tagger>) -> Self {
        self.tagger = tagger;
        self
    }

    /// Caption, embed, and write one image to both stores.
    ///
    /// The metadata row is written before the vector entry and no
    /// transaction spans the two stores; a crash between the writes leaves
    /// them divergent until the next sync of the folder.
    pub fn index_image(&self, path: &Path) -> Result<()> {
        let model = self.models.get_active_model()?;
        let caption = model
            .generate_caption(path)
            .with_context(|| format!("caption {}", path.display()))?;
        let tags = self.tagger.extract_tags(&caption);
        let embedding = model
            .encode_image(path)
            .with_context(|| format!("embed {}", path.display()))?;

        self.metadata.add_image(path, &tags, &embedding, None)?;
        self.vectors
            .add_embedding(&path.to_string_lossy(), &embedding)?;
        debug!(path = %path.display(), tags = tags.len(), "image indexed");
        Ok(())
    }

    /// Delete one image from both stores. Idempotent: a path absent from
    /// one or both stores is not an error.
    pub fn remove_image(&self, path: &Path) -> Result<()> {
        self.metadata.remove_image(path)?;
        self.vectors.remove_embedding(&path.to_string_lossy())?;
        debug!(path = %path.display(), "image removed from index");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tagger_drops_stop_words_and_dedups() {
        let tagger = StopwordTagger;
        let tags = tagger.extract_tags("A dog and a dog playing in the snow.");
        assert_eq!(tags, vec!["dog", "playing", "snow"]);
    }

    #[test]
    fn tagger_splits_on_punctuation() {
        let tagger = StopwordTagger;
        let tags = tagger.extract_tags("sunset, mountains; lake/reflection");
        assert_eq!(tags, vec!["lake", "mountains", "reflection", "sunset"]);
    }

    #[test]
    fn tagger_handles_empty_caption() {
        let tagger = StopwordTagger;
        assert!(tagger.extract_tags("").is_empty());
        assert!(tagger.extract_tags("a the of").is_empty());
    }
}
