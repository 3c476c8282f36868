//! Inference backend layer.
//!
//! - **[`InferenceBackend`]**: the capability contract every concrete backend
//!   satisfies (caption + image/text embeddings).
//! - **[`hash`]**: FNV-1a feature hashing backend (deterministic fallback).
//! - **[`openai_compat`]**: HTTP backend for OpenAI-compatible local servers.
//! - **[`registry`]**: closed set of named backends, constructed by name.
//! - **[`manager`]**: active-model lifecycle (load/swap/unload).

pub mod hash;
pub mod manager;
pub mod openai_compat;
pub mod registry;

use anyhow::Result;
use std::path::Path;

/// Capability contract for a concrete inference backend.
///
/// Adding a backend means adding a variant to [`registry`], not changing
/// call sites. Image-vector and text-vector lengths must agree for a given
/// backend, or cross-comparison in the vector store is meaningless.
pub trait InferenceBackend: Send + Sync + std::fmt::Debug {
    /// Registered name of this backend (matches the registry entry).
    fn name(&self) -> &str;

    /// Produce a one-line caption for the image.
    ///
    /// Fails if the path does not exist or is unreadable.
    fn generate_caption(&self, image_path: &Path) -> Result<String>;

    /// Embed the image into a fixed-length vector.
    fn encode_image(&self, image_path: &Path) -> Result<Vec<f32>>;

    /// Embed a text snippet into the same similarity space.
    fn encode_text(&self, text: &str) -> Result<Vec<f32>>;
}
