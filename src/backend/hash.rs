//! FNV-1a feature hashing backend.
//!
//! A deterministic, dependency-free fallback: always available, no model
//! files, no network. Text is tokenized and feature-hashed into a 384-dim
//! vector; images are hashed over sliding byte windows of the raw file, so
//! identical files embed identically and different files almost surely do
//! not. Captions derive from the file name, which is the only text signal
//! available without a vision model.
//!
//! This is not a semantic embedding. It exists so the whole pipeline (tag
//! extraction, dual-store writes, search plumbing) works offline, and so
//! tests are hermetic.

use anyhow::{Context, Result, bail};
use std::fs;
use std::path::Path;

use super::InferenceBackend;

/// Output dimension, matching the common small-embedder width.
pub const HASH_DIM: usize = 384;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Byte window length for image content hashing.
const IMAGE_WINDOW: usize = 8;

#[derive(Debug, Default)]
pub struct HashBackend;

impl HashBackend {
    pub fn new() -> Self {
        Self
    }
}

impl InferenceBackend for HashBackend {
    fn name(&self) -> &str {
        super::registry::HASH_BACKEND
    }

    fn generate_caption(&self, image_path: &Path) -> Result<String> {
        if !image_path.is_file() {
            bail!("image not found: {}", image_path.display());
        }
        let stem = image_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let words: Vec<String> = stem
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
            .collect();
        if words.is_empty() {
            bail!("cannot derive a caption for {}", image_path.display());
        }
        Ok(words.join(" "))
    }

    fn encode_image(&self, image_path: &Path) -> Result<Vec<f32>> {
        let bytes = fs::read(image_path)
            .with_context(|| format!("read image {}", image_path.display()))?;
        if bytes.is_empty() {
            bail!("empty image file: {}", image_path.display());
        }
        let mut features = vec![0.0f32; HASH_DIM];
        for window in bytes.windows(IMAGE_WINDOW.min(bytes.len())) {
            accumulate(&mut features, fnv1a(window));
        }
        normalize(&mut features);
        Ok(features)
    }

    fn encode_text(&self, text: &str) -> Result<Vec<f32>> {
        let mut features = vec![0.0f32; HASH_DIM];
        let mut any = false;
        for token in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            accumulate(&mut features, fnv1a(token.as_bytes()));
            any = true;
        }
        if !any {
            bail!("cannot embed empty text");
        }
        normalize(&mut features);
        Ok(features)
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    for b in bytes {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Bucket by hash, signed by one hash bit so collisions cancel rather than
/// pile up in one direction.
fn accumulate(features: &mut [f32], hash: u64) {
    let bucket = (hash % features.len() as u64) as usize;
    let sign = if hash & (1 << 63) == 0 { 1.0 } else { -1.0 };
    features[bucket] += sign;
}

fn normalize(features: &mut [f32]) {
    let norm = features.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in features.iter_mut() {
            *v /= norm;
        }
    }
}
