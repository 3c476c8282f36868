//! Backend registry: the closed set of named inference backends.
//!
//! | Name | Captioning | Embeddings | Notes |
//! |------|------------|------------|-------|
//! | hash | file-name derived | FNV-1a feature hashing (384) | Always available fallback |
//! | openai-compat | vision chat model | server embedding model | Needs a local OpenAI-style server |

use std::sync::Arc;
use thiserror::Error;

use super::InferenceBackend;
use super::hash::HashBackend;
use super::openai_compat::OpenAiCompatBackend;
use crate::config::Settings;

/// Default backend name when none is configured.
pub const DEFAULT_BACKEND: &str = HASH_BACKEND;

/// Deterministic feature-hashing backend (always available).
pub const HASH_BACKEND: &str = "hash";

/// OpenAI-compatible HTTP backend.
pub const OPENAI_COMPAT_BACKEND: &str = "openai-compat";

/// Information about a registered backend.
#[derive(Debug, Clone)]
pub struct RegisteredBackend {
    pub name: &'static str,
    pub description: &'static str,
    /// Whether the backend needs a configured server endpoint.
    pub requires_endpoint: bool,
}

/// All registered backends. Adding a backend means adding a row here plus a
/// construction arm in [`create_backend`]; call sites stay unchanged.
pub const REGISTERED_BACKENDS: &[RegisteredBackend] = &[
    RegisteredBackend {
        name: HASH_BACKEND,
        description: "FNV-1a feature hashing; deterministic, offline, file-name captions",
        requires_endpoint: false,
    },
    RegisteredBackend {
        name: OPENAI_COMPAT_BACKEND,
        description: "OpenAI-compatible server: vision captions + multimodal embeddings",
        requires_endpoint: true,
    },
];

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unknown model name: {0}")]
    UnknownModel(String),
    #[error("failed to construct backend {name}: {message}")]
    Construction { name: &'static str, message: String },
}

/// Look up registry metadata by name.
pub fn find(name: &str) -> Option<&'static RegisteredBackend> {
    REGISTERED_BACKENDS.iter().find(|b| b.name == name)
}

/// Construct a backend instance by registered name.
pub fn create_backend(
    name: &str,
    settings: &Settings,
) -> Result<Arc<dyn InferenceBackend>, RegistryError> {
    match name {
        HASH_BACKEND => Ok(Arc::new(HashBackend::new())),
        OPENAI_COMPAT_BACKEND => OpenAiCompatBackend::new(&settings.openai)
            .map(|b| Arc::new(b) as Arc<dyn InferenceBackend>)
            .map_err(|err| RegistryError::Construction {
                name: OPENAI_COMPAT_BACKEND,
                message: format!("{err:#}"),
            }),
        other => Err(RegistryError::UnknownModel(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_names_are_constructible() {
        let settings = Settings::default();
        for registered in REGISTERED_BACKENDS {
            let backend = create_backend(registered.name, &settings).unwrap();
            assert_eq!(backend.name(), registered.name);
        }
    }

    #[test]
    fn unknown_name_is_an_error() {
        let err = create_backend("florence-2", &Settings::default()).unwrap_err();
        assert!(matches!(err, RegistryError::UnknownModel(_)));
        assert!(err.to_string().contains("florence-2"));
    }

    #[test]
    fn default_backend_is_registered() {
        assert!(find(DEFAULT_BACKEND).is_some());
        assert!(find("nonsense").is_none());
    }
}
