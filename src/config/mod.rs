//! Settings persistence: the active model name and backend endpoints.
//!
//! Settings live in a TOML file under the data dir. Loading is tolerant: a
//! missing or corrupt file falls back to defaults so the application always
//! starts. Environment variables (optionally via `.env`) override the file:
//!
//! - `IRIS_ACTIVE_MODEL` - active inference backend name
//! - `IRIS_OPENAI_BASE_URL` - OpenAI-compatible endpoint base URL
//! - `IRIS_OPENAI_API_KEY` - bearer token for that endpoint

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const SETTINGS_FILE: &str = "settings.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Name of the active inference backend (see `backend::registry`).
    pub active_model: String,
    pub openai: OpenAiSettings,
}

/// Connection settings for the OpenAI-compatible backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    /// Vision chat model used for caption generation.
    pub caption_model: String,
    /// Embedding model used for text and image vectors.
    pub embedding_model: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            active_model: crate::backend::registry::DEFAULT_BACKEND.to_string(),
            openai: OpenAiSettings::default(),
        }
    }
}

impl Default for OpenAiSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434/v1".to_string(),
            api_key: None,
            caption_model: "qwen2.5-vl".to_string(),
            embedding_model: "clip-vit-b-32".to_string(),
        }
    }
}

/// Shared, mutable handle over the settings file.
///
/// The lifecycle manager reads the active model name through this handle on
/// every `get_active_model` call, so changes take effect on the next call
/// rather than retroactively on an already-resident backend.
pub struct SettingsStore {
    path: PathBuf,
    inner: Mutex<Settings>,
}

impl SettingsStore {
    /// Load settings from `data_dir`, falling back to defaults on any error.
    pub fn load(data_dir: &Path) -> Self {
        let path = data_dir.join(SETTINGS_FILE);
        let mut settings = match fs::read_to_string(&path) {
            Ok(raw) => match toml::from_str::<Settings>(&raw) {
                Ok(settings) => settings,
                Err(err) => {
                    warn!(path = %path.display(), "ignoring unreadable settings file: {err}");
                    Settings::default()
                }
            },
            Err(_) => Settings::default(),
        };
        apply_env_overrides(&mut settings);
        Self {
            path,
            inner: Mutex::new(settings),
        }
    }

    pub fn save(&self) -> Result<()> {
        let rendered = toml::to_string_pretty(&*self.inner.lock())?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create settings dir {}", parent.display()))?;
        }
        fs::write(&self.path, rendered)
            .with_context(|| format!("write settings to {}", self.path.display()))
    }

    pub fn snapshot(&self) -> Settings {
        self.inner.lock().clone()
    }

    pub fn active_model(&self) -> String {
        self.inner.lock().active_model.clone()
    }

    /// Set and persist the active model name.
    pub fn set_active_model(&self, name: &str) -> Result<()> {
        self.inner.lock().active_model = name.to_string();
        self.save()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn apply_env_overrides(settings: &mut Settings) {
    if let Ok(name) = dotenvy::var("IRIS_ACTIVE_MODEL") {
        if !name.trim().is_empty() {
            settings.active_model = name;
        }
    }
    if let Ok(url) = dotenvy::var("IRIS_OPENAI_BASE_URL") {
        if !url.trim().is_empty() {
            settings.openai.base_url = url;
        }
    }
    if let Ok(key) = dotenvy::var("IRIS_OPENAI_API_KEY") {
        if !key.trim().is_empty() {
            settings.openai.api_key = Some(key);
        }
    }
}
