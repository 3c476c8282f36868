//! Application context: the explicitly-owned replacement for process-wide
//! singletons. One `AppContext` is constructed at startup and threaded
//! through everything, which preserves "one active job / one resident
//! model system-wide" without hidden global state.

use anyhow::{Context, Result, bail};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::backend::manager::ModelManager;
use crate::backend::registry;
use crate::config::SettingsStore;
use crate::indexer::Indexer;
use crate::search::SearchEngine;
use crate::storage::sqlite::MetadataStore;
use crate::storage::vector::VectorStore;
use crate::sync::SyncEngine;

pub const METADATA_DB_FILE: &str = "metadata.db";
pub const VECTOR_INDEX_FILE: &str = "vectors.ivdx";

pub struct AppContext {
    pub data_dir: PathBuf,
    pub settings: Arc<SettingsStore>,
    pub models: Arc<ModelManager>,
    pub metadata: Arc<MetadataStore>,
    pub vectors: Arc<VectorStore>,
    pub indexer: Arc<Indexer>,
    pub sync: Arc<SyncEngine>,
    pub search: SearchEngine,
}

impl AppContext {
    pub fn open(data_dir: &Path) -> Result<Self> {
        fs::create_dir_all(data_dir)
            .with_context(|| format!("create data dir {}", data_dir.display()))?;

        let settings = Arc::new(SettingsStore::load(data_dir));
        let models = Arc::new(ModelManager::new(Arc::clone(&settings)));
        let metadata = Arc::new(MetadataStore::open(&data_dir.join(METADATA_DB_FILE))?);
        let vectors = Arc::new(VectorStore::open(&data_dir.join(VECTOR_INDEX_FILE))?);
        let indexer = Arc::new(Indexer::new(
            Arc::clone(&models),
            Arc::clone(&metadata),
            Arc::clone(&vectors),
        ));
        let sync = Arc::new(SyncEngine::new(Arc::clone(&indexer), Arc::clone(&metadata)));
        let search = SearchEngine::new(
            Arc::clone(&metadata),
            Arc::clone(&vectors),
            Arc::clone(&models),
        );

        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            settings,
            models,
            metadata,
            vectors,
            indexer,
            sync,
            search,
        })
    }

    /// Change the configured active model. Takes effect on the next
    /// `get_active_model` call; refused while a job is running so a swap
    /// can never race a mid-flight batch.
    pub fn set_active_model(&self, name: &str) -> Result<()> {
        if registry::find(name).is_none() {
            let known: Vec<&str> = registry::REGISTERED_BACKENDS
                .iter()
                .map(|b| b.name)
                .collect();
            bail!("unknown model name: {name} (known: {})", known.join(", "));
        }
        if self.sync.is_indexing() {
            bail!("an indexing job is running; model changes are refused until it finishes");
        }
        self.settings.set_active_model(name)
    }
}
