//! Active-model lifecycle management.
//!
//! Owns which inference backend is resident. At most one backend instance is
//! held at a time: swapping to a different configured name unloads the old
//! instance before constructing the new one, so two models are never
//! resident together (backends may pin significant device or server-side
//! memory). There are no hidden process-wide caches; dropping the held
//! `Arc` releases everything this side owns.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use parking_lot::Mutex;
use tracing::{debug, info};

use super::{InferenceBackend, registry};
use crate::config::SettingsStore;

/// The process-wide active-model binding.
#[derive(Default)]
struct ActiveModelBinding {
    /// Name of the backend whose resources are currently resident.
    loaded_model_name: Option<String>,
    active_instance: Option<Arc<dyn InferenceBackend>>,
}

pub struct ModelManager {
    settings: Arc<SettingsStore>,
    binding: Mutex<ActiveModelBinding>,
    /// Number of times resident resources were actually released; lets the
    /// swap-isolation property be observed from outside.
    unloads: AtomicUsize,
}

impl ModelManager {
    pub fn new(settings: Arc<SettingsStore>) -> Self {
        Self {
            settings,
            binding: Mutex::new(ActiveModelBinding::default()),
            unloads: AtomicUsize::new(0),
        }
    }

    /// Return a ready instance of the configured active backend.
    ///
    /// If the resident instance already matches the configured name it is
    /// returned unchanged. Otherwise the resident backend (if any) is
    /// unloaded first, then the configured one is constructed. Construction
    /// failures propagate and leave the binding unset, so the next call
    /// retries instead of returning a stale instance.
    pub fn get_active_model(&self) -> Result<Arc<dyn InferenceBackend>> {
        let configured = self.settings.active_model();
        let mut binding = self.binding.lock();

        if binding.loaded_model_name.as_deref() == Some(configured.as_str()) {
            if let Some(instance) = binding.active_instance.as_ref() {
                return Ok(Arc::clone(instance));
            }
        }

        self.release(&mut binding);

        let instance = registry::create_backend(&configured, &self.settings.snapshot())?;
        binding.active_instance = Some(Arc::clone(&instance));
        binding.loaded_model_name = Some(configured.clone());
        info!(model = %configured, "inference backend loaded");
        Ok(instance)
    }

    /// Release whatever is resident. Idempotent: calling with nothing loaded
    /// is a no-op and does not count as an unload.
    pub fn unload_models(&self) {
        let mut binding = self.binding.lock();
        self.release(&mut binding);
    }

    /// The configured active backend name, without forcing a load.
    pub fn model_name(&self) -> String {
        self.settings.active_model()
    }

    /// Name of the backend currently resident, if any.
    pub fn loaded_model_name(&self) -> Option<String> {
        self.binding.lock().loaded_model_name.clone()
    }

    /// How many times resident resources have been released.
    pub fn unload_count(&self) -> usize {
        self.unloads.load(Ordering::Relaxed)
    }

    fn release(&self, binding: &mut ActiveModelBinding) {
        if binding.active_instance.is_none() && binding.loaded_model_name.is_none() {
            return;
        }
        if let Some(name) = binding.loaded_model_name.take() {
            debug!(model = %name, "unloading inference backend");
        }
        binding.active_instance = None;
        self.unloads.fetch_add(1, Ordering::Relaxed);
    }
}
