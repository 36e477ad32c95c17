//! Thread-safe engine handle
//!
//! [`PluginEngine`] is single-threaded. `SharedPluginEngine` puts it behind
//! one async mutex so that it can be cloned into tasks. Every guest call
//! still runs with the lock held, so an instance is never entered by two
//! threads at once.

use crate::engine::{PluginEngine, RecognitionResults};
use crate::error::{LoadFileError, PluginError};
use crate::lifecycle::PluginLifecycleListener;
use model_plugin_api::{PluginDescriptor, RecognitionRequest, RecognitionResponse};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Cloneable, lock-protected [`PluginEngine`]
#[derive(Clone)]
pub struct SharedPluginEngine {
    inner: Arc<Mutex<PluginEngine>>,
}

impl SharedPluginEngine {
    pub fn new(engine: PluginEngine) -> Self {
        Self {
            inner: Arc::new(Mutex::new(engine)),
        }
    }

    /// Load and register a plugin, returning its descriptor
    pub async fn load(
        &self,
        wasm_bytes: &[u8],
        source_name: &str,
    ) -> Result<PluginDescriptor, PluginError> {
        let mut engine = self.inner.lock().await;
        let handle = engine.load(wasm_bytes, source_name)?;
        Ok(handle.descriptor().clone())
    }

    /// Read a module file and load it; the file name becomes the source name
    pub async fn load_file(&self, path: impl AsRef<Path>) -> Result<PluginDescriptor, LoadFileError> {
        let path = path.as_ref();
        let wasm_bytes = tokio::fs::read(path).await.map_err(|e| LoadFileError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        let source_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Ok(self.load(&wasm_bytes, &source_name).await?)
    }

    pub async fn unload(&self, id: &str) -> bool {
        self.inner.lock().await.unload(id)
    }

    pub async fn unload_all(&self) {
        self.inner.lock().await.unload_all();
    }

    pub async fn descriptors(&self) -> Vec<PluginDescriptor> {
        self.inner.lock().await.descriptors()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.inner.lock().await.contains(id)
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }

    pub async fn recognize_first(
        &self,
        request: &RecognitionRequest,
        format: Option<&str>,
    ) -> Result<Option<RecognitionResponse>, PluginError> {
        self.inner.lock().await.recognize_first(request, format)
    }

    pub async fn recognize_all(&self, request: &RecognitionRequest) -> RecognitionResults {
        self.inner.lock().await.recognize_all(request)
    }

    pub async fn add_lifecycle_listener(&self, listener: Arc<dyn PluginLifecycleListener>) {
        self.inner.lock().await.add_lifecycle_listener(listener);
    }

    pub async fn remove_lifecycle_listener(&self, listener: &Arc<dyn PluginLifecycleListener>) -> bool {
        self.inner.lock().await.remove_lifecycle_listener(listener)
    }

    /// Run `f` with exclusive access to the engine
    pub async fn with_engine<R>(&self, f: impl FnOnce(&mut PluginEngine) -> R) -> R {
        let mut engine = self.inner.lock().await;
        f(&mut engine)
    }
}

impl From<PluginEngine> for SharedPluginEngine {
    fn from(engine: PluginEngine) -> Self {
        Self::new(engine)
    }
}
