//! Plugin engine: registry, load sequence and dispatch
//!
//! The engine owns every registered [`PluginHandle`], keyed by descriptor
//! id and kept in load order so that dispatch is deterministic.
//!
//! # Load sequence
//!
//! ```text
//! bytes ─► decode ─► instantiate ─► validate ─► on_load ─► plugin_info
//!                                                              │
//!                         duplicate id? ◄──────────────────────┘
//!                              │
//!                              ▼
//!                    register + notify "loaded"
//! ```
//!
//! Any failing stage aborts the load: nothing is registered, listeners get
//! `on_plugin_load_failed` with the exact error, and the same error is
//! returned to the caller.
//!
//! The engine is not synchronized. Wrap it in a
//! [`SharedPluginEngine`](crate::SharedPluginEngine) to use it from several
//! tasks.

use crate::config::EngineConfig;
use crate::error::{ConfigError, PluginError, Result};
use crate::handle::PluginHandle;
use crate::lifecycle::PluginLifecycleListener;
use crate::loader::PluginLoader;
use model_plugin_api::{PluginDescriptor, RecognitionRequest, RecognitionResponse};
use std::sync::Arc;

/// Per-plugin outcome of [`PluginEngine::recognize_all`], in load order
pub type RecognitionResults = Vec<(String, Result<RecognitionResponse>)>;

/// Owns loaded plugins and dispatches recognition requests to them
pub struct PluginEngine {
    loader: PluginLoader,
    plugins: Vec<PluginHandle>,
    listeners: Vec<Arc<dyn PluginLifecycleListener>>,
}

impl PluginEngine {
    /// Create an empty engine with default configuration
    pub fn new() -> Result<Self, ConfigError> {
        Self::with_config(EngineConfig::default())
    }

    /// Create an empty engine with explicit limits
    pub fn with_config(config: EngineConfig) -> Result<Self, ConfigError> {
        Ok(Self::with_loader(PluginLoader::with_config(config)?))
    }

    /// Create with an existing loader
    pub fn with_loader(loader: PluginLoader) -> Self {
        Self {
            loader,
            plugins: Vec::new(),
            listeners: Vec::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        self.loader.config()
    }

    /// Load, validate and register a plugin
    ///
    /// `source_name` identifies the bytes in failure notifications (a file
    /// name, a URL, ...).
    pub fn load(&mut self, wasm_bytes: &[u8], source_name: &str) -> Result<&mut PluginHandle> {
        let mut handle = match self.loader.load(wasm_bytes, source_name) {
            Ok(handle) => handle,
            Err(e) => return Err(self.load_failed(source_name, e)),
        };

        if self.contains(handle.id()) {
            let err = PluginError::DuplicatePlugin(handle.id().to_string());
            handle.dispose();
            return Err(self.load_failed(source_name, err));
        }

        let index = self.plugins.len();
        self.plugins.push(handle);

        let descriptor = self.plugins[index].descriptor();
        tracing::info!(plugin = %descriptor.id, source = source_name, "Plugin registered");
        for listener in &self.listeners {
            listener.on_plugin_loaded(descriptor);
        }

        Ok(&mut self.plugins[index])
    }

    fn load_failed(&self, source_name: &str, error: PluginError) -> PluginError {
        tracing::warn!(source = source_name, kind = %error.kind(), error = %error, "Plugin load aborted");
        for listener in &self.listeners {
            listener.on_plugin_load_failed(source_name, &error);
        }
        error
    }

    /// Unload and dispose a plugin by id
    ///
    /// Returns false, without notifying anyone, if no such plugin is loaded.
    pub fn unload(&mut self, id: &str) -> bool {
        let Some(index) = self.position(id) else {
            return false;
        };

        let mut handle = self.plugins.remove(index);
        handle.dispose();

        tracing::info!(plugin = %id, "Plugin unloaded");
        for listener in &self.listeners {
            listener.on_plugin_unloaded(handle.descriptor());
        }
        true
    }

    /// Unload every plugin
    pub fn unload_all(&mut self) {
        for id in self.ids() {
            self.unload(&id);
        }
    }

    /// Ask plugins in load order and return the first positive answer
    ///
    /// With `format`, only plugins declaring that format are asked. The
    /// first failing call stops the scan and its error is returned.
    pub fn recognize_first(
        &mut self,
        request: &RecognitionRequest,
        format: Option<&str>,
    ) -> Result<Option<RecognitionResponse>> {
        let candidates = self
            .live_plugins()
            .filter(|p| format.map_or(true, |f| p.descriptor().supports_format(f)));

        for plugin in candidates {
            let response = plugin.recognize(request).map_err(|e| {
                tracing::warn!(plugin = %plugin.id(), error = %e, "Plugin recognize failed");
                e
            })?;
            if response.recognized {
                tracing::debug!(plugin = %plugin.id(), family = ?response.family, "Model recognized");
                return Ok(Some(response));
            }
        }
        Ok(None)
    }

    /// Ask every plugin and collect each outcome
    ///
    /// One plugin failing never stops the others from being asked.
    pub fn recognize_all(&mut self, request: &RecognitionRequest) -> RecognitionResults {
        self.live_plugins()
            .map(|plugin| {
                let result = plugin.recognize(request);
                if let Err(e) = &result {
                    tracing::warn!(plugin = %plugin.id(), error = %e, "Plugin recognize failed");
                }
                (plugin.id().to_string(), result)
            })
            .collect()
    }

    /// Registered handles that can still be called
    fn live_plugins(&mut self) -> impl Iterator<Item = &mut PluginHandle> {
        self.plugins.iter_mut().filter(|p| !p.is_disposed())
    }

    pub fn add_lifecycle_listener(&mut self, listener: Arc<dyn PluginLifecycleListener>) {
        self.listeners.push(listener);
    }

    /// Remove a listener by identity; returns whether it was registered
    pub fn remove_lifecycle_listener(&mut self, listener: &Arc<dyn PluginLifecycleListener>) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|l| !Arc::ptr_eq(l, listener));
        self.listeners.len() != before
    }

    /// Descriptors of all loaded plugins, in load order
    pub fn descriptors(&self) -> Vec<PluginDescriptor> {
        self.plugins.iter().map(|p| p.descriptor().clone()).collect()
    }

    /// Ids of all loaded plugins, in load order
    pub fn ids(&self) -> Vec<String> {
        self.plugins.iter().map(|p| p.id().to_string()).collect()
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.plugins.iter().position(|p| p.id() == id)
    }

    pub fn get(&self, id: &str) -> Option<&PluginHandle> {
        self.plugins.iter().find(|p| p.id() == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut PluginHandle> {
        self.plugins.iter_mut().find(|p| p.id() == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::RecordingListener;

    #[test]
    fn test_engines_are_independent() {
        let a = PluginEngine::new().unwrap();
        let b = PluginEngine::new().unwrap();
        assert!(a.is_empty());
        assert!(b.is_empty());
    }

    #[test]
    fn test_unload_missing_is_silent() {
        let mut engine = PluginEngine::new().unwrap();
        let listener = Arc::new(RecordingListener::new());
        engine.add_lifecycle_listener(listener.clone());

        assert!(!engine.unload("nope"));
        assert_eq!(listener.count(), 0);
    }

    #[test]
    fn test_remove_listener_by_identity() {
        let mut engine = PluginEngine::new().unwrap();
        let first: Arc<dyn PluginLifecycleListener> = Arc::new(RecordingListener::new());
        let second: Arc<dyn PluginLifecycleListener> = Arc::new(RecordingListener::new());
        engine.add_lifecycle_listener(first.clone());
        engine.add_lifecycle_listener(second.clone());

        assert!(engine.remove_lifecycle_listener(&first));
        assert!(!engine.remove_lifecycle_listener(&first));
        assert_eq!(engine.listeners.len(), 1);
    }

    const GUEST: &str = r#"
        (module
          (memory (export "memory") 1)
          (data (i32.const 16) "\23\00\00\00{\"id\":\"a\",\"name\":\"A\",\"version\":\"1\"}")
          (data (i32.const 256) "\14\00\00\00{\"recognized\":false}")
          (func (export "plugin_alloc") (param i32) (result i32) i32.const 1024)
          (func (export "plugin_dealloc") (param i32 i32))
          (func (export "plugin_info") (result i32) i32.const 16)
          (func (export "recognize") (param i32 i32) (result i32) i32.const 256))
    "#;

    #[test]
    fn test_dispatch_skips_disposed_handle() {
        let mut engine = PluginEngine::new().unwrap();
        engine.load(GUEST.as_bytes(), "a.wat").unwrap().dispose();
        assert!(engine.contains("a"));

        let request = RecognitionRequest::new(1, 1);
        assert!(engine.recognize_all(&request).is_empty());
        assert_eq!(engine.recognize_first(&request, None).unwrap(), None);

        assert!(engine.unload("a"));
        assert!(engine.is_empty());
    }

    #[test]
    fn test_load_failure_is_reported_and_returned() {
        let mut engine = PluginEngine::new().unwrap();
        let listener = Arc::new(RecordingListener::new());
        engine.add_lifecycle_listener(listener.clone());

        let err = engine.load(b"not wasm at all", "junk.bin").unwrap_err();
        assert!(matches!(err, PluginError::ModuleDecode(_)));
        assert_eq!(
            listener.failures(),
            vec![("junk.bin".to_string(), crate::ErrorKind::ModuleDecode)]
        );
        assert!(engine.is_empty());
    }
}
