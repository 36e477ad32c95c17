//! Lifecycle observers
//!
//! Listeners are told about loads, unloads and failed loads. They are a
//! side channel: nothing they do can change the outcome of the operation
//! that notified them.

use crate::error::{ErrorKind, PluginError};
use model_plugin_api::PluginDescriptor;
use std::fmt;
use std::sync::{Mutex, PoisonError};

/// Receives plugin lifecycle notifications
///
/// # Example
///
/// ```rust
/// use model_plugin_host::{PluginError, PluginLifecycleListener};
/// use model_plugin_api::PluginDescriptor;
///
/// struct Console;
///
/// impl PluginLifecycleListener for Console {
///     fn on_plugin_loaded(&self, descriptor: &PluginDescriptor) {
///         println!("loaded {} v{}", descriptor.id, descriptor.version);
///     }
///
///     fn on_plugin_load_failed(&self, source_name: &str, error: &PluginError) {
///         println!("{} failed: {}", source_name, error);
///     }
/// }
/// ```
pub trait PluginLifecycleListener: Send + Sync {
    /// A plugin passed every load stage and is now registered
    fn on_plugin_loaded(&self, _descriptor: &PluginDescriptor) {}

    /// A registered plugin was removed and disposed
    fn on_plugin_unloaded(&self, _descriptor: &PluginDescriptor) {}

    /// A load attempt was aborted; nothing was registered
    fn on_plugin_load_failed(&self, _source_name: &str, _error: &PluginError) {}
}

/// Logs lifecycle events through `tracing`
#[derive(Debug, Default)]
pub struct TracingListener;

impl PluginLifecycleListener for TracingListener {
    fn on_plugin_loaded(&self, descriptor: &PluginDescriptor) {
        tracing::info!(
            plugin = %descriptor.id,
            name = %descriptor.name,
            version = %descriptor.version,
            "Plugin loaded"
        );
    }

    fn on_plugin_unloaded(&self, descriptor: &PluginDescriptor) {
        tracing::info!(plugin = %descriptor.id, "Plugin unloaded");
    }

    fn on_plugin_load_failed(&self, source_name: &str, error: &PluginError) {
        tracing::warn!(source = source_name, kind = %error.kind(), error = %error, "Plugin load failed");
    }
}

/// Discards every event
#[derive(Debug, Default)]
pub struct NullListener;

impl PluginLifecycleListener for NullListener {}

/// A recorded lifecycle notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    Loaded { id: String },
    Unloaded { id: String },
    LoadFailed {
        source_name: String,
        kind: ErrorKind,
        message: String,
    },
}

/// In-memory listener, mostly for tests
#[derive(Default)]
pub struct RecordingListener {
    events: Mutex<Vec<LifecycleEvent>>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, event: LifecycleEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    /// Get all recorded events, oldest first
    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn count(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Ids from `Loaded` events, in order
    pub fn loaded_ids(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                LifecycleEvent::Loaded { id } => Some(id),
                _ => None,
            })
            .collect()
    }

    /// `(source_name, kind)` of every failed load, in order
    pub fn failures(&self) -> Vec<(String, ErrorKind)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                LifecycleEvent::LoadFailed {
                    source_name, kind, ..
                } => Some((source_name, kind)),
                _ => None,
            })
            .collect()
    }
}

impl PluginLifecycleListener for RecordingListener {
    fn on_plugin_loaded(&self, descriptor: &PluginDescriptor) {
        self.push(LifecycleEvent::Loaded {
            id: descriptor.id.clone(),
        });
    }

    fn on_plugin_unloaded(&self, descriptor: &PluginDescriptor) {
        self.push(LifecycleEvent::Unloaded {
            id: descriptor.id.clone(),
        });
    }

    fn on_plugin_load_failed(&self, source_name: &str, error: &PluginError) {
        self.push(LifecycleEvent::LoadFailed {
            source_name: source_name.to_string(),
            kind: error.kind(),
            message: error.to_string(),
        });
    }
}

impl fmt::Debug for RecordingListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordingListener")
            .field("count", &self.count())
            .finish()
    }
}
