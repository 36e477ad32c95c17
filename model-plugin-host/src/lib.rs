//! model-plugin-host: Wasm plugin host for model recognition plugins
//!
//! Loads untrusted, sandboxed Wasm modules and asks them to classify model
//! artifacts. Modules only see the fixed import stub table, every memory
//! access is bounds-checked, and every way a module can misbehave surfaces
//! as a [`PluginError`].
//!
//! ```rust,ignore
//! use model_plugin_host::{PluginEngine, TracingListener};
//! use model_plugin_api::RecognitionRequest;
//! use std::sync::Arc;
//!
//! let mut engine = PluginEngine::new()?;
//! engine.add_lifecycle_listener(Arc::new(TracingListener));
//! engine.load(&std::fs::read("yolo_plugin.wasm")?, "yolo_plugin.wasm")?;
//!
//! let request = RecognitionRequest::new(3_200_000, 225)
//!     .block("C2f")
//!     .block("SPPF")
//!     .block("Detect");
//! if let Some(found) = engine.recognize_first(&request, Some("onnx"))? {
//!     println!("{:?}", found.family);
//! }
//! ```

pub mod capability;
pub mod config;
pub mod engine;
pub mod error;
pub mod handle;
pub mod lifecycle;
pub mod loader;
pub mod logging;
pub mod memory;
pub mod shared;
pub mod stubs;

pub use config::EngineConfig;
pub use engine::{PluginEngine, RecognitionResults};
pub use error::{ConfigError, ErrorKind, LoadFileError, PluginError};
pub use handle::PluginHandle;
pub use lifecycle::{
    LifecycleEvent, NullListener, PluginLifecycleListener, RecordingListener, TracingListener,
};
pub use loader::PluginLoader;
pub use shared::SharedPluginEngine;
pub use model_plugin_api::{
    PluginDescriptor, RecognitionRequest, RecognitionResponse, WeightStats,
};
