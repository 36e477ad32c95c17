//! model-plugin-api: Shared types for the model recognition plugin system
//!
//! This crate defines the protocol between host and guest (wasm plugin).
//! Records travel as UTF-8 JSON, each wrapped in a frame made of a 4-byte
//! little-endian length followed by the payload bytes.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Linear memory export
pub const EXPORT_MEMORY: &str = "memory";

/// `plugin_alloc(size: i32) -> i32`
pub const EXPORT_ALLOC: &str = "plugin_alloc";

/// `plugin_dealloc(ptr: i32, size: i32)`
pub const EXPORT_DEALLOC: &str = "plugin_dealloc";

/// `plugin_info() -> i32`, pointer to a framed descriptor
pub const EXPORT_INFO: &str = "plugin_info";

/// `recognize(ptr: i32, len: i32) -> i32`, pointer to a framed response
pub const EXPORT_RECOGNIZE: &str = "recognize";

/// Optional `on_load()` hook
pub const EXPORT_ON_LOAD: &str = "on_load";

/// Optional `on_unload()` hook
pub const EXPORT_ON_UNLOAD: &str = "on_unload";

/// Exports every plugin must provide, in the order the host checks them
pub const REQUIRED_EXPORTS: [&str; 5] = [
    EXPORT_MEMORY,
    EXPORT_ALLOC,
    EXPORT_DEALLOC,
    EXPORT_INFO,
    EXPORT_RECOGNIZE,
];

/// Size of the length header in front of every frame
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Default upper bound for a frame payload read back from a guest
pub const DEFAULT_MAX_PAYLOAD_LEN: u32 = 1_000_000;

/// Plugin identity returned by the guest's `plugin_info` export
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginDescriptor {
    /// Unique plugin id (registry key)
    pub id: String,

    /// Human readable name
    pub name: String,

    /// Plugin version (semver)
    pub version: String,

    /// Short description
    #[serde(default)]
    pub description: String,

    /// Model formats this plugin understands (e.g. "onnx", "gguf")
    #[serde(default)]
    pub supported_formats: BTreeSet<String>,

    /// Free-form metadata
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl PluginDescriptor {
    /// Create a new descriptor
    pub fn new(id: impl Into<String>, name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: version.into(),
            description: String::new(),
            supported_formats: BTreeSet::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// Set description
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Add a supported format
    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.supported_formats.insert(format.into());
        self
    }

    /// Add a metadata entry
    pub fn meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Whether this plugin declares support for `format`
    pub fn supports_format(&self, format: &str) -> bool {
        self.supported_formats.contains(format)
    }

    /// Check the invariants a registry key needs
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.id.trim().is_empty() {
            return Err("plugin id must not be empty");
        }
        Ok(())
    }
}

/// Summary statistics over a model's weights
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightStats {
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub sparsity: f64,
}

/// Statistics of a model artifact handed to `recognize`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognitionRequest {
    pub total_params: i64,

    pub layer_count: i32,

    /// Layer type name to occurrence count
    #[serde(default)]
    pub layer_types: BTreeMap<String, i32>,

    /// Architectural blocks found by the host's graph scan (e.g. "C2f")
    #[serde(default)]
    pub detected_blocks: Vec<String>,

    #[serde(default)]
    pub input_shape: Vec<i32>,

    #[serde(default)]
    pub output_shapes: Vec<Vec<i32>>,

    #[serde(default)]
    pub weight_stats: Option<WeightStats>,

    /// Container format (e.g. "onnx")
    #[serde(default)]
    pub format: String,

    #[serde(default)]
    pub file_size_bytes: i64,

    /// Key/value metadata embedded in the artifact itself
    #[serde(default)]
    pub embedded_metadata: BTreeMap<String, String>,
}

impl RecognitionRequest {
    /// Create a request with the two mandatory counters
    pub fn new(total_params: i64, layer_count: i32) -> Self {
        Self {
            total_params,
            layer_count,
            ..Default::default()
        }
    }

    /// Add a detected block
    pub fn block(mut self, block: impl Into<String>) -> Self {
        self.detected_blocks.push(block.into());
        self
    }

    /// Set the container format
    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    /// Whether the given block was detected
    pub fn has_block(&self, block: &str) -> bool {
        self.detected_blocks.iter().any(|b| b == block)
    }
}

/// Classification returned by a plugin
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecognitionResponse {
    pub recognized: bool,

    #[serde(default)]
    pub family: Option<String>,

    #[serde(default)]
    pub variant: Option<String>,

    #[serde(default)]
    pub task: Option<String>,

    #[serde(default)]
    pub confidence: f64,

    #[serde(default)]
    pub metadata: Option<BTreeMap<String, String>>,
}

impl RecognitionResponse {
    /// A negative answer
    pub fn unrecognized() -> Self {
        Self::default()
    }

    /// A positive answer for the given model family
    pub fn recognized(family: impl Into<String>) -> Self {
        Self {
            recognized: true,
            family: Some(family.into()),
            ..Default::default()
        }
    }

    /// Set variant
    pub fn variant(mut self, variant: impl Into<String>) -> Self {
        self.variant = Some(variant.into());
        self
    }

    /// Set task
    pub fn task(mut self, task: impl Into<String>) -> Self {
        self.task = Some(task.into());
        self
    }

    /// Set confidence
    pub fn confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    /// Add a metadata entry
    pub fn meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }
}

/// JSON codec for the wire records
///
/// Decoding ignores unknown keys so that newer guests stay loadable.
pub mod codec {
    use super::{PluginDescriptor, RecognitionRequest, RecognitionResponse};

    pub fn encode_descriptor(descriptor: &PluginDescriptor) -> serde_json::Result<String> {
        serde_json::to_string(descriptor)
    }

    pub fn decode_descriptor(raw: &str) -> serde_json::Result<PluginDescriptor> {
        serde_json::from_str(raw)
    }

    pub fn encode_request(request: &RecognitionRequest) -> serde_json::Result<String> {
        serde_json::to_string(request)
    }

    pub fn decode_request(raw: &str) -> serde_json::Result<RecognitionRequest> {
        serde_json::from_str(raw)
    }

    pub fn encode_response(response: &RecognitionResponse) -> serde_json::Result<String> {
        serde_json::to_string(response)
    }

    pub fn decode_response(raw: &str) -> serde_json::Result<RecognitionResponse> {
        serde_json::from_str(raw)
    }
}

/// Wrap `payload` in a frame: 4-byte little-endian length, then the bytes
///
/// Returns `None` if the payload length does not fit an i32.
pub fn encode_frame(payload: &[u8]) -> Option<Vec<u8>> {
    let len = i32::try_from(payload.len()).ok()?;
    let mut frame = Vec::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(payload);
    Some(frame)
}

/// Decode a frame header. Signed, so a corrupt header can read as negative.
#[inline]
pub fn decode_frame_len(header: [u8; LENGTH_PREFIX_SIZE]) -> i32 {
    i32::from_le_bytes(header)
}
