//! Engine configuration

use crate::error::ConfigError;
use model_plugin_api::DEFAULT_MAX_PAYLOAD_LEN;
use serde::Deserialize;

/// Configuration shared by the loader and every handle it creates
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Largest frame payload accepted from a guest, in bytes
    pub max_payload_len: u32,

    /// Fuel granted before each guest call (CPU limit); `None` disables metering
    pub fuel_limit: Option<u64>,

    /// Maximum Wasm stack size in bytes
    pub max_stack_size: usize,

    /// Hand input and response buffers back to the guest after each call
    pub release_buffers: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_payload_len: DEFAULT_MAX_PAYLOAD_LEN,
            fuel_limit: Some(10_000_000),
            max_stack_size: 1024 * 1024, // 1MB
            release_buffers: true,
        }
    }
}

impl EngineConfig {
    pub fn max_payload_len(mut self, max_payload_len: u32) -> Self {
        self.max_payload_len = max_payload_len;
        self
    }

    pub fn fuel_limit(mut self, fuel_limit: Option<u64>) -> Self {
        self.fuel_limit = fuel_limit;
        self
    }

    pub fn max_stack_size(mut self, max_stack_size: usize) -> Self {
        self.max_stack_size = max_stack_size;
        self
    }

    pub fn release_buffers(mut self, release_buffers: bool) -> Self {
        self.release_buffers = release_buffers;
        self
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_payload_len == 0 {
            return Err(ConfigError::InvalidPayloadLimit);
        }
        if self.max_stack_size == 0 {
            return Err(ConfigError::InvalidStackSize);
        }
        Ok(())
    }

    /// Build the wasmtime configuration matching these limits
    pub(crate) fn wasmtime_config(&self) -> wasmtime::Config {
        let mut config = wasmtime::Config::new();
        config.consume_fuel(self.fuel_limit.is_some());
        config.max_wasm_stack(self.max_stack_size);
        config.wasm_memory64(false);
        config
    }
}
