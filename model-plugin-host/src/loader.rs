//! Plugin loader using wasmtime
//!
//! Turns module bytes into a [`PluginHandle`]: decode, instantiate against
//! the import stub table, validate exports, run `on_load`, read the
//! descriptor. The loader does not keep the handle; registration is the
//! engine's job.

use crate::capability::{refuel, GuestExports};
use crate::config::EngineConfig;
use crate::error::{ConfigError, PluginError, Result};
use crate::handle::{frame_len, PluginHandle};
use crate::memory;
use crate::stubs::{self, HostState};
use model_plugin_api::{codec, PluginDescriptor};
use wasmtime::{Engine, Linker, Module, Store};

/// Plugin loader with a wasmtime engine and the stub linker
pub struct PluginLoader {
    engine: Engine,
    linker: Linker<HostState>,
    config: EngineConfig,
}

impl PluginLoader {
    /// Create a loader with default configuration
    pub fn new() -> Result<Self, ConfigError> {
        Self::with_config(EngineConfig::default())
    }

    /// Create a loader with explicit limits
    pub fn with_config(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let engine = Engine::new(&config.wasmtime_config()).map_err(ConfigError::Engine)?;

        let mut linker = Linker::new(&engine);
        stubs::add_to_linker(&mut linker).map_err(ConfigError::Engine)?;

        Ok(Self {
            engine,
            linker,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Load a plugin from Wasm bytes (binary or text format)
    pub fn load(&self, wasm_bytes: &[u8], source_name: &str) -> Result<PluginHandle> {
        let fuel = self.config.fuel_limit;

        // 1. Decode module
        let module = Module::new(&self.engine, wasm_bytes).map_err(PluginError::ModuleDecode)?;

        // 2. Instantiate with the stub table as the only import source
        let mut store = Store::new(&self.engine, HostState::default());
        refuel(&mut store, fuel).map_err(PluginError::Instantiation)?;
        let instance = self
            .linker
            .instantiate(&mut store, &module)
            .map_err(PluginError::Instantiation)?;

        // 3. Validate exports
        let exports = GuestExports::resolve(&mut store, &instance)?;

        // 4. Initialize
        exports.on_load(&mut store, fuel)?;

        // 5. Read descriptor
        let descriptor = self.describe(&mut store, &exports)?;

        tracing::debug!(
            plugin = %descriptor.id,
            source = source_name,
            has_on_load = exports.has_on_load(),
            has_on_unload = exports.has_on_unload(),
            "Plugin module ready"
        );

        Ok(PluginHandle::new(
            descriptor,
            source_name.to_string(),
            store,
            exports,
            self.config.clone(),
        ))
    }

    fn describe(
        &self,
        store: &mut Store<HostState>,
        exports: &GuestExports,
    ) -> Result<PluginDescriptor> {
        let fuel = self.config.fuel_limit;

        let ptr = exports.info(store, fuel)?;
        let raw = memory::read_length_prefixed(store, &exports.memory, ptr, self.config.max_payload_len)?;

        if self.config.release_buffers {
            match frame_len(raw.len()) {
                Some(len) => {
                    if let Err(e) = exports.dealloc(store, fuel, ptr, len) {
                        tracing::warn!(error = %e, "Failed to deallocate descriptor memory");
                    }
                }
                None => tracing::warn!(len = raw.len(), "Descriptor frame too large to release"),
            }
        }

        let text = std::str::from_utf8(&raw)
            .map_err(|e| PluginError::DescriptorParse(format!("not valid UTF-8: {}", e)))?;
        let descriptor =
            codec::decode_descriptor(text).map_err(|e| PluginError::DescriptorParse(e.to_string()))?;
        descriptor
            .validate()
            .map_err(|reason| PluginError::DescriptorParse(reason.to_string()))?;

        Ok(descriptor)
    }
}
