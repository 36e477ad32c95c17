//! Plugin handle
//!
//! One handle owns one instantiated module for its whole life. Handles are
//! only produced by [`PluginLoader::load`](crate::PluginLoader::load), after
//! the export surface has been validated and the descriptor parsed.
//!
//! ```text
//! Loaded ──dispose()──► Disposed (terminal)
//! ```

use crate::capability::GuestExports;
use crate::config::EngineConfig;
use crate::error::{PluginError, Result};
use crate::memory::{self, GuestBuffer};
use crate::stubs::HostState;
use model_plugin_api::{
    codec, PluginDescriptor, RecognitionRequest, RecognitionResponse, EXPORT_RECOGNIZE,
    LENGTH_PREFIX_SIZE,
};
use std::fmt;
use wasmtime::Store;

/// Size of the frame holding `payload_len` bytes, if it fits an i32
pub(crate) fn frame_len(payload_len: usize) -> Option<i32> {
    payload_len
        .checked_add(LENGTH_PREFIX_SIZE)
        .and_then(|len| i32::try_from(len).ok())
}

/// A loaded plugin ready for recognition calls
pub struct PluginHandle {
    descriptor: PluginDescriptor,
    source_name: String,
    store: Store<HostState>,
    exports: GuestExports,
    config: EngineConfig,
    disposed: bool,
}

impl PluginHandle {
    pub(crate) fn new(
        descriptor: PluginDescriptor,
        source_name: String,
        store: Store<HostState>,
        exports: GuestExports,
        config: EngineConfig,
    ) -> Self {
        Self {
            descriptor,
            source_name,
            store,
            exports,
            config,
            disposed: false,
        }
    }

    /// Plugin id (registry key)
    pub fn id(&self) -> &str {
        &self.descriptor.id
    }

    pub fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    /// Name the module bytes were loaded under (e.g. a file name)
    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn has_unload_hook(&self) -> bool {
        self.exports.has_on_unload()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// How many times the guest has called into the import stub table
    pub fn stub_invocations(&self) -> u64 {
        self.store.data().stub_calls()
    }

    fn ensure_live(&self) {
        assert!(
            !self.disposed,
            "plugin '{}' has been disposed",
            self.descriptor.id
        );
    }

    /// Send a raw payload to the guest's `recognize` export and return the
    /// payload of the frame it answers with
    ///
    /// # Panics
    /// Panics if the handle has been disposed.
    pub fn exchange(&mut self, payload: &[u8]) -> Result<Vec<u8>> {
        self.ensure_live();
        let fuel = self.config.fuel_limit;

        let input = memory::write_input(&mut self.store, &self.exports, fuel, payload)?;
        let output = self.call_recognize(input);

        if self.config.release_buffers {
            self.release(input);
            if let Ok((result_ptr, bytes)) = &output {
                match frame_len(bytes.len()) {
                    Some(len) => self.release(GuestBuffer { ptr: *result_ptr, len }),
                    None => tracing::warn!(plugin = %self.descriptor.id, "Response frame too large to release"),
                }
            }
        }

        output.map(|(_, bytes)| bytes)
    }

    /// Run the guest's `recognize` on a written input and read back its frame
    fn call_recognize(&mut self, input: GuestBuffer) -> Result<(i32, Vec<u8>)> {
        let result_ptr = self.exports.recognize(
            &mut self.store,
            self.config.fuel_limit,
            input.ptr,
            input.len,
        )?;
        tracing::debug!(plugin = %self.descriptor.id, result_ptr, "Guest recognize returned");

        let output = memory::read_length_prefixed(
            &self.store,
            &self.exports.memory,
            result_ptr,
            self.config.max_payload_len,
        )?;
        Ok((result_ptr, output))
    }

    /// Ask the plugin to classify a model
    ///
    /// # Panics
    /// Panics if the handle has been disposed.
    pub fn recognize(&mut self, request: &RecognitionRequest) -> Result<RecognitionResponse> {
        self.ensure_live();

        let json = codec::encode_request(request)
            .map_err(|e| PluginError::Memory(format!("Failed to encode request: {}", e)))?;
        let raw = self.exchange(json.as_bytes())?;

        let text = std::str::from_utf8(&raw).map_err(|e| PluginError::Invocation {
            function: EXPORT_RECOGNIZE,
            source: anyhow::anyhow!("response is not valid UTF-8: {}", e),
        })?;
        codec::decode_response(text).map_err(|e| PluginError::Invocation {
            function: EXPORT_RECOGNIZE,
            source: anyhow::anyhow!("malformed response: {}", e),
        })
    }

    /// Return a buffer to the guest allocator; failures are only logged
    fn release(&mut self, buffer: GuestBuffer) {
        if let Err(e) = self.exports.dealloc(
            &mut self.store,
            self.config.fuel_limit,
            buffer.ptr,
            buffer.len,
        ) {
            tracing::warn!(plugin = %self.descriptor.id, error = %e, "Failed to deallocate guest buffer");
        }
    }

    /// Tear the plugin down, calling `on_unload` if the guest exports it
    ///
    /// Hook failures are logged and swallowed. Calling this more than once
    /// is a no-op. Only the engine (on unload) and `Drop` dispose a handle,
    /// so a registered handle is never left disposed.
    pub(crate) fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;

        if let Err(e) = self.exports.on_unload(&mut self.store, self.config.fuel_limit) {
            tracing::warn!(plugin = %self.descriptor.id, error = %e, "on_unload failed, continuing teardown");
        }
        tracing::debug!(
            plugin = %self.descriptor.id,
            stub_calls = self.stub_invocations(),
            "Plugin disposed"
        );
    }
}

impl Drop for PluginHandle {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for PluginHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginHandle")
            .field("id", &self.descriptor.id)
            .field("source_name", &self.source_name)
            .field("has_unload_hook", &self.has_unload_hook())
            .field("disposed", &self.disposed)
            .finish()
    }
}
