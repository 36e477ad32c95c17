//! model-plugin-sdk: SDK for writing model recognition plugins
//!
//! Implement [`Plugin`] and call [`export_plugin!`]; the macro generates
//! every export the host looks for (`plugin_alloc`, `plugin_dealloc`,
//! `plugin_info`, `recognize`, `on_load`, `on_unload`).
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use model_plugin_sdk::prelude::*;
//!
//! struct Yolo;
//!
//! impl Plugin for Yolo {
//!     fn descriptor() -> PluginDescriptor {
//!         PluginDescriptor::new("yolo", "YOLO Detector", "0.1.0").format("onnx")
//!     }
//!
//!     fn recognize(request: RecognitionRequest) -> RecognitionResponse {
//!         if request.has_block("C2f") && request.has_block("SPPF") {
//!             RecognitionResponse::recognized("YOLOv8").confidence(0.9)
//!         } else {
//!             RecognitionResponse::unrecognized()
//!         }
//!     }
//! }
//!
//! export_plugin!(Yolo);
//! ```
//!
//! Build with `cargo build --target wasm32-unknown-unknown --release` (or
//! `wasm32-wasip1`; the host stubs the WASI imports a std guest pulls in).

use std::alloc::{alloc, dealloc, Layout};

pub use model_plugin_api::*;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{export_plugin, memory, Plugin};
    pub use model_plugin_api::{
        PluginDescriptor, RecognitionRequest, RecognitionResponse, WeightStats,
    };
}

/// Trait that plugins must implement
pub trait Plugin {
    /// Identity and capabilities reported to the host
    fn descriptor() -> PluginDescriptor;

    /// Classify a model from its structural summary
    fn recognize(request: RecognitionRequest) -> RecognitionResponse;

    /// Called once after instantiation; panicking aborts the load
    fn on_load() {}

    /// Called once before the host drops the instance
    fn on_unload() {}
}

/// Serialize the plugin's descriptor
pub fn describe<P: Plugin>() -> String {
    codec::encode_descriptor(&P::descriptor()).unwrap_or_default()
}

/// Decode a request, run the plugin, encode its answer
///
/// Input the plugin cannot understand is answered with an unrecognized
/// response carrying the decode error in its metadata.
pub fn handle_recognize<P: Plugin>(input: &[u8]) -> String {
    let response = match std::str::from_utf8(input)
        .map_err(|e| e.to_string())
        .and_then(|text| codec::decode_request(text).map_err(|e| e.to_string()))
    {
        Ok(request) => P::recognize(request),
        Err(e) => RecognitionResponse::unrecognized().meta("error", e),
    };
    codec::encode_response(&response).unwrap_or_else(|_| r#"{"recognized":false}"#.to_string())
}

/// Memory utilities for Wasm plugin development
pub mod memory {
    use super::*;

    /// Allocate `size` bytes in linear memory; 0 on failure
    #[inline]
    pub fn plugin_alloc(size: i32) -> i32 {
        if size <= 0 {
            return 0;
        }
        match Layout::from_size_align(size as usize, 1) {
            Ok(layout) => unsafe { alloc(layout) as i32 },
            Err(_) => 0,
        }
    }

    /// Free memory returned by [`plugin_alloc`]
    ///
    /// `size` must be the size originally requested.
    #[inline]
    pub fn plugin_dealloc(ptr: i32, size: i32) {
        if ptr == 0 || size <= 0 {
            return;
        }
        if let Ok(layout) = Layout::from_size_align(size as usize, 1) {
            unsafe { dealloc(ptr as *mut u8, layout) }
        }
    }

    /// Copy `payload` into a freshly allocated frame and return its address
    ///
    /// Returns 0 if allocation fails. The host rejects that pointer, and
    /// an empty payload, as a memory error.
    pub fn write_length_prefixed(payload: &str) -> i32 {
        let Some(frame) = encode_frame(payload.as_bytes()) else {
            return 0;
        };
        let ptr = plugin_alloc(frame.len() as i32);
        if ptr != 0 {
            unsafe {
                std::ptr::copy_nonoverlapping(frame.as_ptr(), ptr as *mut u8, frame.len());
            }
        }
        ptr
    }

    /// Borrow the input bytes the host wrote at `ptr`
    ///
    /// # Safety
    /// `ptr` must point to `len` readable bytes that stay alive and
    /// unmodified for the returned lifetime.
    pub unsafe fn read_input<'a>(ptr: i32, len: i32) -> &'a [u8] {
        if ptr == 0 || len <= 0 {
            return &[];
        }
        std::slice::from_raw_parts(ptr as *const u8, len as usize)
    }
}

/// Macro to export all required plugin functions
///
/// Generates `plugin_alloc`, `plugin_dealloc`, `plugin_info`, `recognize`,
/// `on_load` and `on_unload` for a type implementing [`Plugin`].
///
/// # Example
///
/// ```rust,ignore
/// struct MyPlugin;
///
/// impl Plugin for MyPlugin {
///     fn descriptor() -> PluginDescriptor { /* ... */ }
///     fn recognize(request: RecognitionRequest) -> RecognitionResponse { /* ... */ }
/// }
///
/// export_plugin!(MyPlugin);
/// ```
#[macro_export]
macro_rules! export_plugin {
    ($plugin:ty) => {
        #[no_mangle]
        pub extern "C" fn plugin_alloc(size: i32) -> i32 {
            $crate::memory::plugin_alloc(size)
        }

        #[no_mangle]
        pub extern "C" fn plugin_dealloc(ptr: i32, size: i32) {
            $crate::memory::plugin_dealloc(ptr, size)
        }

        #[no_mangle]
        pub extern "C" fn plugin_info() -> i32 {
            $crate::memory::write_length_prefixed(&$crate::describe::<$plugin>())
        }

        #[no_mangle]
        pub extern "C" fn recognize(ptr: i32, len: i32) -> i32 {
            let input = unsafe { $crate::memory::read_input(ptr, len) };
            let output = $crate::handle_recognize::<$plugin>(input);
            $crate::memory::write_length_prefixed(&output)
        }

        #[no_mangle]
        pub extern "C" fn on_load() {
            <$plugin as $crate::Plugin>::on_load()
        }

        #[no_mangle]
        pub extern "C" fn on_unload() {
            <$plugin as $crate::Plugin>::on_unload()
        }
    };
}
