//! Memory marshaling across the host/guest boundary
//!
//! Payloads travel in guest linear memory. Host to guest: the guest
//! allocates `len` bytes through `plugin_alloc` and the host copies the raw
//! payload there. Guest to host: the guest returns a pointer to a frame
//! (4-byte little-endian length, then the payload) and the host copies it
//! out.
//!
//! The host never holds a raw view of guest memory. Every access goes
//! through wasmtime's bounds-checked [`Memory::read`] / [`Memory::write`],
//! and a length header is checked against the configured limit before any
//! payload byte is read.

use crate::capability::GuestExports;
use crate::error::{PluginError, Result};
use crate::stubs::HostState;
use model_plugin_api::{decode_frame_len, LENGTH_PREFIX_SIZE};
use wasmtime::{Memory, Store};

/// A region of guest memory handed out by `plugin_alloc`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuestBuffer {
    pub ptr: i32,
    pub len: i32,
}

/// Guest pointers are unsigned 32-bit offsets carried in an i32
#[inline]
fn offset(ptr: i32) -> usize {
    ptr as u32 as usize
}

/// Copy `bytes` into guest memory at `ptr`
pub fn write_bytes(
    store: &mut Store<HostState>,
    memory: &Memory,
    ptr: i32,
    bytes: &[u8],
) -> Result<()> {
    memory
        .write(&mut *store, offset(ptr), bytes)
        .map_err(|e| {
            PluginError::Memory(format!(
                "Failed to write {} bytes at ptr={}: {}",
                bytes.len(),
                ptr,
                e
            ))
        })
}

/// Allocate a guest buffer for `payload` and copy it in
pub fn write_input(
    store: &mut Store<HostState>,
    exports: &GuestExports,
    fuel: Option<u64>,
    payload: &[u8],
) -> Result<GuestBuffer> {
    let len: i32 = payload.len().try_into().map_err(|_| {
        PluginError::Memory(format!(
            "Payload too large: {} bytes exceeds i32::MAX",
            payload.len()
        ))
    })?;

    let ptr = exports.alloc(store, fuel, len)?;
    if ptr == 0 && len > 0 {
        return Err(PluginError::Memory(format!(
            "Guest allocator returned null for {} bytes",
            len
        )));
    }

    write_bytes(store, &exports.memory, ptr, payload)?;
    tracing::debug!(ptr, len, "Wrote input payload to guest memory");

    Ok(GuestBuffer { ptr, len })
}

/// Read the frame at `ptr` and return its payload
///
/// A length header outside `1..=max_len` is rejected before any payload
/// byte is read.
pub fn read_length_prefixed(
    store: &Store<HostState>,
    memory: &Memory,
    ptr: i32,
    max_len: u32,
) -> Result<Vec<u8>> {
    let mut header = [0u8; LENGTH_PREFIX_SIZE];
    memory.read(store, offset(ptr), &mut header).map_err(|e| {
        PluginError::Memory(format!("Failed to read length at ptr={}: {}", ptr, e))
    })?;

    let len = decode_frame_len(header);
    if len <= 0 || len as u32 > max_len {
        return Err(PluginError::Memory(format!(
            "Invalid length value: {} at ptr={} (limit {})",
            len, ptr, max_len
        )));
    }

    let start = offset(ptr).checked_add(LENGTH_PREFIX_SIZE).ok_or_else(|| {
        PluginError::Memory(format!("Integer overflow: ptr={}, len={}", ptr, len))
    })?;

    let mut payload = vec![0u8; len as usize];
    memory.read(store, start, &mut payload).map_err(|e| {
        PluginError::Memory(format!(
            "Failed to read {} bytes at ptr={}: {}",
            len, start, e
        ))
    })?;

    tracing::debug!(ptr, len, "Read framed payload from guest memory");
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wasmtime::{Engine, MemoryType};

    const LIMIT: u32 = 1_000_000;

    fn setup() -> (Store<HostState>, Memory) {
        let engine = Engine::default();
        let mut store = Store::new(&engine, HostState::default());
        let memory = Memory::new(&mut store, MemoryType::new(1, None)).unwrap();
        (store, memory)
    }

    fn put_header(store: &mut Store<HostState>, memory: &Memory, ptr: i32, len: i32) {
        write_bytes(store, memory, ptr, &len.to_le_bytes()).unwrap();
    }

    #[test]
    fn test_read_frame() {
        let (mut store, memory) = setup();
        let frame = model_plugin_api::encode_frame(br#"{"recognized":true}"#).unwrap();
        write_bytes(&mut store, &memory, 128, &frame).unwrap();

        let payload = read_length_prefixed(&store, &memory, 128, LIMIT).unwrap();
        assert_eq!(payload, br#"{"recognized":true}"#);
    }

    #[test]
    fn test_zero_length_rejected() {
        let (mut store, memory) = setup();
        put_header(&mut store, &memory, 64, 0);
        assert!(matches!(
            read_length_prefixed(&store, &memory, 64, LIMIT),
            Err(PluginError::Memory(_))
        ));
    }

    #[test]
    fn test_negative_length_rejected() {
        let (mut store, memory) = setup();
        put_header(&mut store, &memory, 64, -5);
        assert!(matches!(
            read_length_prefixed(&store, &memory, 64, LIMIT),
            Err(PluginError::Memory(_))
        ));
    }

    #[test]
    fn test_oversized_length_rejected_before_payload_read() {
        let (mut store, memory) = setup();
        // The payload region would run past the end of the single page, so an
        // attempted read would report out-of-bounds instead.
        let ptr = 65536 - 8;
        put_header(&mut store, &memory, ptr, 1_000_001);

        match read_length_prefixed(&store, &memory, ptr, LIMIT) {
            Err(PluginError::Memory(msg)) => assert!(msg.contains("Invalid length value")),
            other => panic!("expected Memory error, got {:?}", other),
        }
    }

    #[test]
    fn test_limit_is_configurable() {
        let (mut store, memory) = setup();
        let frame = model_plugin_api::encode_frame(&[7u8; 32]).unwrap();
        write_bytes(&mut store, &memory, 0, &frame).unwrap();

        assert!(read_length_prefixed(&store, &memory, 0, 16).is_err());
        assert_eq!(read_length_prefixed(&store, &memory, 0, 32).unwrap().len(), 32);
    }

    #[test]
    fn test_out_of_bounds_payload_is_error() {
        let (mut store, memory) = setup();
        let ptr = 65536 - 8;
        put_header(&mut store, &memory, ptr, 100);

        match read_length_prefixed(&store, &memory, ptr, LIMIT) {
            Err(PluginError::Memory(msg)) => assert!(msg.contains("Failed to read 100 bytes")),
            other => panic!("expected Memory error, got {:?}", other),
        }
    }

    #[test]
    fn test_out_of_bounds_header_is_error() {
        let (store, memory) = setup();
        assert!(matches!(
            read_length_prefixed(&store, &memory, -1, LIMIT),
            Err(PluginError::Memory(_))
        ));
    }

    #[test]
    fn test_out_of_bounds_write_is_error() {
        let (mut store, memory) = setup();
        assert!(matches!(
            write_bytes(&mut store, &memory, 65535, b"abc"),
            Err(PluginError::Memory(_))
        ));
    }
}
