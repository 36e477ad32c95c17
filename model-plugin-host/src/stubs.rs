//! Import stub table
//!
//! A fixed set of `wasi_snapshot_preview1` functions so that modules built
//! for a WASI target still instantiate inside the sandbox. None of them
//! touches the host: there is no real I/O, clock, randomness, environment
//! or process control behind this table.
//!
//! | Import | Behavior |
//! |--------|----------|
//! | `fd_write` | discards output, reports every byte as written |
//! | `fd_read` | reports end of input (0 bytes) |
//! | `fd_close`, `fd_seek`, `fd_fdstat_get` | success |
//! | `fd_prestat_get`, `fd_prestat_dir_name` | `EBADF` (no preopened directories) |
//! | `clock_time_get` | timestamp 0 |
//! | `random_get` | fills the buffer with zeros |
//! | `environ_*`, `args_*` | empty |
//! | `proc_exit` | returns nothing |
//!
//! Out-pointers are written through the guest's own bounds-checked memory.
//! A bad pointer yields `EFAULT` instead of a trap.

use wasmtime::{AsContextMut, Caller, Extern, Linker, Memory};

/// Import module namespace served by the stub table
pub const WASI_MODULE: &str = "wasi_snapshot_preview1";

/// Every import name the table provides
pub const STUB_IMPORTS: [&str; 14] = [
    "fd_write",
    "fd_read",
    "fd_close",
    "fd_seek",
    "fd_fdstat_get",
    "fd_prestat_get",
    "fd_prestat_dir_name",
    "clock_time_get",
    "random_get",
    "environ_sizes_get",
    "environ_get",
    "args_sizes_get",
    "args_get",
    "proc_exit",
];

const ERRNO_SUCCESS: i32 = 0;
const ERRNO_BADF: i32 = 8;
const ERRNO_FAULT: i32 = 21;

/// Per-instance store state
#[derive(Debug, Default)]
pub struct HostState {
    stub_calls: u64,
}

impl HostState {
    /// Number of stub imports the guest has called so far
    pub fn stub_calls(&self) -> u64 {
        self.stub_calls
    }
}

fn record(caller: &mut Caller<'_, HostState>, name: &'static str) {
    caller.data_mut().stub_calls += 1;
    tracing::trace!(import = name, "Guest called import stub");
}

fn guest_memory(caller: &mut Caller<'_, HostState>) -> Option<Memory> {
    caller.get_export("memory").and_then(Extern::into_memory)
}

/// Write `bytes` at `ptr` in the caller's memory, mapping failure to an errno
fn store_bytes(caller: &mut Caller<'_, HostState>, ptr: i32, bytes: &[u8]) -> i32 {
    let Some(memory) = guest_memory(caller) else {
        return ERRNO_FAULT;
    };
    match memory.write(caller.as_context_mut(), ptr as u32 as usize, bytes) {
        Ok(()) => ERRNO_SUCCESS,
        Err(_) => ERRNO_FAULT,
    }
}

/// Zero `len` guest bytes at `ptr` in place; the span is checked before
/// anything is touched
fn zero_fill(caller: &mut Caller<'_, HostState>, ptr: i32, len: i32) -> i32 {
    let Some(memory) = guest_memory(caller) else {
        return ERRNO_FAULT;
    };
    let start = ptr as u32 as usize;
    let Some(end) = start.checked_add(len as u32 as usize) else {
        return ERRNO_FAULT;
    };
    match memory.data_mut(caller.as_context_mut()).get_mut(start..end) {
        Some(span) => {
            span.fill(0);
            ERRNO_SUCCESS
        }
        None => ERRNO_FAULT,
    }
}

/// Zero two u32 out-parameters (the `*_sizes_get` shape)
fn store_empty_sizes(caller: &mut Caller<'_, HostState>, count_ptr: i32, size_ptr: i32) -> i32 {
    match store_bytes(caller, count_ptr, &0u32.to_le_bytes()) {
        ERRNO_SUCCESS => store_bytes(caller, size_ptr, &0u32.to_le_bytes()),
        errno => errno,
    }
}

/// Sum the lengths of an iovec array
fn iovec_total(caller: &mut Caller<'_, HostState>, iovs: i32, iovs_len: i32) -> Option<u32> {
    let memory = guest_memory(caller)?;
    let mut total: u32 = 0;
    for i in 0..iovs_len.max(0) as u32 {
        let entry = (iovs as u32).checked_add(i.checked_mul(8)?)?;
        let mut len = [0u8; 4];
        memory
            .read(caller.as_context_mut(), entry as usize + 4, &mut len)
            .ok()?;
        total = total.saturating_add(u32::from_le_bytes(len));
    }
    Some(total)
}

/// Register the stub table on `linker`
pub fn add_to_linker(linker: &mut Linker<HostState>) -> anyhow::Result<()> {
    linker.func_wrap(
        WASI_MODULE,
        "fd_write",
        |mut caller: Caller<'_, HostState>, _fd: i32, iovs: i32, iovs_len: i32, nwritten: i32| -> i32 {
            record(&mut caller, "fd_write");
            match iovec_total(&mut caller, iovs, iovs_len) {
                Some(total) => store_bytes(&mut caller, nwritten, &total.to_le_bytes()),
                None => ERRNO_FAULT,
            }
        },
    )?;

    linker.func_wrap(
        WASI_MODULE,
        "fd_read",
        |mut caller: Caller<'_, HostState>, _fd: i32, _iovs: i32, _iovs_len: i32, nread: i32| -> i32 {
            record(&mut caller, "fd_read");
            store_bytes(&mut caller, nread, &0u32.to_le_bytes())
        },
    )?;

    linker.func_wrap(
        WASI_MODULE,
        "fd_close",
        |mut caller: Caller<'_, HostState>, _fd: i32| -> i32 {
            record(&mut caller, "fd_close");
            ERRNO_SUCCESS
        },
    )?;

    linker.func_wrap(
        WASI_MODULE,
        "fd_seek",
        |mut caller: Caller<'_, HostState>, _fd: i32, _offset: i64, _whence: i32, _newoffset: i32| -> i32 {
            record(&mut caller, "fd_seek");
            ERRNO_SUCCESS
        },
    )?;

    linker.func_wrap(
        WASI_MODULE,
        "fd_fdstat_get",
        |mut caller: Caller<'_, HostState>, _fd: i32, _stat: i32| -> i32 {
            record(&mut caller, "fd_fdstat_get");
            ERRNO_SUCCESS
        },
    )?;

    linker.func_wrap(
        WASI_MODULE,
        "fd_prestat_get",
        |mut caller: Caller<'_, HostState>, _fd: i32, _prestat: i32| -> i32 {
            record(&mut caller, "fd_prestat_get");
            ERRNO_BADF
        },
    )?;

    linker.func_wrap(
        WASI_MODULE,
        "fd_prestat_dir_name",
        |mut caller: Caller<'_, HostState>, _fd: i32, _path: i32, _path_len: i32| -> i32 {
            record(&mut caller, "fd_prestat_dir_name");
            ERRNO_BADF
        },
    )?;

    linker.func_wrap(
        WASI_MODULE,
        "clock_time_get",
        |mut caller: Caller<'_, HostState>, _clock_id: i32, _precision: i64, time: i32| -> i32 {
            record(&mut caller, "clock_time_get");
            store_bytes(&mut caller, time, &0u64.to_le_bytes())
        },
    )?;

    linker.func_wrap(
        WASI_MODULE,
        "random_get",
        |mut caller: Caller<'_, HostState>, buf: i32, buf_len: i32| -> i32 {
            record(&mut caller, "random_get");
            zero_fill(&mut caller, buf, buf_len)
        },
    )?;

    linker.func_wrap(
        WASI_MODULE,
        "environ_sizes_get",
        |mut caller: Caller<'_, HostState>, count: i32, size: i32| -> i32 {
            record(&mut caller, "environ_sizes_get");
            store_empty_sizes(&mut caller, count, size)
        },
    )?;

    linker.func_wrap(
        WASI_MODULE,
        "environ_get",
        |mut caller: Caller<'_, HostState>, _environ: i32, _environ_buf: i32| -> i32 {
            record(&mut caller, "environ_get");
            ERRNO_SUCCESS
        },
    )?;

    linker.func_wrap(
        WASI_MODULE,
        "args_sizes_get",
        |mut caller: Caller<'_, HostState>, count: i32, size: i32| -> i32 {
            record(&mut caller, "args_sizes_get");
            store_empty_sizes(&mut caller, count, size)
        },
    )?;

    linker.func_wrap(
        WASI_MODULE,
        "args_get",
        |mut caller: Caller<'_, HostState>, _argv: i32, _argv_buf: i32| -> i32 {
            record(&mut caller, "args_get");
            ERRNO_SUCCESS
        },
    )?;

    linker.func_wrap(
        WASI_MODULE,
        "proc_exit",
        |mut caller: Caller<'_, HostState>, code: i32| {
            record(&mut caller, "proc_exit");
            tracing::debug!(code, "Guest requested proc_exit, ignored");
        },
    )?;

    Ok(())
}
