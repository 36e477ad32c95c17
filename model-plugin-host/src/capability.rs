//! Capability validation
//!
//! A freshly instantiated module is only trusted once every required export
//! resolves with the expected type. Resolution is all-or-nothing: the first
//! missing export fails the load.

use crate::error::{PluginError, Result};
use crate::stubs::HostState;
use model_plugin_api::{
    EXPORT_ALLOC, EXPORT_DEALLOC, EXPORT_INFO, EXPORT_MEMORY, EXPORT_ON_LOAD, EXPORT_ON_UNLOAD,
    EXPORT_RECOGNIZE,
};
use wasmtime::{Instance, Memory, Store, TypedFunc};

/// The validated export surface of one plugin instance
pub struct GuestExports {
    pub(crate) memory: Memory,
    alloc: TypedFunc<i32, i32>,
    dealloc: TypedFunc<(i32, i32), ()>,
    info: TypedFunc<(), i32>,
    recognize: TypedFunc<(i32, i32), i32>,
    on_load: Option<TypedFunc<(), ()>>,
    on_unload: Option<TypedFunc<(), ()>>,
}

/// Grant a fresh fuel budget before a guest call
pub(crate) fn refuel(store: &mut Store<HostState>, fuel: Option<u64>) -> anyhow::Result<()> {
    match fuel {
        Some(fuel) => store.set_fuel(fuel),
        None => Ok(()),
    }
}

fn required<P, R>(
    store: &mut Store<HostState>,
    instance: &Instance,
    name: &'static str,
) -> Result<TypedFunc<P, R>>
where
    P: wasmtime::WasmParams,
    R: wasmtime::WasmResults,
{
    instance
        .get_typed_func::<P, R>(&mut *store, name)
        .map_err(|_| PluginError::MissingExport(name.to_string()))
}

fn optional_hook(
    store: &mut Store<HostState>,
    instance: &Instance,
    name: &'static str,
) -> Option<TypedFunc<(), ()>> {
    instance.get_export(&mut *store, name)?;
    match instance.get_typed_func::<(), ()>(&mut *store, name) {
        Ok(hook) => Some(hook),
        Err(e) => {
            tracing::warn!(export = name, error = %e, "Ignoring lifecycle hook with unexpected signature");
            None
        }
    }
}

impl GuestExports {
    /// Resolve the required exports in the order the ABI lists them
    pub fn resolve(store: &mut Store<HostState>, instance: &Instance) -> Result<Self> {
        let memory = instance
            .get_memory(&mut *store, EXPORT_MEMORY)
            .ok_or_else(|| PluginError::MissingExport(EXPORT_MEMORY.to_string()))?;
        let alloc = required::<i32, i32>(store, instance, EXPORT_ALLOC)?;
        let dealloc = required::<(i32, i32), ()>(store, instance, EXPORT_DEALLOC)?;
        let info = required::<(), i32>(store, instance, EXPORT_INFO)?;
        let recognize = required::<(i32, i32), i32>(store, instance, EXPORT_RECOGNIZE)?;

        Ok(Self {
            memory,
            alloc,
            dealloc,
            info,
            recognize,
            on_load: optional_hook(store, instance, EXPORT_ON_LOAD),
            on_unload: optional_hook(store, instance, EXPORT_ON_UNLOAD),
        })
    }

    pub fn has_on_load(&self) -> bool {
        self.on_load.is_some()
    }

    pub fn has_on_unload(&self) -> bool {
        self.on_unload.is_some()
    }

    pub(crate) fn alloc(&self, store: &mut Store<HostState>, fuel: Option<u64>, size: i32) -> Result<i32> {
        refuel(store, fuel).map_err(|e| PluginError::invocation(EXPORT_ALLOC, e))?;
        self.alloc
            .call(&mut *store, size)
            .map_err(|e| PluginError::invocation(EXPORT_ALLOC, e))
    }

    pub(crate) fn dealloc(
        &self,
        store: &mut Store<HostState>,
        fuel: Option<u64>,
        ptr: i32,
        size: i32,
    ) -> Result<()> {
        refuel(store, fuel).map_err(|e| PluginError::invocation(EXPORT_DEALLOC, e))?;
        self.dealloc
            .call(&mut *store, (ptr, size))
            .map_err(|e| PluginError::invocation(EXPORT_DEALLOC, e))
    }

    pub(crate) fn info(&self, store: &mut Store<HostState>, fuel: Option<u64>) -> Result<i32> {
        refuel(store, fuel).map_err(|e| PluginError::invocation(EXPORT_INFO, e))?;
        self.info
            .call(&mut *store, ())
            .map_err(|e| PluginError::invocation(EXPORT_INFO, e))
    }

    pub(crate) fn recognize(
        &self,
        store: &mut Store<HostState>,
        fuel: Option<u64>,
        ptr: i32,
        len: i32,
    ) -> Result<i32> {
        refuel(store, fuel).map_err(|e| PluginError::invocation(EXPORT_RECOGNIZE, e))?;
        self.recognize
            .call(&mut *store, (ptr, len))
            .map_err(|e| PluginError::invocation(EXPORT_RECOGNIZE, e))
    }

    /// Run `on_load` if the guest exports it
    pub(crate) fn on_load(&self, store: &mut Store<HostState>, fuel: Option<u64>) -> Result<()> {
        let Some(hook) = &self.on_load else {
            return Ok(());
        };
        refuel(store, fuel).map_err(|e| PluginError::invocation(EXPORT_ON_LOAD, e))?;
        hook.call(&mut *store, ())
            .map_err(|e| PluginError::invocation(EXPORT_ON_LOAD, e))
    }

    /// Run `on_unload` if the guest exports it
    pub(crate) fn on_unload(&self, store: &mut Store<HostState>, fuel: Option<u64>) -> Result<()> {
        let Some(hook) = &self.on_unload else {
            return Ok(());
        };
        refuel(store, fuel).map_err(|e| PluginError::invocation(EXPORT_ON_UNLOAD, e))?;
        hook.call(&mut *store, ())
            .map_err(|e| PluginError::invocation(EXPORT_ON_UNLOAD, e))
    }
}
