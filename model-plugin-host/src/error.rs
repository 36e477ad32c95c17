//! Error taxonomy for plugin loading and dispatch
//!
//! Every way a guest module can misbehave maps to exactly one
//! [`PluginError`] variant. The set is closed: callers can match it
//! exhaustively.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use wasmtime::Trap;

/// Errors produced while loading a plugin or calling into it
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("Failed to decode Wasm module: {0}")]
    ModuleDecode(#[source] anyhow::Error),

    #[error("Failed to instantiate Wasm module: {0}")]
    Instantiation(#[source] anyhow::Error),

    #[error("Required export not found: {0}")]
    MissingExport(String),

    #[error("Error invoking '{function}': {source}")]
    Invocation {
        function: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("Memory operation failed: {0}")]
    Memory(String),

    #[error("Failed to parse plugin descriptor: {0}")]
    DescriptorParse(String),

    #[error("Plugin with id '{0}' is already loaded")]
    DuplicatePlugin(String),
}

/// Field-less discriminant of [`PluginError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ModuleDecode,
    Instantiation,
    MissingExport,
    Invocation,
    Memory,
    DescriptorParse,
    DuplicatePlugin,
}

impl PluginError {
    /// Wrap a failed guest call, flagging fuel exhaustion
    pub(crate) fn invocation(function: &'static str, source: anyhow::Error) -> Self {
        let out_of_fuel = source
            .downcast_ref::<Trap>()
            .is_some_and(|t| *t == Trap::OutOfFuel);
        let source = if out_of_fuel {
            source.context("fuel exhausted (instruction budget exceeded)")
        } else {
            source
        };
        Self::Invocation { function, source }
    }

    /// Which stage produced this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ModuleDecode(_) => ErrorKind::ModuleDecode,
            Self::Instantiation(_) => ErrorKind::Instantiation,
            Self::MissingExport(_) => ErrorKind::MissingExport,
            Self::Invocation { .. } => ErrorKind::Invocation,
            Self::Memory(_) => ErrorKind::Memory,
            Self::DescriptorParse(_) => ErrorKind::DescriptorParse,
            Self::DuplicatePlugin(_) => ErrorKind::DuplicatePlugin,
        }
    }

    /// True for errors that can only happen while loading
    pub fn is_load_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::ModuleDecode
                | ErrorKind::Instantiation
                | ErrorKind::MissingExport
                | ErrorKind::DescriptorParse
                | ErrorKind::DuplicatePlugin
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ModuleDecode => "module_decode",
            Self::Instantiation => "instantiation",
            Self::MissingExport => "missing_export",
            Self::Invocation => "invocation",
            Self::Memory => "memory",
            Self::DescriptorParse => "descriptor_parse",
            Self::DuplicatePlugin => "duplicate_plugin",
        };
        f.write_str(name)
    }
}

pub type Result<T, E = PluginError> = std::result::Result<T, E>;

/// Errors raised while building an engine from an [`EngineConfig`](crate::EngineConfig)
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("max_payload_len must be greater than zero")]
    InvalidPayloadLimit,

    #[error("max_stack_size must be greater than zero")]
    InvalidStackSize,

    #[error("Engine creation failed: {0}")]
    Engine(#[source] anyhow::Error),
}

/// Errors from [`SharedPluginEngine::load_file`](crate::SharedPluginEngine::load_file)
#[derive(Debug, Error)]
pub enum LoadFileError {
    #[error("Failed to read plugin file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Plugin(#[from] PluginError),
}
