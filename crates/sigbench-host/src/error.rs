use std::path::PathBuf;

use thiserror::Error;

/// Failures raised by a [`ModuleBackend`](crate::ModuleBackend) while
/// touching a module binary.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("module binary not found at {0}")]
    MissingBinary(PathBuf),
    #[error("failed to load module library: {0}")]
    LibraryLoad(#[from] libloading::Error),
    #[error("{path} does not export `{symbol}`")]
    MissingSymbol { path: PathBuf, symbol: &'static str },
    #[error("module was built for ABI {found}, host expects {expected}")]
    AbiMismatch { expected: u32, found: u32 },
    #[error("module entry point failed: {0}")]
    EntryFailed(String),
    #[error("unsupported module: {0}")]
    Unsupported(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A candidate module that could not be added to the registry.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("{path} does not mention the `{symbol}` entry point")]
    Precheck { path: PathBuf, symbol: &'static str },
    #[error("{path} failed validation: {source}")]
    Rejected {
        path: PathBuf,
        #[source]
        source: BackendError,
    },
    #[error("{path} duplicates module name `{name}`")]
    DuplicateName { path: PathBuf, name: String },
}

/// Loading the selected module failed; the previous module stays active.
#[derive(Debug, Error)]
#[error("module `{name}` not loaded: {cause}")]
pub struct LoadError {
    pub name: String,
    #[source]
    pub cause: BackendError,
}

/// The active module failed while running.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("module `{module}` failed: {detail}")]
pub struct InvocationError {
    pub module: String,
    pub detail: String,
}

/// Session file could not be written or read.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("session I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("session encoding failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Host configuration file is present but unusable.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
