use std::env::consts::{DLL_EXTENSION, DLL_PREFIX};
use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};

use sigbench_module_sdk::{Figure, Invocation, ModuleExport};
use tracing::{info, warn};

use crate::error::{BackendError, LoadError};

/// A module instance ready to be invoked.
pub trait LoadedModule {
    fn invoke(&self, invocation: &Invocation<'_>, target: &mut Figure) -> Result<(), String>;
}

impl LoadedModule for ModuleExport {
    fn invoke(&self, invocation: &Invocation<'_>, target: &mut Figure) -> Result<(), String> {
        ModuleExport::invoke(self, invocation, target)
    }
}

/// Mechanism that turns a module file into a [`LoadedModule`].
pub trait ModuleBackend {
    /// Cheap test run before [`load`](Self::load) during discovery.
    fn precheck(&self, _path: &Path) -> Result<(), BackendError> {
        Ok(())
    }

    /// Load the current on-disk contents of `path`. Every call must yield a
    /// fresh instance; backends may not hand out a cached module.
    fn load(&self, path: &Path) -> Result<Box<dyn LoadedModule>, BackendError>;
}

/// Name under which a module file is listed: the file stem without the
/// platform library prefix (`libspectrum.so` becomes `spectrum`).
pub fn module_name(path: &Path) -> Option<String> {
    let stem = path.file_stem().and_then(OsStr::to_str)?;
    let name = match stem.strip_prefix(DLL_PREFIX) {
        Some(stripped) if !DLL_PREFIX.is_empty() && !stripped.is_empty() => stripped,
        _ => stem,
    };
    Some(name.to_string())
}

/// Whether `path` carries the platform's dynamic library extension.
pub fn is_module_file(path: &Path) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .map(|ext| ext.eq_ignore_ascii_case(DLL_EXTENSION))
        .unwrap_or(false)
}

/// The module currently driven by the scheduler.
pub struct ActiveModule {
    name: String,
    path: PathBuf,
    generation: u64,
    module: Box<dyn LoadedModule>,
}

impl ActiveModule {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Increases with every successful load, across modules.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn invoke(&self, invocation: &Invocation<'_>, target: &mut Figure) -> Result<(), String> {
        self.module.invoke(invocation, target)
    }
}

impl fmt::Debug for ActiveModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveModule")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("generation", &self.generation)
            .finish()
    }
}

/// Loads modules by name out of the module directory and owns the active
/// one.
pub struct ModuleLoader {
    backend: Box<dyn ModuleBackend>,
    dir: PathBuf,
    active: Option<ActiveModule>,
    generation: u64,
    last_error: Option<String>,
}

impl ModuleLoader {
    pub fn new(backend: Box<dyn ModuleBackend>, dir: impl Into<PathBuf>) -> Self {
        Self {
            backend,
            dir: dir.into(),
            active: None,
            generation: 0,
            last_error: None,
        }
    }

    pub fn backend(&self) -> &dyn ModuleBackend {
        self.backend.as_ref()
    }

    /// Load `name` from disk and make it the active module.
    ///
    /// The previous module is dropped only once the new one is fully loaded.
    /// On failure the previous module stays active and untouched.
    pub fn load_or_reload(&mut self, name: &str) -> Result<&ActiveModule, LoadError> {
        let loaded = self
            .resolve(name)
            .and_then(|path| self.backend.load(&path).map(|module| (path, module)));
        match loaded {
            Ok((path, module)) => {
                self.generation += 1;
                info!(
                    "loaded module `{name}` from {} (generation {})",
                    path.display(),
                    self.generation
                );
                self.last_error = None;
                let active = self.active.insert(ActiveModule {
                    name: name.to_string(),
                    path,
                    generation: self.generation,
                    module,
                });
                Ok(&*active)
            }
            Err(cause) => {
                let err = LoadError {
                    name: name.to_string(),
                    cause,
                };
                warn!("{err}");
                self.last_error = Some(err.to_string());
                Err(err)
            }
        }
    }

    pub fn active(&self) -> Option<&ActiveModule> {
        self.active.as_ref()
    }

    /// Message of the latest failed load, cleared by the next success.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn resolve(&self, name: &str) -> Result<PathBuf, BackendError> {
        let prefixed = self.dir.join(format!("{DLL_PREFIX}{name}.{DLL_EXTENSION}"));
        let plain = self.dir.join(format!("{name}.{DLL_EXTENSION}"));
        [prefixed, plain]
            .into_iter()
            .find(|path| path.is_file())
            .ok_or_else(|| BackendError::MissingBinary(self.dir.join(name)))
    }
}

impl fmt::Debug for ModuleLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleLoader")
            .field("dir", &self.dir)
            .field("active", &self.active)
            .field("generation", &self.generation)
            .finish()
    }
}
