use std::fs;
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use libloading::{Library, Symbol};
use sigbench_module_sdk::{
    EntryPoint, Figure, Invocation, ModuleExport, ABI_VERSION, ABI_VERSION_SYMBOL, ENTRY_SYMBOL,
};
use tempfile::{Builder, TempDir, TempPath};
use tracing::debug;

use crate::error::BackendError;
use crate::loader::{module_name, LoadedModule, ModuleBackend};

/// Loads modules from shared libraries with `libloading`.
///
/// The platform loader hands back the already mapped image when the same
/// path is opened twice, which would make reloading a no-op. Every load
/// therefore copies the library to a unique shadow file first and opens the
/// copy.
///
/// Libraries of unloaded modules are retired rather than closed: a module may
/// have started a playback job that still runs its code.
#[derive(Debug)]
pub struct DylibBackend {
    shadow_dir: TempDir,
    loads: AtomicU64,
    retired: Arc<Mutex<Retired>>,
}

impl DylibBackend {
    pub fn new() -> Result<Self, BackendError> {
        let shadow_dir = Builder::new().prefix("sigbench-modules-").tempdir()?;
        Ok(Self {
            shadow_dir,
            loads: AtomicU64::new(0),
            retired: Arc::default(),
        })
    }

    pub fn shadow_dir(&self) -> &Path {
        self.shadow_dir.path()
    }

    /// Number of libraries kept mapped after their module was dropped.
    pub fn retired(&self) -> usize {
        lock(&self.retired).0.len()
    }

    fn shadow_copy(&self, path: &Path) -> Result<TempPath, BackendError> {
        let name = module_name(path).unwrap_or_else(|| "module".to_string());
        let serial = self.loads.fetch_add(1, Ordering::SeqCst);
        let suffix = path
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();
        let shadow = Builder::new()
            .prefix(&format!("{name}-{serial}-"))
            .suffix(&suffix)
            .tempfile_in(self.shadow_dir.path())?
            .into_temp_path();
        fs::copy(path, &shadow)?;
        Ok(shadow)
    }
}

impl ModuleBackend for DylibBackend {
    /// The library must at least mention the entry symbol. Saves mapping
    /// arbitrary shared objects that happen to sit in the module directory.
    fn precheck(&self, path: &Path) -> Result<(), BackendError> {
        let bytes = fs::read(path)?;
        if contains(&bytes, ENTRY_SYMBOL.as_bytes()) {
            Ok(())
        } else {
            Err(BackendError::MissingSymbol {
                path: path.to_path_buf(),
                symbol: ENTRY_SYMBOL,
            })
        }
    }

    fn load(&self, path: &Path) -> Result<Box<dyn LoadedModule>, BackendError> {
        if !path.is_file() {
            return Err(BackendError::MissingBinary(path.to_path_buf()));
        }
        let shadow = self.shadow_copy(path)?;
        debug!("loading {} via {}", path.display(), shadow.display());

        let library = unsafe { Library::new(&*shadow) }?;
        let found = unsafe {
            let version: Symbol<*const u32> =
                library
                    .get(ABI_VERSION_SYMBOL.as_bytes())
                    .map_err(|_| BackendError::MissingSymbol {
                        path: path.to_path_buf(),
                        symbol: ABI_VERSION_SYMBOL,
                    })?;
            **version
        };
        if found != ABI_VERSION {
            return Err(BackendError::AbiMismatch {
                expected: ABI_VERSION,
                found,
            });
        }
        let entry: EntryPoint = unsafe {
            *library
                .get::<EntryPoint>(ENTRY_SYMBOL.as_bytes())
                .map_err(|_| BackendError::MissingSymbol {
                    path: path.to_path_buf(),
                    symbol: ENTRY_SYMBOL,
                })?
        };
        let export = unsafe { entry() }.map_err(BackendError::EntryFailed)?;

        Ok(Box::new(DylibModule {
            export,
            library: Some(library),
            retired: Arc::clone(&self.retired),
            _shadow: shadow,
            source: path.to_path_buf(),
        }))
    }
}

/// Libraries that are never closed, not even when the backend goes away.
#[derive(Debug, Default)]
struct Retired(Vec<Library>);

impl Drop for Retired {
    fn drop(&mut self) {
        for library in self.0.drain(..) {
            mem::forget(library);
        }
    }
}

fn lock(retired: &Mutex<Retired>) -> MutexGuard<'_, Retired> {
    retired.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A module living in a mapped library. The export holds code and vtables
/// from the library; on drop the library moves to the retired list before
/// the export is released, so it stays mapped.
struct DylibModule {
    export: ModuleExport,
    library: Option<Library>,
    retired: Arc<Mutex<Retired>>,
    _shadow: TempPath,
    source: PathBuf,
}

impl LoadedModule for DylibModule {
    fn invoke(&self, invocation: &Invocation<'_>, target: &mut Figure) -> Result<(), String> {
        self.export.invoke(invocation, target)
    }
}

impl Drop for DylibModule {
    fn drop(&mut self) {
        debug!("retiring module {}", self.source.display());
        if let Some(library) = self.library.take() {
            lock(&self.retired).0.push(library);
        }
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty() && haystack.windows(needle.len()).any(|window| window == needle)
}
