use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use sigbench_module_sdk::ENTRY_SYMBOL;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{BackendError, DiscoveryError};
use crate::loader::{is_module_file, module_name, ModuleBackend};

/// A module file found in the module directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDescriptor {
    pub name: String,
    pub path: PathBuf,
    pub is_valid: bool,
}

impl ModuleDescriptor {
    fn candidate(path: PathBuf) -> Option<Self> {
        Some(Self {
            name: module_name(&path)?,
            path,
            is_valid: false,
        })
    }
}

/// A candidate that was kept out of the selectable list.
#[derive(Debug)]
pub struct Rejection {
    pub descriptor: ModuleDescriptor,
    pub error: DiscoveryError,
}

/// Ordered list of modules the user can pick from.
///
/// Built once at startup. Selecting a module by index always refers to this
/// list; there is no rescanning afterwards.
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    modules: Vec<ModuleDescriptor>,
    rejected: Vec<Rejection>,
}

impl ModuleRegistry {
    /// Scan `dir` for module libraries, skipping the running executable.
    pub fn scan(dir: &Path, backend: &dyn ModuleBackend) -> Self {
        let host = env::current_exe().ok();
        Self::scan_excluding(dir, backend, host.as_deref())
    }

    /// Scan `dir` (not recursively) in file-name order. Each candidate is
    /// prechecked, then loaded once to prove it exports a usable entry
    /// point. Failing candidates are logged and recorded in
    /// [`rejected`](Self::rejected); the scan itself never fails.
    pub fn scan_excluding(dir: &Path, backend: &dyn ModuleBackend, exclude: Option<&Path>) -> Self {
        let mut registry = Self::default();
        if !dir.is_dir() {
            warn!("module directory {} does not exist", dir.display());
            return registry;
        }
        let exclude = exclude.and_then(|path| fs::canonicalize(path).ok());
        let mut names = HashSet::new();

        let walker = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    debug!("skipping entry while scanning {}: {err}", dir.display());
                    continue;
                }
            };
            let path = entry.path();
            if !entry.file_type().is_file() || !is_module_file(path) {
                continue;
            }
            if exclude.is_some() && fs::canonicalize(path).ok() == exclude {
                continue;
            }
            let Some(mut descriptor) = ModuleDescriptor::candidate(path.to_path_buf()) else {
                continue;
            };

            match validate(&descriptor, backend, &names) {
                Ok(()) => {
                    descriptor.is_valid = true;
                    names.insert(descriptor.name.clone());
                    info!("found module `{}` at {}", descriptor.name, path.display());
                    registry.modules.push(descriptor);
                }
                Err(error) => {
                    warn!("module candidate skipped: {error}");
                    registry.rejected.push(Rejection { descriptor, error });
                }
            }
        }
        registry
    }

    pub fn modules(&self) -> &[ModuleDescriptor] {
        &self.modules
    }

    pub fn rejected(&self) -> &[Rejection] {
        &self.rejected
    }

    pub fn get(&self, index: usize) -> Option<&ModuleDescriptor> {
        self.modules.get(index)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.modules.iter().position(|module| module.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.modules.iter().map(|module| module.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

fn validate(
    descriptor: &ModuleDescriptor,
    backend: &dyn ModuleBackend,
    names: &HashSet<String>,
) -> Result<(), DiscoveryError> {
    let path = &descriptor.path;
    if names.contains(&descriptor.name) {
        return Err(DiscoveryError::DuplicateName {
            path: path.clone(),
            name: descriptor.name.clone(),
        });
    }
    backend.precheck(path).map_err(|err| match err {
        BackendError::MissingSymbol { symbol, .. } => DiscoveryError::Precheck {
            path: path.clone(),
            symbol,
        },
        source => DiscoveryError::Rejected {
            path: path.clone(),
            source,
        },
    })?;
    backend
        .load(path)
        .map(drop)
        .map_err(|source| DiscoveryError::Rejected {
            path: path.clone(),
            source,
        })?;
    debug!("{} exports `{ENTRY_SYMBOL}`", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::env::consts::DLL_EXTENSION;

    use anyhow::bail;
    use pretty_assertions::assert_eq;
    use sigbench_module_sdk::{Figure, PlaybackHandle, ProcessingModule};
    use tempfile::tempdir;

    use super::*;
    use crate::builtin::InProcessBackend;

    struct Blank;

    impl ProcessingModule for Blank {
        fn run(
            &self,
            _param1: u8,
            _param2: u8,
            target: &mut Figure,
            _data_file: &str,
            _playback: Option<&PlaybackHandle>,
        ) -> anyhow::Result<()> {
            target.clear();
            Ok(())
        }
    }

    fn touch(dir: &Path, file: &str) -> PathBuf {
        let path = dir.join(file);
        fs::write(&path, b"").unwrap();
        path
    }

    #[test]
    fn scan_keeps_valid_modules_in_name_order() {
        let dir = tempdir().unwrap();
        touch(dir.path(), &format!("algoB.{DLL_EXTENSION}"));
        touch(dir.path(), &format!("algoA.{DLL_EXTENSION}"));
        touch(dir.path(), &format!("broken.{DLL_EXTENSION}"));
        touch(dir.path(), &format!("unknown.{DLL_EXTENSION}"));
        touch(dir.path(), "notes.txt");

        let mut backend = InProcessBackend::new();
        backend.register("algoA", || Ok(Box::new(Blank)));
        backend.register("algoB", || Ok(Box::new(Blank)));
        backend.register("broken", || bail!("import failed: missing numpy"));

        let registry = ModuleRegistry::scan_excluding(dir.path(), &backend, None);
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["algoA", "algoB"]);
        assert!(registry.modules().iter().all(|module| module.is_valid));
        assert_eq!(registry.position("algoB"), Some(1));

        let rejected: Vec<_> = registry
            .rejected()
            .iter()
            .map(|rejection| rejection.descriptor.name.as_str())
            .collect();
        assert_eq!(rejected, vec!["broken", "unknown"]);
        assert!(matches!(
            registry.rejected()[0].error,
            DiscoveryError::Rejected { .. }
        ));
        assert!(registry.rejected().iter().all(|r| !r.descriptor.is_valid));
    }

    #[test]
    fn failing_candidates_do_not_abort_scan() {
        let dir = tempdir().unwrap();
        touch(dir.path(), &format!("algoA.{DLL_EXTENSION}"));
        touch(dir.path(), &format!("algoB.{DLL_EXTENSION}"));
        touch(dir.path(), &format!("algoC.{DLL_EXTENSION}"));
        let mut backend = InProcessBackend::new();
        backend.register("algoA", || bail!("exception during import"));
        backend.register("algoB", || panic!("constructor blew up"));
        backend.register("algoC", || Ok(Box::new(Blank)));

        let registry = ModuleRegistry::scan_excluding(dir.path(), &backend, None);
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["algoC"]);
        assert_eq!(registry.rejected().len(), 2);
        assert!(registry.rejected()[1]
            .error
            .to_string()
            .contains("constructor blew up"));
    }

    #[test]
    fn host_executable_is_excluded() {
        let dir = tempdir().unwrap();
        let host = touch(dir.path(), &format!("algoA.{DLL_EXTENSION}"));
        touch(dir.path(), &format!("algoB.{DLL_EXTENSION}"));
        let mut backend = InProcessBackend::new();
        backend.register("algoA", || Ok(Box::new(Blank)));
        backend.register("algoB", || Ok(Box::new(Blank)));

        let registry = ModuleRegistry::scan_excluding(dir.path(), &backend, Some(&host));
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["algoB"]);
        assert!(registry.rejected().is_empty());
    }

    #[test]
    fn missing_directory_gives_empty_registry() {
        let dir = tempdir().unwrap();
        let registry = ModuleRegistry::scan(&dir.path().join("nope"), &InProcessBackend::new());
        assert!(registry.is_empty());
        assert_eq!(registry.get(0), None);
    }
}
