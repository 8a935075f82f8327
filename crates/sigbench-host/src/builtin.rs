use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;

use sigbench_module_sdk::{panic_message, ModuleExport, ProcessingModule};

use crate::error::BackendError;
use crate::loader::{module_name, LoadedModule, ModuleBackend};

type Factory = Box<dyn Fn() -> anyhow::Result<Box<dyn ProcessingModule>>>;

/// Backend for modules compiled into the host binary.
///
/// Module files still have to exist in the module directory so that the
/// registry lists them; their contents are ignored and the factory
/// registered under the file's [`module_name`] is called instead. Each load
/// calls the factory again, so reloads produce a fresh instance.
#[derive(Default)]
pub struct InProcessBackend {
    factories: HashMap<String, Factory>,
}

impl InProcessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> anyhow::Result<Box<dyn ProcessingModule>> + 'static,
    {
        self.factories.insert(name.into(), Box::new(factory));
        self
    }

    fn factory(&self, path: &Path) -> Result<&Factory, BackendError> {
        let name = module_name(path).ok_or_else(|| BackendError::MissingBinary(path.into()))?;
        self.factories
            .get(&name)
            .ok_or_else(|| BackendError::Unsupported(format!("no built-in module named `{name}`")))
    }
}

impl ModuleBackend for InProcessBackend {
    fn precheck(&self, path: &Path) -> Result<(), BackendError> {
        self.factory(path).map(|_| ())
    }

    fn load(&self, path: &Path) -> Result<Box<dyn LoadedModule>, BackendError> {
        if !path.is_file() {
            return Err(BackendError::MissingBinary(path.to_path_buf()));
        }
        let factory = self.factory(path)?;
        let module = match catch_unwind(AssertUnwindSafe(factory)) {
            Ok(Ok(module)) => module,
            Ok(Err(err)) => return Err(BackendError::Unsupported(format!("{err:#}"))),
            Err(payload) => {
                return Err(BackendError::Unsupported(format!(
                    "module constructor panicked: {}",
                    panic_message(payload.as_ref())
                )))
            }
        };
        Ok(Box::new(ModuleExport::new(module)))
    }
}

impl fmt::Debug for InProcessBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.factories.keys().collect();
        names.sort();
        f.debug_struct("InProcessBackend")
            .field("modules", &names)
            .finish()
    }
}
