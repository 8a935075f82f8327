#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::env::consts::DLL_EXTENSION;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use anyhow::bail;
use sigbench_host::{
    DataFile, DataFiles, InProcessBackend, ModuleHost, ModuleLoader, ModuleRegistry,
    Notification, NotificationChannel, NotificationId, NotificationSurface, SessionStore,
};
use sigbench_module_sdk::{Figure, PlaybackHandle, ProcessingModule};
use tempfile::TempDir;

pub type CallLog = Arc<Mutex<Vec<Call>>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub module: String,
    pub param1: u8,
    pub param2: u8,
    pub data_file: String,
}

impl Call {
    pub fn new(module: &str, param1: u8, param2: u8, data_file: &str) -> Self {
        Self {
            module: module.to_string(),
            param1,
            param2,
            data_file: data_file.to_string(),
        }
    }
}

/// Records every invocation and fails when `param1` hits `fail_at`.
struct Recorder {
    name: String,
    version: u32,
    fail_at: Option<u8>,
    calls: CallLog,
}

impl ProcessingModule for Recorder {
    fn run(
        &self,
        param1: u8,
        param2: u8,
        target: &mut Figure,
        data_file: &str,
        _playback: Option<&PlaybackHandle>,
    ) -> anyhow::Result<()> {
        self.calls
            .lock()
            .expect("call log")
            .push(Call::new(&self.name, param1, param2, data_file));
        target.clear();
        target.set_title(format!("{} v{}", self.name, self.version));
        target
            .add_panel("signal")
            .plot("p", [0.0, 1.0], [f32::from(param1), f32::from(param2)]);
        if self.fail_at == Some(param1) {
            bail!("{} cannot handle {param1}", self.name);
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct Screen {
    pub open: Vec<NotificationId>,
    pub shown: Vec<Notification>,
}

struct RecordingSurface(Rc<RefCell<Screen>>);

impl NotificationSurface for RecordingSurface {
    fn show(&mut self, notification: &Notification) {
        let mut screen = self.0.borrow_mut();
        screen.open.push(notification.id);
        screen.shown.push(notification.clone());
    }

    fn close(&mut self, id: NotificationId) {
        self.0.borrow_mut().open.retain(|open| *open != id);
    }
}

/// A module directory, a session file and fake modules, all under one
/// temporary directory.
pub struct Workbench {
    pub root: TempDir,
    pub calls: CallLog,
    pub screen: Rc<RefCell<Screen>>,
    /// Bumped to simulate editing a module on disk.
    pub version: Rc<Cell<u32>>,
    /// When set, loading any module fails.
    pub broken: Rc<Cell<bool>>,
    pub fail_at: Option<u8>,
}

impl Workbench {
    pub fn new() -> Self {
        Self {
            root: tempfile::tempdir().expect("tempdir"),
            calls: Arc::default(),
            screen: Rc::default(),
            version: Rc::new(Cell::new(1)),
            broken: Rc::default(),
            fail_at: None,
        }
    }

    pub fn session_path(&self) -> PathBuf {
        self.root.path().join("session.json")
    }

    pub fn modules_dir(&self) -> PathBuf {
        self.root.path().join("modules")
    }

    pub fn write_session(&self, json: &str) {
        fs::write(self.session_path(), json).expect("write session");
    }

    pub fn saved_session(&self) -> sigbench_host::SessionState {
        SessionStore::load(&self.session_path(), None)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().expect("call log").clone()
    }

    pub fn backend(&self, modules: &[&str]) -> InProcessBackend {
        let dir = self.modules_dir();
        fs::create_dir_all(&dir).expect("modules dir");
        let mut backend = InProcessBackend::new();
        for &name in modules {
            touch(&dir, &format!("{name}.{DLL_EXTENSION}"));
            let calls = Arc::clone(&self.calls);
            let version = Rc::clone(&self.version);
            let broken = Rc::clone(&self.broken);
            let fail_at = self.fail_at;
            let module_name = name.to_string();
            backend.register(name, move || {
                if broken.get() {
                    bail!("{module_name}: invalid syntax");
                }
                Ok(Box::new(Recorder {
                    name: module_name.clone(),
                    version: version.get(),
                    fail_at,
                    calls: Arc::clone(&calls),
                }))
            });
        }
        backend
    }

    pub fn host(&self, modules: &[&str], files: &[&str]) -> ModuleHost {
        let backend = self.backend(modules);
        let registry = ModuleRegistry::scan_excluding(&self.modules_dir(), &backend, None);
        let loader = ModuleLoader::new(Box::new(backend), self.modules_dir());
        let data_files = DataFiles::from_files(
            files
                .iter()
                .map(|name| DataFile {
                    name: name.to_string(),
                    path: PathBuf::from(name),
                })
                .collect(),
        );
        let session = SessionStore::open(self.session_path(), None);
        let notifications = NotificationChannel::new(
            Box::new(RecordingSurface(Rc::clone(&self.screen))),
            session.state().window_rect,
            (320, 90),
        );
        ModuleHost::new(session, registry, loader, data_files, notifications, false)
    }
}

pub fn touch(dir: &Path, file: &str) -> PathBuf {
    let path = dir.join(file);
    fs::write(&path, b"").expect("touch");
    path
}
