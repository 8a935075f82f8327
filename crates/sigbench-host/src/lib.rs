//! Module hosting core of Signal Workbench.
//!
//! The crate discovers processing modules in a directory, loads the selected
//! one (copying dynamic libraries aside so that a reload really re-reads the
//! file), decides when a parameter change warrants running it again, and
//! keeps the user's session on disk. Front-ends drive everything through
//! [`ModuleHost::handle`].

mod builtin;
mod config;
mod data_files;
mod dylib;
mod error;
mod host;
mod loader;
mod notify;
mod registry;
mod scheduler;
mod session;

pub use builtin::InProcessBackend;
pub use config::{config_dir, default_session_path, HostConfig};
pub use data_files::{DataFile, DataFiles};
pub use dylib::DylibBackend;
pub use error::{
    BackendError, ConfigError, DiscoveryError, InvocationError, LoadError, PersistenceError,
};
pub use host::{EventOutcome, HostEvent, ModuleHost};
pub use loader::{is_module_file, module_name, ActiveModule, LoadedModule, ModuleBackend, ModuleLoader};
pub use notify::{
    pin_to_corner, LogSurface, Notification, NotificationChannel, NotificationId,
    NotificationSurface,
};
pub use registry::{ModuleDescriptor, ModuleRegistry, Rejection};
pub use scheduler::{
    CommitOutcome, CommitRequest, InvocationFingerprint, ParamSlot, SchedulerState,
    UpdateScheduler,
};
pub use session::{SessionState, SessionStore, WindowRect};
