use crossbeam_channel::Receiver;
use sigbench_module_sdk::{Figure, PlaybackEvent, PlaybackHandle, PARAM_MAX};
use tracing::{debug, info, warn};

use crate::config::HostConfig;
use crate::data_files::{DataFile, DataFiles};
use crate::error::{InvocationError, LoadError};
use crate::loader::{ActiveModule, ModuleBackend, ModuleLoader};
use crate::notify::{NotificationChannel, NotificationSurface};
use crate::registry::ModuleRegistry;
use crate::scheduler::{CommitOutcome, CommitRequest, ParamSlot, UpdateScheduler};
use crate::session::{SessionState, SessionStore, WindowRect};

/// Everything a front-end can tell the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostEvent {
    /// Slider moved while held down.
    ParamDragged { slot: ParamSlot, value: u8 },
    /// Slider let go.
    ParamReleased { slot: ParamSlot, value: u8 },
    /// Discrete change (keyboard step, typed value).
    ParamStepped { slot: ParamSlot, value: u8 },
    ModuleSelected(usize),
    FileSelected(usize),
    /// Re-read the selected module from disk.
    Reload,
    /// Run again even though nothing changed.
    ForceRetry,
    WindowChanged(WindowRect),
    Shutdown,
}

/// What handling an event amounted to.
#[derive(Debug)]
pub enum EventOutcome {
    /// No module invocation took place.
    Idle,
    Invoked(Result<(), InvocationError>),
    /// Loading the selected module failed; the previous one stays active.
    LoadFailed(LoadError),
}

impl EventOutcome {
    pub fn invoked(&self) -> bool {
        matches!(self, EventOutcome::Invoked(_))
    }
}

/// The interactive host: one owner for every piece of mutable state, one
/// transition function ([`handle`](Self::handle)) driving it.
pub struct ModuleHost {
    session: SessionStore,
    registry: ModuleRegistry,
    loader: ModuleLoader,
    scheduler: UpdateScheduler,
    notifications: NotificationChannel,
    data_files: DataFiles,
    figure: Figure,
    playback: Option<PlaybackHandle>,
    playback_events: Option<Receiver<PlaybackEvent>>,
}

impl ModuleHost {
    /// Assemble a host from already built parts. Persisted indices are
    /// clamped into the module and file lists.
    pub fn new(
        mut session: SessionStore,
        registry: ModuleRegistry,
        loader: ModuleLoader,
        data_files: DataFiles,
        notifications: NotificationChannel,
        playback: bool,
    ) -> Self {
        session.clamp_to(registry.len(), data_files.len());
        let state = *session.state();
        let scheduler = UpdateScheduler::new(state.param1, state.param2);
        let (playback, playback_events) = if playback {
            let (handle, events) = PlaybackHandle::channel();
            (Some(handle), Some(events))
        } else {
            (None, None)
        };
        Self {
            session,
            registry,
            loader,
            scheduler,
            notifications,
            data_files,
            figure: Figure::new(),
            playback,
            playback_events,
        }
    }

    /// Restore the session, scan modules and data files as configured.
    pub fn from_config(
        config: &HostConfig,
        backend: Box<dyn ModuleBackend>,
        surface: Box<dyn NotificationSurface>,
        display: Option<WindowRect>,
    ) -> Self {
        let session = SessionStore::open(&config.session_file, display);
        let registry = ModuleRegistry::scan(&config.modules_dir, backend.as_ref());
        let loader = ModuleLoader::new(backend, &config.modules_dir);
        let data_files = DataFiles::scan(&config.data_dirs, &config.data_extensions);
        info!(
            "{} module(s), {} data file(s)",
            registry.len(),
            data_files.len()
        );
        let notifications = NotificationChannel::new(
            surface,
            session.state().window_rect,
            config.notification_size,
        );
        Self::new(
            session,
            registry,
            loader,
            data_files,
            notifications,
            config.playback,
        )
    }

    /// Load the selected module and run it once with the restored state.
    pub fn start(&mut self) -> EventOutcome {
        self.load_selected()
    }

    pub fn handle(&mut self, event: HostEvent) -> EventOutcome {
        debug!("event {event:?}");
        match event {
            HostEvent::ParamDragged { slot, value } => {
                self.scheduler.drag(slot, value);
                EventOutcome::Idle
            }
            HostEvent::ParamReleased { slot, value } | HostEvent::ParamStepped { slot, value } => {
                let value = value.min(PARAM_MAX);
                self.scheduler.drag(slot, value);
                self.session.update(|state| match slot {
                    ParamSlot::First => state.param1 = value,
                    ParamSlot::Second => state.param2 = value,
                });
                self.commit()
            }
            HostEvent::ModuleSelected(index) => {
                let index = if index < self.registry.len() { index } else { 0 };
                if self.is_active(index) {
                    return self.commit();
                }
                self.session
                    .update(|state| state.selected_module_index = index);
                self.load_selected()
            }
            HostEvent::FileSelected(index) => {
                let index = if index < self.data_files.len() { index } else { 0 };
                self.session.update(|state| state.selected_file_index = index);
                self.commit()
            }
            HostEvent::Reload => {
                self.session.persist();
                self.load_selected()
            }
            HostEvent::ForceRetry => {
                self.scheduler.invalidate();
                self.commit()
            }
            HostEvent::WindowChanged(rect) => {
                self.session.update(|state| state.window_rect = rect);
                self.notifications.set_anchor(rect);
                EventOutcome::Idle
            }
            HostEvent::Shutdown => {
                self.session.persist();
                self.notifications.dismiss();
                EventOutcome::Idle
            }
        }
    }

    /// Rerun the active module with the current inputs, ignoring the record
    /// of the last invocation.
    pub fn force_retry(&mut self) -> EventOutcome {
        self.handle(HostEvent::ForceRetry)
    }

    /// Log and return playback events that arrived since the last call.
    pub fn drain_playback(&mut self) -> Vec<PlaybackEvent> {
        let Some(events) = &self.playback_events else {
            return Vec::new();
        };
        let drained: Vec<_> = events.try_iter().collect();
        for event in &drained {
            match event {
                PlaybackEvent::Started { label } => debug!("playback `{label}` started"),
                PlaybackEvent::Finished { label } => info!("playback `{label}` finished"),
                PlaybackEvent::Failed { label, message } => {
                    warn!("playback `{label}` failed: {message}")
                }
            }
        }
        drained
    }

    pub fn state(&self) -> &SessionState {
        self.session.state()
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    pub fn data_files(&self) -> &DataFiles {
        &self.data_files
    }

    pub fn selected_file(&self) -> Option<&DataFile> {
        self.data_files.get(self.state().selected_file_index)
    }

    pub fn active_module(&self) -> Option<&ActiveModule> {
        self.loader.active()
    }

    pub fn loader(&self) -> &ModuleLoader {
        &self.loader
    }

    pub fn scheduler(&self) -> &UpdateScheduler {
        &self.scheduler
    }

    pub fn notifications(&self) -> &NotificationChannel {
        &self.notifications
    }

    pub fn figure(&self) -> &Figure {
        &self.figure
    }

    /// Parameter value as currently displayed, drag position included.
    pub fn displayed(&self, slot: ParamSlot) -> u8 {
        self.scheduler.displayed(slot)
    }

    /// Whether `index` is the selected module and that module is loaded.
    fn is_active(&self, index: usize) -> bool {
        let selected = index == self.state().selected_module_index;
        let loaded = match (self.registry.get(index), self.loader.active()) {
            (Some(entry), Some(active)) => entry.name == active.name(),
            _ => false,
        };
        selected && loaded
    }

    fn load_selected(&mut self) -> EventOutcome {
        let index = self.state().selected_module_index;
        let Some(name) = self.registry.get(index).map(|module| module.name.clone()) else {
            debug!("no module to load");
            return self.commit();
        };
        match self.loader.load_or_reload(&name) {
            Ok(_) => {
                self.scheduler.invalidate();
                self.commit()
            }
            Err(err) => EventOutcome::LoadFailed(err),
        }
    }

    fn commit(&mut self) -> EventOutcome {
        let state = *self.session.state();
        let data_file = self
            .data_files
            .get(state.selected_file_index)
            .map(DataFile::argument);
        let outcome = self.scheduler.commit(
            CommitRequest {
                module: self.loader.active(),
                param1: state.param1,
                param2: state.param2,
                data_file: data_file.as_deref(),
            },
            &mut self.figure,
            self.playback.as_ref(),
        );
        match outcome {
            CommitOutcome::NothingToInvoke | CommitOutcome::Unchanged => EventOutcome::Idle,
            CommitOutcome::Invoked(result) => {
                if let Err(err) = &result {
                    self.notifications.notify(err.to_string());
                }
                EventOutcome::Invoked(result)
            }
        }
    }
}

impl std::fmt::Debug for ModuleHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleHost")
            .field("session", &self.session)
            .field("registry", &self.registry)
            .field("loader", &self.loader)
            .field("scheduler", &self.scheduler)
            .field("data_files", &self.data_files)
            .finish()
    }
}
