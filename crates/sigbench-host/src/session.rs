use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sigbench_module_sdk::PARAM_MAX;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::PersistenceError;

/// Host window geometry in screen coordinates.
///
/// Stored on disk as `[x, y, width, height]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[i32; 4]", into = "[i32; 4]")]
pub struct WindowRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl WindowRect {
    /// Geometry used when no session has been persisted yet.
    pub const DEFAULT: Self = Self::new(100, 100, 600, 400);
    /// Geometry used when the persisted one is off-screen.
    pub const SAFE: Self = Self::new(0, 0, 600, 400);

    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> i32 {
        self.x.saturating_add(self.width)
    }

    pub fn bottom(&self) -> i32 {
        self.y.saturating_add(self.height)
    }

    /// Whether `other` lies entirely within `self`.
    pub fn contains(&self, other: &WindowRect) -> bool {
        other.width >= 0
            && other.height >= 0
            && other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }
}

impl Default for WindowRect {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl From<[i32; 4]> for WindowRect {
    fn from([x, y, width, height]: [i32; 4]) -> Self {
        Self::new(x, y, width, height)
    }
}

impl From<WindowRect> for [i32; 4] {
    fn from(rect: WindowRect) -> Self {
        [rect.x, rect.y, rect.width, rect.height]
    }
}

/// Everything the host restores on the next start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionState {
    pub selected_file_index: usize,
    pub param1: u8,
    pub param2: u8,
    pub window_rect: WindowRect,
    pub selected_module_index: usize,
}

impl SessionState {
    /// Reset indices that no longer point into their lists to `0`.
    pub fn clamp_to(&mut self, module_count: usize, file_count: usize) {
        if self.selected_module_index >= module_count {
            self.selected_module_index = 0;
        }
        if self.selected_file_index >= file_count {
            self.selected_file_index = 0;
        }
    }
}

/// On-disk layout. Every field is optional and unknown fields are ignored;
/// the key names of older session files are accepted as aliases.
#[derive(Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SessionFile {
    #[serde(alias = "fileIndex")]
    selected_file_index: i64,
    #[serde(alias = "val1")]
    param1: i64,
    #[serde(alias = "val2")]
    param2: i64,
    #[serde(alias = "WinRect")]
    window_rect: WindowRect,
    #[serde(alias = "scriptIndex")]
    selected_module_index: i64,
}

impl Default for SessionFile {
    fn default() -> Self {
        SessionState::default().into()
    }
}

impl From<SessionState> for SessionFile {
    fn from(state: SessionState) -> Self {
        Self {
            selected_file_index: state.selected_file_index as i64,
            param1: i64::from(state.param1),
            param2: i64::from(state.param2),
            window_rect: state.window_rect,
            selected_module_index: state.selected_module_index as i64,
        }
    }
}

impl From<SessionFile> for SessionState {
    fn from(file: SessionFile) -> Self {
        let index = |value: i64| usize::try_from(value).unwrap_or(0);
        let param = |value: i64| value.clamp(0, i64::from(PARAM_MAX)) as u8;
        Self {
            selected_file_index: index(file.selected_file_index),
            param1: param(file.param1),
            param2: param(file.param2),
            window_rect: file.window_rect,
            selected_module_index: index(file.selected_module_index),
        }
    }
}

/// Owner of the persisted [`SessionState`].
#[derive(Debug)]
pub struct SessionStore {
    path: PathBuf,
    state: SessionState,
}

impl SessionStore {
    /// Restore the session from `path`, falling back to defaults.
    pub fn open(path: impl Into<PathBuf>, display: Option<WindowRect>) -> Self {
        let path = path.into();
        let state = Self::load(&path, display);
        Self { path, state }
    }

    /// Read a session file. Never fails: a missing, unreadable or malformed
    /// file yields [`SessionState::default`]. When `display` is known, a
    /// window rectangle outside of it is replaced with [`WindowRect::SAFE`].
    pub fn load(path: &Path, display: Option<WindowRect>) -> SessionState {
        let mut state = match read_session_file(path) {
            Ok(file) => SessionState::from(file),
            Err(err) => {
                debug!("using default session ({}): {err}", path.display());
                SessionState::default()
            }
        };
        if let Some(area) = display {
            if !area.contains(&state.window_rect) {
                debug!(
                    "window {:?} outside display {:?}, using safe geometry",
                    state.window_rect, area
                );
                state.window_rect = WindowRect::SAFE;
            }
        }
        state
    }

    /// Write the session next to its final location and rename it into
    /// place, so an interrupted write leaves either the old file or a
    /// complete new one.
    pub fn save(&self) -> Result<(), PersistenceError> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)?;
        let mut file = NamedTempFile::new_in(&parent)?;
        serde_json::to_writer_pretty(&mut file, &SessionFile::from(self.state))?;
        file.write_all(b"\n")?;
        file.as_file().sync_all()?;
        file.persist(&self.path).map_err(|err| err.error)?;
        Ok(())
    }

    /// [`save`](Self::save), logging instead of returning failures.
    pub fn persist(&self) {
        if let Err(err) = self.save() {
            warn!("failed to save session to {}: {err}", self.path.display());
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Mutate the session and persist it.
    pub fn update(&mut self, change: impl FnOnce(&mut SessionState)) {
        let before = self.state;
        change(&mut self.state);
        if before != self.state {
            debug!("session changed: {:?}", self.state);
        }
        self.persist();
    }

    pub fn clamp_to(&mut self, module_count: usize, file_count: usize) {
        self.state.clamp_to(module_count, file_count);
    }
}

fn read_session_file(path: &Path) -> Result<SessionFile, PersistenceError> {
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}
