use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::session::WindowRect;

const APP_DIR_NAME: &str = "sigbench";
const SESSION_FILE: &str = "session.json";
const FALLBACK_SESSION_FILE: &str = "sigbench-session.json";

/// Per-user configuration directory, if the platform has one.
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join(APP_DIR_NAME))
}

/// Where the session is persisted when nothing else is configured.
pub fn default_session_path() -> PathBuf {
    config_dir()
        .map(|dir| dir.join(SESSION_FILE))
        .unwrap_or_else(|| PathBuf::from(FALLBACK_SESSION_FILE))
}

/// Startup configuration of the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Directory scanned once at startup for module libraries.
    pub modules_dir: PathBuf,
    /// Directories offering data files. The first one is created if missing.
    pub data_dirs: Vec<PathBuf>,
    /// File extensions (without dot) offered as data files.
    pub data_extensions: Vec<String>,
    pub session_file: PathBuf,
    /// Hand modules a playback handle.
    pub playback: bool,
    /// Width and height reserved for the error notification.
    pub notification_size: (u32, u32),
    /// Usable screen area as `[x, y, width, height]`. A restored window
    /// outside of it is moved back on screen.
    pub display: Option<WindowRect>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            modules_dir: PathBuf::from("modules"),
            data_dirs: vec![PathBuf::from("Sound"), PathBuf::from(".")],
            data_extensions: vec!["wav".into(), "ogg".into(), "mp3".into()],
            session_file: default_session_path(),
            playback: true,
            notification_size: (360, 120),
            display: None,
        }
    }
}

impl HostConfig {
    /// Read a JSON config file. A missing file gives the defaults; a file that
    /// exists but cannot be read or parsed is an error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Location of the optional config file in the user config directory.
    pub fn default_path() -> Option<PathBuf> {
        config_dir().map(|dir| dir.join("config.json"))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn missing_config_uses_defaults() {
        let dir = tempdir().unwrap();
        let config = HostConfig::load(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, HostConfig::default());
    }

    #[test]
    fn partial_config_overrides_fields() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"modules_dir": "/opt/modules", "data_extensions": ["flac"], "playback": false}"#,
        )
        .unwrap();
        let config = HostConfig::load(&path).unwrap();
        assert_eq!(config.modules_dir, PathBuf::from("/opt/modules"));
        assert_eq!(config.data_extensions, vec!["flac".to_string()]);
        assert!(!config.playback);
        assert_eq!(config.data_dirs, HostConfig::default().data_dirs);
    }

    #[test]
    fn display_area_is_read_as_rectangle() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"display": [0, 0, 1920, 1080]}"#).unwrap();
        let config = HostConfig::load(&path).unwrap();
        assert_eq!(config.display, Some(WindowRect::new(0, 0, 1920, 1080)));
        assert_eq!(HostConfig::default().display, None);
    }

    #[test]
    fn malformed_config_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "modules_dir = 'toml?'").unwrap();
        assert!(matches!(
            HostConfig::load(&path),
            Err(ConfigError::Parse { .. })
        ));
    }
}
