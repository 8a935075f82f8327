use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// An input file offered to modules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFile {
    /// Label shown to the user, also the sort key.
    pub name: String,
    pub path: PathBuf,
}

impl DataFile {
    /// String handed to modules. Files from the working directory are passed
    /// by bare name, everything else by its joined path.
    pub fn argument(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }
}

/// Sorted, de-duplicated list of data files, built once at startup.
#[derive(Debug, Clone, Default)]
pub struct DataFiles {
    files: Vec<DataFile>,
}

impl DataFiles {
    /// Collect files with one of `extensions` (case-insensitive, no dot)
    /// from each of `dirs`. The first directory is created when missing.
    pub fn scan(dirs: &[PathBuf], extensions: &[String]) -> Self {
        if let Some(first) = dirs.first() {
            if !first.exists() {
                match fs::create_dir_all(first) {
                    Ok(()) => debug!("created data directory {}", first.display()),
                    Err(err) => warn!("could not create {}: {err}", first.display()),
                }
            }
        }

        let mut found = BTreeMap::new();
        for dir in dirs {
            let entries = match fs::read_dir(dir) {
                Ok(entries) => entries,
                Err(err) => {
                    debug!("skipping data directory {}: {err}", dir.display());
                    continue;
                }
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if !path.is_file() || !has_extension(&path, extensions) {
                    continue;
                }
                let Some(file_name) = path.file_name().map(PathBuf::from) else {
                    continue;
                };
                let path = if is_current_dir(dir) {
                    file_name
                } else {
                    dir.join(file_name)
                };
                let name = path.to_string_lossy().replace('\\', "/");
                found.entry(name.clone()).or_insert(DataFile { name, path });
            }
        }
        Self {
            files: found.into_values().collect(),
        }
    }

    pub fn from_files(mut files: Vec<DataFile>) -> Self {
        files.sort_by(|a, b| a.name.cmp(&b.name));
        files.dedup_by(|a, b| a.name == b.name);
        Self { files }
    }

    pub fn get(&self, index: usize) -> Option<&DataFile> {
        self.files.get(index)
    }

    pub fn files(&self) -> &[DataFile] {
        &self.files
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(|file| file.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .map(|ext| extensions.iter().any(|want| want.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

fn is_current_dir(dir: &Path) -> bool {
    dir.as_os_str().is_empty() || dir == Path::new(".")
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    use super::*;

    fn extensions() -> Vec<String> {
        vec!["wav".into(), "ogg".into(), "mp3".into()]
    }

    #[test]
    fn scan_filters_sorts_and_creates_first_dir() {
        let root = tempdir().unwrap();
        let sound = root.path().join("Sound");
        let other = root.path().join("other");
        fs::create_dir(&other).unwrap();
        fs::write(other.join("b.WAV"), b"").unwrap();
        fs::write(other.join("a.mp3"), b"").unwrap();
        fs::write(other.join("notes.txt"), b"").unwrap();
        fs::create_dir(other.join("dir.wav")).unwrap();

        let files = DataFiles::scan(&[sound.clone(), other.clone()], &extensions());
        assert!(sound.is_dir());
        let names: Vec<_> = files.files().iter().map(|f| f.path.clone()).collect();
        assert_eq!(names, vec![other.join("a.mp3"), other.join("b.WAV")]);
        assert_eq!(files.get(1).unwrap().argument(), other.join("b.WAV").to_string_lossy());
    }

    #[test]
    fn scanning_a_directory_twice_deduplicates() {
        let root = tempdir().unwrap();
        fs::write(root.path().join("tone.ogg"), b"").unwrap();
        let dirs = vec![root.path().to_path_buf(), root.path().to_path_buf()];
        let files = DataFiles::scan(&dirs, &extensions());
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn current_dir_files_use_bare_names() {
        assert!(is_current_dir(Path::new(".")));
        assert!(!is_current_dir(Path::new("Sound")));
    }

    #[test]
    fn from_files_sorts_and_dedups() {
        let file = |name: &str| DataFile {
            name: name.to_string(),
            path: PathBuf::from(name),
        };
        let files = DataFiles::from_files(vec![file("b.wav"), file("a.wav"), file("b.wav")]);
        assert_eq!(files.names().collect::<Vec<_>>(), vec!["a.wav", "b.wav"]);
        assert!(DataFiles::default().is_empty());
    }
}
