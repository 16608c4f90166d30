// src/fs/mock.rs

use super::FileSystem;
use anyhow::{anyhow, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct MockState {
    files: BTreeMap<PathBuf, Vec<u8>>,
    dirs: BTreeSet<PathBuf>,
}

/// In-memory filesystem for tests.
///
/// Parent directories are created implicitly when a file is added.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    state: Arc<Mutex<MockState>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        let path = path.as_ref().to_path_buf();
        let mut state = self.state();
        if let Some(parent) = path.parent() {
            add_dir_chain(&mut state.dirs, parent);
        }
        state.files.insert(path, content.into());
    }

    pub fn remove_file(&self, path: impl AsRef<Path>) {
        self.state().files.remove(path.as_ref());
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn add_dir_chain(dirs: &mut BTreeSet<PathBuf>, dir: &Path) {
    for ancestor in dir.ancestors() {
        if ancestor.as_os_str().is_empty() {
            continue;
        }
        if !dirs.insert(ancestor.to_path_buf()) {
            break;
        }
    }
}

impl FileSystem for MockFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        let state = self.state();
        match state.files.get(path) {
            Some(content) => Ok(String::from_utf8_lossy(content).into_owned()),
            None if state.dirs.contains(path) => Err(anyhow!("Is a directory: {:?}", path)),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn read_ends(&self, path: &Path, limit: usize) -> Result<String> {
        let state = self.state();
        let Some(content) = state.files.get(path) else {
            return Err(anyhow!("File not found: {:?}", path));
        };
        if content.len() <= limit.saturating_mul(2) {
            return Ok(String::from_utf8_lossy(content).into_owned());
        }
        let mut bytes = content[..limit].to_vec();
        bytes.push(b'\n');
        bytes.extend_from_slice(&content[content.len() - limit..]);
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn is_file(&self, path: &Path) -> bool {
        self.state().files.contains_key(path)
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        let mut state = self.state();
        if state.files.contains_key(path) {
            return Err(anyhow!("File exists: {:?}", path));
        }
        add_dir_chain(&mut state.dirs, path);
        Ok(())
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let state = self.state();
        if !state.dirs.contains(path) {
            return Err(anyhow!("Not a directory or not found: {:?}", path));
        }
        let children = state
            .files
            .keys()
            .chain(state.dirs.iter())
            .filter(|p| p.parent() == Some(path))
            .cloned()
            .collect();
        Ok(children)
    }
}
