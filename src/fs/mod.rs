// src/fs/mod.rs

//! Filesystem access used when reading persisted job logs.
//!
//! The registry lists and reconstructs finished jobs through this trait so
//! those code paths can run against [`mock::MockFileSystem`] in tests. The
//! hot paths (the job writing its log, the tailer reading it) use the real
//! filesystem directly since they depend on OS notifications anyway.

use std::fmt::Debug;
use std::fs;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub mod mock;

/// Abstract filesystem interface.
pub trait FileSystem: Send + Sync + Debug {
    fn read_to_string(&self, path: &Path) -> Result<String>;

    /// Read at most `limit` bytes from each end of a file, joined by a
    /// newline. Small files are returned whole.
    fn read_ends(&self, path: &Path, limit: usize) -> Result<String>;

    fn is_file(&self, path: &Path) -> bool;
    fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Return the entries of a directory as full paths.
    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>>;
}

/// Implementation that uses `std::fs`.
#[derive(Debug, Clone, Default)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        // Process output is not guaranteed to be UTF-8.
        let bytes = fs::read(path).with_context(|| format!("reading file {:?}", path))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn read_ends(&self, path: &Path, limit: usize) -> Result<String> {
        let mut file = fs::File::open(path).with_context(|| format!("opening file {:?}", path))?;
        let len = file.metadata()?.len();
        let limit64 = limit as u64;

        let mut bytes = Vec::new();
        if len <= limit64.saturating_mul(2) {
            file.read_to_end(&mut bytes)
                .with_context(|| format!("reading file {:?}", path))?;
        } else {
            bytes.resize(limit, 0);
            file.read_exact(&mut bytes)
                .with_context(|| format!("reading head of {:?}", path))?;
            bytes.push(b'\n');
            let mut tail = vec![0u8; limit];
            file.seek(SeekFrom::End(-(limit64 as i64)))?;
            file.read_exact(&mut tail)
                .with_context(|| format!("reading tail of {:?}", path))?;
            bytes.extend_from_slice(&tail);
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path).with_context(|| format!("creating dir {:?}", path))
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(path).with_context(|| format!("reading dir {:?}", path))? {
            let entry = entry?;
            entries.push(entry.path());
        }
        Ok(entries)
    }
}
