// src/tail/tailer.rs

//! Incremental reader for a file another task keeps appending to.
//!
//! The tailer keeps a watermark (the file size it has delivered up to). On
//! every change signal it re-stats the path and, if the file grew, reads
//! the bytes between the watermark and the new size. Several writes that
//! land between two observations come out as one chunk, up to
//! [`MAX_CHUNK`] bytes; a larger backlog is split over consecutive reads.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::errors::{JobtailError, Result};
use crate::tail::source::{source_for, Change, ChangeSource};
use crate::types::ChangeSourceKind;

/// Largest chunk a single read delivers.
pub const MAX_CHUNK: usize = 1 << 20;

pub struct Tailer {
    path: PathBuf,
    file: Option<File>,
    source: Option<Box<dyn ChangeSource>>,
    watermark: u64,
    closed: CancellationToken,
}

/// Closes a [`Tailer`] from another task.
#[derive(Debug, Clone)]
pub struct TailCloser {
    token: CancellationToken,
}

impl TailCloser {
    pub fn close(&self) {
        self.token.cancel();
    }
}

impl Tailer {
    /// Open `path` and start delivering bytes appended from now on.
    pub async fn open(path: impl Into<PathBuf>, source: Box<dyn ChangeSource>) -> Result<Self> {
        let path = path.into();
        let size = current_size(&path).await?;
        Self::open_at(path, size, source).await
    }

    /// Open `path` with the watermark at `offset`; bytes past it are
    /// delivered by the first [`next`](Tailer::next). An offset beyond the
    /// end of the file is clamped to its current size.
    pub async fn open_at(
        path: impl Into<PathBuf>,
        offset: u64,
        source: Box<dyn ChangeSource>,
    ) -> Result<Self> {
        let path = path.into();
        let file = File::open(&path).await.map_err(|e| missing_or_io(&path, e))?;
        let size = file.metadata().await?.len();
        let watermark = offset.min(size);

        debug!(path = %path.display(), watermark, size, "tailer opened");

        Ok(Tailer {
            path,
            file: Some(file),
            source: Some(source),
            watermark,
            closed: CancellationToken::new(),
        })
    }

    /// Build the configured change source for `path`, then open a tailer on it.
    ///
    /// The watch is installed before the initial size is read, so no append
    /// can slip between the two.
    pub async fn open_with(
        path: impl Into<PathBuf>,
        offset: Option<u64>,
        kind: ChangeSourceKind,
        poll_interval: Duration,
    ) -> Result<Self> {
        let path = path.into();
        if tokio::fs::metadata(&path).await.is_err() {
            return Err(JobtailError::not_found(format!("log file {}", path.display())));
        }
        let source = source_for(kind, &path, poll_interval)?;
        match offset {
            Some(offset) => Self::open_at(path, offset, source).await,
            None => Self::open(path, source).await,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes delivered so far, counted from the start of the file.
    pub fn watermark(&self) -> u64 {
        self.watermark
    }

    pub fn closer(&self) -> TailCloser {
        TailCloser {
            token: self.closed.clone(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled() || self.source.is_none()
    }

    /// Wait for and return the next appended chunk.
    ///
    /// `Ok(None)` once the tailer is closed (or its change source ended).
    /// A removed file is a `NotFound` error. Transient stat or read failures
    /// are logged and retried on the next change.
    ///
    /// Cancel-safe: the watermark only moves after a chunk is fully read.
    pub async fn next(&mut self) -> Result<Option<Vec<u8>>> {
        let closed = self.closed.clone();
        loop {
            if self.is_closed() {
                self.release();
                return Ok(None);
            }

            if let Some(chunk) = self.read_delta().await? {
                return Ok(Some(chunk));
            }

            let Some(source) = self.source.as_mut() else {
                continue;
            };
            let change = tokio::select! {
                _ = closed.cancelled() => None,
                change = source.next_change() => change,
            };

            match change {
                Some(Change::Modified) => trace!(path = %self.path.display(), "change observed"),
                Some(Change::Removed) => debug!(path = %self.path.display(), "removal observed"),
                None => {
                    debug!(path = %self.path.display(), "tailer stopping");
                    self.release();
                    return Ok(None);
                }
            }
        }
    }

    /// Read what is past the watermark right now, without waiting. Returns
    /// at most [`MAX_CHUNK`] bytes; call again until it yields `None`.
    pub async fn drain(&mut self) -> Result<Option<Vec<u8>>> {
        if self.file.is_none() {
            return Ok(None);
        }
        self.read_delta().await
    }

    /// Release the watch and the file handle. Idempotent.
    pub fn close(&mut self) {
        self.closed.cancel();
        self.release();
    }

    fn release(&mut self) {
        if self.source.take().is_some() {
            debug!(path = %self.path.display(), watermark = self.watermark, "tailer closed");
        }
        self.file = None;
    }

    async fn read_delta(&mut self) -> Result<Option<Vec<u8>>> {
        let size = match tokio::fs::metadata(&self.path).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.release();
                return Err(JobtailError::not_found(format!(
                    "log file {} was removed",
                    self.path.display()
                )));
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "stat failed; will retry");
                return Ok(None);
            }
        };

        if size < self.watermark {
            warn!(
                path = %self.path.display(),
                watermark = self.watermark,
                size,
                "file shrank; resetting watermark"
            );
            self.watermark = size;
            return Ok(None);
        }
        if size == self.watermark {
            return Ok(None);
        }

        let Some(file) = self.file.as_mut() else {
            return Ok(None);
        };
        let start = self.watermark;
        let len = (size - start).min(MAX_CHUNK as u64);
        let mut buf = vec![0u8; len as usize];

        let read = async {
            file.seek(SeekFrom::Start(start)).await?;
            file.read_exact(&mut buf).await
        }
        .await;

        match read {
            Ok(_) => {
                self.watermark = start + len;
                trace!(
                    path = %self.path.display(),
                    bytes = buf.len(),
                    watermark = self.watermark,
                    size,
                    "delta read"
                );
                Ok(Some(buf))
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "read failed; will retry");
                Ok(None)
            }
        }
    }
}

impl std::fmt::Debug for Tailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tailer")
            .field("path", &self.path)
            .field("watermark", &self.watermark)
            .field("closed", &self.is_closed())
            .finish()
    }
}

async fn current_size(path: &Path) -> Result<u64> {
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|e| missing_or_io(path, e))?;
    Ok(meta.len())
}

fn missing_or_io(path: &Path, e: std::io::Error) -> JobtailError {
    if e.kind() == std::io::ErrorKind::NotFound {
        JobtailError::not_found(format!("log file {}", path.display()))
    } else {
        JobtailError::Io(e)
    }
}
