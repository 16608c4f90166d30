// src/tail/source.rs

//! Where a tailer's "the file may have changed" signals come from.
//!
//! [`NotifySource`] turns OS filesystem notifications into [`Change`]s;
//! [`PollSource`] simply ticks. The tailer re-stats the file on every
//! change either way, so both give identical delivery semantics.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::time::Duration;

use notify::event::EventKind;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, warn};

use crate::errors::{JobtailError, Result};
use crate::types::ChangeSourceKind;

/// Bursts beyond this many pending notifications are coalesced.
const NOTIFY_BUFFER: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Modified,
    Removed,
}

/// Stream of change signals for one file.
pub trait ChangeSource: Send {
    /// Wait for the next change. `None` means the source has shut down.
    ///
    /// Must be cancel-safe: dropping the future loses no signal that a later
    /// call would not also observe.
    fn next_change(&mut self) -> Pin<Box<dyn Future<Output = Option<Change>> + Send + '_>>;
}

/// Change source backed by the `notify` crate.
///
/// Dropping it releases the OS watch.
pub struct NotifySource {
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<Change>,
}

impl NotifySource {
    pub fn watch(path: &Path) -> Result<Self> {
        let (tx, rx) = mpsc::channel::<Change>(NOTIFY_BUFFER);

        // Called synchronously on notify's thread.
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let change = match event.kind {
                        EventKind::Remove(_) => Change::Removed,
                        EventKind::Modify(_) | EventKind::Create(_) => Change::Modified,
                        _ => return,
                    };
                    // A full buffer already guarantees a pending re-stat.
                    let _ = tx.try_send(change);
                }
                Err(err) => warn!(error = %err, "file watch error"),
            },
            Config::default(),
        )
        .map_err(watch_error)?;

        watcher
            .watch(path, RecursiveMode::NonRecursive)
            .map_err(watch_error)?;

        debug!(path = %path.display(), "watching file for changes");

        Ok(NotifySource {
            _watcher: watcher,
            rx,
        })
    }
}

impl ChangeSource for NotifySource {
    fn next_change(&mut self) -> Pin<Box<dyn Future<Output = Option<Change>> + Send + '_>> {
        Box::pin(async move {
            let mut change = self.rx.recv().await?;
            // Collapse whatever else queued up into one observation.
            while let Ok(more) = self.rx.try_recv() {
                if more == Change::Removed {
                    change = Change::Removed;
                }
            }
            Some(change)
        })
    }
}

fn watch_error(err: notify::Error) -> JobtailError {
    let missing = match &err.kind {
        notify::ErrorKind::PathNotFound => true,
        notify::ErrorKind::Io(io) => io.kind() == std::io::ErrorKind::NotFound,
        _ => false,
    };
    if missing {
        JobtailError::not_found(format!("watch target: {err}"))
    } else {
        JobtailError::Other(anyhow::Error::new(err))
    }
}

/// Change source that fires on a fixed interval.
pub struct PollSource {
    interval: Interval,
}

impl PollSource {
    pub fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        PollSource { interval }
    }
}

impl ChangeSource for PollSource {
    fn next_change(&mut self) -> Pin<Box<dyn Future<Output = Option<Change>> + Send + '_>> {
        Box::pin(async move {
            self.interval.tick().await;
            Some(Change::Modified)
        })
    }
}

/// Build the configured kind of change source for `path`.
pub fn source_for(
    kind: ChangeSourceKind,
    path: &Path,
    poll_interval: Duration,
) -> Result<Box<dyn ChangeSource>> {
    match kind {
        ChangeSourceKind::Notify => Ok(Box::new(NotifySource::watch(path)?)),
        ChangeSourceKind::Poll => Ok(Box::new(PollSource::new(poll_interval))),
    }
}
