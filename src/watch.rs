//! Polling file watcher.
//!
//! A [`Watcher`] keeps a snapshot of `(size, mtime)` for every file its
//! selectors match and reports what changed since the last poll. After a
//! triggered build the caller re-baselines with [`Watcher::reset`], so files
//! the build itself wrote into the source tree (compiled stylesheets, the
//! sprite sheet) do not trigger another run.

use crate::selector::{SelectError, Selector};
use std::collections::BTreeMap;
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, SystemTime};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Select(#[from] SelectError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Stamp {
    len: u64,
    modified: Option<SystemTime>,
}

type Snapshot = BTreeMap<PathBuf, Stamp>;

/// Files that differ between two polls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Changes {
    pub added: Vec<PathBuf>,
    pub modified: Vec<PathBuf>,
    pub removed: Vec<PathBuf>,
}

impl Changes {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }

    pub fn len(&self) -> usize {
        self.added.len() + self.modified.len() + self.removed.len()
    }

    /// Every changed path, sorted.
    pub fn paths(&self) -> Vec<&PathBuf> {
        let mut all: Vec<_> = self
            .added
            .iter()
            .chain(&self.modified)
            .chain(&self.removed)
            .collect();
        all.sort();
        all
    }
}

pub struct Watcher {
    selectors: Vec<Selector>,
    snapshot: Snapshot,
}

impl Watcher {
    /// Start watching; the current state is the baseline.
    pub fn new(selectors: Vec<Selector>) -> Result<Self, WatchError> {
        let mut watcher = Self {
            selectors,
            snapshot: Snapshot::new(),
        };
        watcher.reset()?;
        Ok(watcher)
    }

    fn take_snapshot(&self) -> Result<Snapshot, WatchError> {
        let mut snapshot = Snapshot::new();
        for selector in &self.selectors {
            for file in selector.select()? {
                let meta = match std::fs::metadata(&file.path) {
                    Ok(m) => m,
                    // Deleted between the walk and the stat.
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                    Err(e) => return Err(e.into()),
                };
                snapshot.insert(
                    file.path,
                    Stamp {
                        len: meta.len(),
                        modified: meta.modified().ok(),
                    },
                );
            }
        }
        Ok(snapshot)
    }

    /// Compare against the previous poll and make the current state the new
    /// baseline.
    pub fn poll(&mut self) -> Result<Changes, WatchError> {
        let current = self.take_snapshot()?;
        let mut changes = Changes::default();
        for (path, stamp) in &current {
            match self.snapshot.get(path) {
                None => changes.added.push(path.clone()),
                Some(previous) if previous != stamp => changes.modified.push(path.clone()),
                Some(_) => {}
            }
        }
        changes.removed = self
            .snapshot
            .keys()
            .filter(|path| !current.contains_key(*path))
            .cloned()
            .collect();
        self.snapshot = current;
        Ok(changes)
    }

    /// Re-baseline without reporting anything.
    pub fn reset(&mut self) -> Result<(), WatchError> {
        self.snapshot = self.take_snapshot()?;
        Ok(())
    }
}

/// Poll `watchers` every `interval` until `on_change` breaks.
///
/// `on_change` receives the index of the watcher that saw changes. That
/// watcher is re-baselined after the callback returns.
pub fn watch<F>(
    watchers: &mut [Watcher],
    interval: Duration,
    mut on_change: F,
) -> Result<(), WatchError>
where
    F: FnMut(usize, &Changes) -> ControlFlow<()>,
{
    loop {
        thread::sleep(interval);
        for (index, watcher) in watchers.iter_mut().enumerate() {
            let changes = watcher.poll()?;
            if changes.is_empty() {
                continue;
            }
            tracing::debug!(watcher = index, changed = changes.len(), "change detected");
            if on_change(index, &changes).is_break() {
                return Ok(());
            }
            watcher.reset()?;
        }
    }
}
