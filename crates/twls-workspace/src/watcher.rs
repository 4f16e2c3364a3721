//! File system watch backends.
//!
//! Two of the three backends live here: native OS notifications and a
//! debounced polling fallback. The third (client push) is driven by the
//! editor and only needs [`WatchEntrySet`](crate::WatchEntrySet) bookkeeping.
//! All of them deliver batches of [`FileChangeEvent`] into one channel.

use std::collections::HashMap;
use std::sync::mpsc as std_mpsc;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use anyhow::Context;
use anyhow::Result;
use camino::Utf8Path;
use camino::Utf8PathBuf;
use notify::Config;
use notify::Event;
use notify::EventKind;
use notify::PollWatcher;
use notify::RecommendedWatcher;
use notify::RecursiveMode;
use notify::Watcher;
use rustc_hash::FxHashSet;
use tokio::sync::mpsc;

use crate::paths::normalize_path;

/// A change must be quiet this long before the polling backend reports it.
pub const POLL_STABILITY_THRESHOLD: Duration = Duration::from_millis(100);
/// How often pending changes are checked against the stability threshold.
pub const POLL_STABILITY_CHECK: Duration = Duration::from_millis(20);
/// How often the polling backend rescans watched directory trees.
pub const POLL_SCAN_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum FileChangeKind {
    Created,
    Changed,
    Deleted,
}

/// A normalized change notification, whatever backend produced it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileChangeEvent {
    pub path: Utf8PathBuf,
    pub kind: FileChangeKind,
}

impl FileChangeEvent {
    #[must_use]
    pub fn new(path: impl Into<Utf8PathBuf>, kind: FileChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// Producer half of the change channel shared by every backend.
pub type EventSender = mpsc::UnboundedSender<Vec<FileChangeEvent>>;
pub type EventReceiver = mpsc::UnboundedReceiver<Vec<FileChangeEvent>>;

/// Convert a [`notify::Event`] into our event format, dropping paths under
/// any of `ignored`.
fn convert_notify_event(event: Event, ignored: &[Utf8PathBuf]) -> Vec<FileChangeEvent> {
    let kind = match event.kind {
        EventKind::Create(_) => FileChangeKind::Created,
        EventKind::Modify(_) => FileChangeKind::Changed,
        EventKind::Remove(_) => FileChangeKind::Deleted,
        _ => return Vec::new(),
    };

    event
        .paths
        .into_iter()
        .filter_map(|path| Utf8PathBuf::from_path_buf(path).ok())
        .map(|path| normalize_path(&path))
        .filter(|path| !ignored.iter().any(|dir| path.starts_with(dir)))
        .map(|path| FileChangeEvent::new(path, kind))
        .collect()
}

/// Native OS subscription (inotify, FSEvents, ReadDirectoryChangesW).
pub struct NativeWatcher {
    _watcher: RecommendedWatcher,
    root: Utf8PathBuf,
}

impl NativeWatcher {
    /// Start watching `root` recursively. Events under `ignored` are dropped
    /// before they reach `tx`.
    pub fn start(root: &Utf8Path, ignored: Vec<Utf8PathBuf>, tx: EventSender) -> Result<Self> {
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let batch = convert_notify_event(event, &ignored);
                    if !batch.is_empty() && tx.send(batch).is_err() {
                        tracing::debug!("event channel closed, dropping native event");
                    }
                }
                Err(err) => tracing::error!(error = %err, "native file watcher error"),
            },
            Config::default(),
        )
        .context("failed to create native file watcher")?;

        watcher
            .watch(root.as_std_path(), RecursiveMode::Recursive)
            .with_context(|| format!("failed to watch directory: {root}"))?;

        tracing::debug!(path = %root, "native file watcher started");

        Ok(Self {
            _watcher: watcher,
            root: root.to_path_buf(),
        })
    }

    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }
}

type PendingChanges = HashMap<Utf8PathBuf, (FileChangeKind, Instant)>;

/// Polling fallback with write-stability debouncing.
///
/// Files that exist when the watcher starts are taken as the baseline and
/// never reported; only later changes are. A path is reported once it has
/// been quiet for [`POLL_STABILITY_THRESHOLD`].
pub struct PollingWatcher {
    watcher: PollWatcher,
    directories: FxHashSet<Utf8PathBuf>,
    _handle: thread::JoinHandle<()>,
}

impl PollingWatcher {
    /// Start polling `root`. Changes under `ignored` are dropped before they
    /// are debounced.
    pub fn start(root: &Utf8Path, ignored: Vec<Utf8PathBuf>, tx: EventSender) -> Result<Self> {
        let (raw_tx, raw_rx) = std_mpsc::channel();

        let watcher = PollWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let _ = raw_tx.send(event);
                }
                Err(err) => tracing::error!(error = %err, "polling file watcher error"),
            },
            Config::default().with_poll_interval(POLL_SCAN_INTERVAL),
        )
        .context("failed to create polling file watcher")?;

        let handle = thread::spawn(move || {
            Self::process_events(&raw_rx, &tx, &ignored, POLL_STABILITY_THRESHOLD);
        });

        let mut this = Self {
            watcher,
            directories: FxHashSet::default(),
            _handle: handle,
        };
        this.add_directory(root)?;

        tracing::debug!(path = %root, "polling file watcher started");
        Ok(this)
    }

    /// Watch another directory tree. Returns `false` if it was already watched.
    pub fn add_directory(&mut self, dir: &Utf8Path) -> Result<bool> {
        let dir = normalize_path(dir);
        if self.directories.iter().any(|known| dir.starts_with(known)) {
            return Ok(false);
        }

        self.watcher
            .watch(dir.as_std_path(), RecursiveMode::Recursive)
            .with_context(|| format!("failed to poll directory: {dir}"))?;
        self.directories.insert(dir);
        Ok(true)
    }

    /// Background loop: coalesce raw events per path and flush each path once
    /// it has been stable for `threshold`.
    fn process_events(
        raw_rx: &std_mpsc::Receiver<Event>,
        tx: &EventSender,
        ignored: &[Utf8PathBuf],
        threshold: Duration,
    ) {
        let mut pending = PendingChanges::new();

        let record = |event: Event, pending: &mut PendingChanges| {
            for change in convert_notify_event(event, ignored) {
                // a file created and then written is still a creation
                let kind = match pending.get(&change.path) {
                    Some((FileChangeKind::Created, _)) if change.kind == FileChangeKind::Changed => {
                        FileChangeKind::Created
                    }
                    _ => change.kind,
                };
                pending.insert(change.path, (kind, Instant::now()));
            }
        };

        loop {
            match raw_rx.recv_timeout(POLL_STABILITY_CHECK) {
                Ok(event) => {
                    record(event, &mut pending);
                    while let Ok(event) = raw_rx.try_recv() {
                        record(event, &mut pending);
                    }
                }
                Err(std_mpsc::RecvTimeoutError::Timeout) => {}
                Err(std_mpsc::RecvTimeoutError::Disconnected) => break,
            }

            let stable: Vec<Utf8PathBuf> = pending
                .iter()
                .filter(|(_, (_, seen))| seen.elapsed() >= threshold)
                .map(|(path, _)| path.clone())
                .collect();

            if stable.is_empty() {
                continue;
            }

            let mut batch: Vec<FileChangeEvent> = stable
                .into_iter()
                .filter_map(|path| {
                    pending
                        .remove(&path)
                        .map(|(kind, _)| FileChangeEvent::new(path, kind))
                })
                .collect();
            batch.sort_by(|a, b| a.path.cmp(&b.path));

            if tx.send(batch).is_err() {
                break;
            }
        }
    }
}
