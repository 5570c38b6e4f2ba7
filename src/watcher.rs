//! Platform backend adapter and the per-watch worker.
//!
//! The notify callback does nothing but translate events and forward them
//! into a channel. The worker thread owns the [`Tree`] and is the only place
//! it is ever mutated, so reconciliation for one root is serialized.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::config::WatchSettings;
use crate::core::{
    apply_notification, discover, discover_and_process_file_changes, AcceptAll, ChangeEvent,
    ChangeSubscriber, FileInfo, Filter, NoScanHook, RawNotification, ScanHook, ScanOptions, Tree,
};
use crate::error::{MonitorError, Result};
use crate::registry::WatchHandle;

/// How a root is watched.
#[derive(Clone)]
pub struct WatchOptions {
    pub recursive: bool,
    pub filter: Arc<dyn Filter>,
    pub hook: Arc<dyn ScanHook>,
    /// Rescan and diff the whole root this often, on top of notifications.
    pub resync_interval: Option<Duration>,
    /// Whether the initial batch starts with an Added event for the root.
    pub include_root_event: bool,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            recursive: true,
            filter: Arc::new(AcceptAll),
            hook: Arc::new(NoScanHook),
            resync_interval: None,
            include_root_event: true,
        }
    }
}

impl WatchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_settings(settings: &WatchSettings) -> Self {
        Self::default()
            .recursive(settings.recursive)
            .with_resync_interval(settings.resync_interval())
            .include_root_event(settings.include_root_event)
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn with_filter(mut self, filter: impl Filter + 'static) -> Self {
        self.filter = Arc::new(filter);
        self
    }

    pub fn with_hook(mut self, hook: impl ScanHook + 'static) -> Self {
        self.hook = Arc::new(hook);
        self
    }

    pub fn with_resync_interval(mut self, interval: Option<Duration>) -> Self {
        self.resync_interval = interval;
        self
    }

    pub fn include_root_event(mut self, include: bool) -> Self {
        self.include_root_event = include;
        self
    }
}

impl fmt::Debug for WatchOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchOptions")
            .field("recursive", &self.recursive)
            .field("resync_interval", &self.resync_interval)
            .field("include_root_event", &self.include_root_event)
            .finish_non_exhaustive()
    }
}

/// Messages a worker receives.
pub(crate) enum Inbound {
    Notification(RawNotification),
    Resync,
    BackendError(notify::Error),
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WorkerExit {
    /// Initial discovery failed; nothing was ever reported.
    NotStarted,
    Stopped,
    Failed,
}

/// Maps one notify event onto path-level notifications.
pub fn translate_event(event: &Event) -> Vec<RawNotification> {
    let paths = &event.paths;
    match &event.kind {
        EventKind::Create(_) => paths.iter().map(RawNotification::appeared).collect(),
        EventKind::Remove(_) => paths.iter().map(RawNotification::disappeared).collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            paths.iter().map(RawNotification::disappeared).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            paths.iter().map(RawNotification::appeared).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut out = Vec::with_capacity(2);
            if let Some(from) = paths.first() {
                out.push(RawNotification::disappeared(from));
            }
            if let Some(to) = paths.get(1) {
                out.push(RawNotification::appeared(to));
            }
            out
        }
        EventKind::Modify(ModifyKind::Name(_)) => paths
            .iter()
            .map(|path| {
                if path.symlink_metadata().is_ok() {
                    RawNotification::appeared(path)
                } else {
                    RawNotification::disappeared(path)
                }
            })
            .collect(),
        EventKind::Modify(_) | EventKind::Any => paths.iter().map(RawNotification::changed).collect(),
        EventKind::Access(_) | EventKind::Other => Vec::new(),
    }
}

/// Starts the platform watcher for `root`, forwarding into `sender`.
pub(crate) fn start_backend(
    root: &Path,
    recursive: bool,
    sender: Sender<Inbound>,
) -> Result<RecommendedWatcher> {
    let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
        let messages = match result {
            Ok(event) if event.need_rescan() => vec![Inbound::Resync],
            Ok(event) => translate_event(&event)
                .into_iter()
                .map(Inbound::Notification)
                .collect(),
            Err(err) => vec![Inbound::BackendError(err)],
        };
        for message in messages {
            if sender.send(message).is_err() {
                break; // Worker gone, watch is stopping
            }
        }
    })?;

    let mode = if recursive {
        RecursiveMode::Recursive
    } else {
        RecursiveMode::NonRecursive
    };
    watcher.watch(root, mode)?;
    Ok(watcher)
}

/// Everything one watch's worker thread owns.
pub(crate) struct WatchWorker {
    pub handle: WatchHandle,
    pub root: PathBuf,
    pub options: WatchOptions,
    pub subscriber: Box<dyn ChangeSubscriber>,
    pub inbound: Receiver<Inbound>,
    pub stopped: Arc<AtomicBool>,
}

impl WatchWorker {
    /// Discovers the root, reports the outcome on `ready`, then reconciles
    /// notifications until stopped or the root becomes unusable.
    pub fn run(self, ready: Sender<Result<()>>) -> WorkerExit {
        let WatchWorker {
            handle,
            root,
            options,
            mut subscriber,
            inbound,
            stopped,
        } = self;

        let hook = StopAwareHook {
            inner: options.hook.as_ref(),
            stopped: &stopped,
        };
        let scan = ScanOptions::new(options.recursive, options.filter.as_ref(), &hook);

        let discovery = match discover(&root, &scan) {
            Ok(discovery) => discovery,
            Err(err) => {
                let _ = ready.send(Err(err));
                return WorkerExit::NotStarted;
            }
        };

        let mut sink = StopAwareSubscriber {
            inner: subscriber.as_mut(),
            stopped: &stopped,
        };
        let mut tree = discovery.tree;
        tracing::info!("Watch {} on {} tracking {} entries", handle, root.display(), tree.len());

        for failure in &discovery.failures {
            sink.on_monitoring_error(failure);
        }
        sink.on_registered(&tree);
        let initial = if options.include_root_event {
            &discovery.changes[..]
        } else {
            discovery.changes.get(1..).unwrap_or(&[])
        };
        if !initial.is_empty() {
            sink.on_files_changed(initial);
        }
        let _ = ready.send(Ok(()));

        let mut last_resync = Instant::now();
        let exit = loop {
            let Some(message) = next_message(&inbound, options.resync_interval, last_resync) else {
                break WorkerExit::Stopped;
            };
            if stopped.load(Ordering::SeqCst) {
                break WorkerExit::Stopped;
            }

            let result = match message {
                Inbound::Stop => break WorkerExit::Stopped,
                Inbound::Notification(notification) => {
                    tracing::debug!("{:?} {}", notification.kind, notification.path.display());
                    apply_notification(&mut tree, &notification, &scan).map(|reconciliation| {
                        for failure in &reconciliation.failures {
                            sink.on_monitoring_error(failure);
                        }
                        if !reconciliation.changes.is_empty() {
                            sink.on_files_changed(&reconciliation.changes);
                        }
                    })
                }
                Inbound::Resync => {
                    last_resync = Instant::now();
                    resync(&root, &scan, &mut tree, &mut sink)
                }
                Inbound::BackendError(err) => {
                    tracing::warn!("File watcher error on {}: {}", root.display(), err);
                    sink.on_monitoring_error(&MonitorError::Backend(err));
                    last_resync = Instant::now();
                    resync(&root, &scan, &mut tree, &mut sink)
                }
            };

            let result = match result {
                Err(err @ (MonitorError::Tree(_) | MonitorError::ResyncRequired)) => {
                    tracing::debug!("Tree drifted on {} ({}), resyncing", root.display(), err);
                    last_resync = Instant::now();
                    resync(&root, &scan, &mut tree, &mut sink)
                }
                other => other,
            };

            match result {
                Ok(()) => {}
                Err(MonitorError::Cancelled) => break WorkerExit::Stopped,
                Err(err) => {
                    tracing::error!("Watch {} on {} failed: {}", handle, root.display(), err);
                    sink.on_monitoring_error(&err);
                    break WorkerExit::Failed;
                }
            }
        };

        drop(sink);
        subscriber.on_unregistered();
        tracing::info!("Watch {} on {} stopped", handle, root.display());
        exit
    }
}

/// Next thing the worker should handle. A due resync wins over queued
/// notifications so a busy queue cannot postpone it. `None` once every
/// sender is gone.
fn next_message(
    inbound: &Receiver<Inbound>,
    resync_interval: Option<Duration>,
    last_resync: Instant,
) -> Option<Inbound> {
    let Some(interval) = resync_interval else {
        return inbound.recv().ok();
    };

    let elapsed = last_resync.elapsed();
    if elapsed >= interval {
        return Some(Inbound::Resync);
    }
    match inbound.recv_timeout(interval - elapsed) {
        Ok(message) => Some(message),
        Err(RecvTimeoutError::Timeout) => Some(Inbound::Resync),
        Err(RecvTimeoutError::Disconnected) => None,
    }
}

fn resync(
    root: &Path,
    scan: &ScanOptions<'_>,
    tree: &mut Tree,
    sink: &mut dyn ChangeSubscriber,
) -> Result<()> {
    tracing::info!("Resyncing {}", root.display());
    let failures = discover_and_process_file_changes(root, scan, tree, sink)?;
    for failure in &failures {
        sink.on_monitoring_error(failure);
    }
    Ok(())
}

/// Aborts scans once the watch is being stopped.
struct StopAwareHook<'a> {
    inner: &'a dyn ScanHook,
    stopped: &'a AtomicBool,
}

impl ScanHook for StopAwareHook<'_> {
    fn before_scan_dir(&self, dir: &FileInfo) -> Result<()> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(MonitorError::Cancelled);
        }
        self.inner.before_scan_dir(dir)
    }
}

/// Drops callbacks once the watch is being stopped.
struct StopAwareSubscriber<'a> {
    inner: &'a mut dyn ChangeSubscriber,
    stopped: &'a AtomicBool,
}

impl StopAwareSubscriber<'_> {
    fn live(&self) -> bool {
        !self.stopped.load(Ordering::SeqCst)
    }
}

impl ChangeSubscriber for StopAwareSubscriber<'_> {
    fn on_files_changed(&mut self, changes: &[ChangeEvent]) {
        if self.live() {
            self.inner.on_files_changed(changes);
        }
    }

    fn on_registered(&mut self, tree: &Tree) {
        if self.live() {
            self.inner.on_registered(tree);
        }
    }

    fn on_monitoring_error(&mut self, error: &MonitorError) {
        if self.live() {
            self.inner.on_monitoring_error(error);
        }
    }
}
