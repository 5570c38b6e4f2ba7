//! Capability interfaces the engine is parameterised over.
//!
//! Discovery and the reconciler only ever see these traits. Closures
//! implement all three, so ad-hoc callers do not need a named type.

use std::path::PathBuf;
use std::sync::mpsc::Sender;

use super::events::{ChangeEvent, MonitorEvent};
use super::file_info::FileInfo;
use super::tree::Tree;
use crate::error::{MonitorError, Result};

/// Decides whether an entry is tracked. Must be pure: it may be called many
/// times per scan and from the watch's worker thread.
pub trait Filter: Send + Sync {
    fn accept(&self, info: &FileInfo) -> bool;
}

impl<F> Filter for F
where
    F: Fn(&FileInfo) -> bool + Send + Sync,
{
    fn accept(&self, info: &FileInfo) -> bool {
        self(info)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl Filter for AcceptAll {
    fn accept(&self, _info: &FileInfo) -> bool {
        true
    }
}

/// Runs once per directory right before its entries are listed. An error
/// skips that directory's contents.
pub trait ScanHook: Send + Sync {
    fn before_scan_dir(&self, dir: &FileInfo) -> Result<()>;
}

impl<F> ScanHook for F
where
    F: Fn(&FileInfo) -> Result<()> + Send + Sync,
{
    fn before_scan_dir(&self, dir: &FileInfo) -> Result<()> {
        self(dir)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoScanHook;

impl ScanHook for NoScanHook {
    fn before_scan_dir(&self, _dir: &FileInfo) -> Result<()> {
        Ok(())
    }
}

/// Receives change batches for one watch.
///
/// Called from the watch's worker thread, at most once per raw notification
/// or discovery pass. Implementations must not stop or register watches
/// from inside these callbacks.
pub trait ChangeSubscriber: Send {
    fn on_files_changed(&mut self, changes: &[ChangeEvent]);

    /// Initial tree, delivered once discovery of the root succeeded.
    fn on_registered(&mut self, _tree: &Tree) {}

    fn on_monitoring_error(&mut self, _error: &MonitorError) {}

    /// Last callback a watch ever makes.
    fn on_unregistered(&mut self) {}
}

impl<F> ChangeSubscriber for F
where
    F: FnMut(&[ChangeEvent]) + Send,
{
    fn on_files_changed(&mut self, changes: &[ChangeEvent]) {
        self(changes)
    }
}

/// Forwards everything a watch reports as [`MonitorEvent`]s.
///
/// Send failures are ignored: a dropped receiver just means nobody is
/// listening any more.
pub struct ChannelSubscriber {
    root: PathBuf,
    sender: Sender<MonitorEvent>,
}

impl ChannelSubscriber {
    pub fn new(root: impl Into<PathBuf>, sender: Sender<MonitorEvent>) -> Self {
        Self {
            root: root.into(),
            sender,
        }
    }
}

impl ChangeSubscriber for ChannelSubscriber {
    fn on_files_changed(&mut self, changes: &[ChangeEvent]) {
        let _ = self.sender.send(MonitorEvent::FilesChanged {
            root: self.root.clone(),
            changes: changes.to_vec(),
        });
    }

    fn on_registered(&mut self, tree: &Tree) {
        let _ = self.sender.send(MonitorEvent::Registered {
            root: self.root.clone(),
            entries: tree.len(),
        });
    }

    fn on_monitoring_error(&mut self, error: &MonitorError) {
        let _ = self.sender.send(MonitorEvent::MonitoringError {
            root: self.root.clone(),
            message: error.to_string(),
        });
    }

    fn on_unregistered(&mut self) {
        let _ = self.sender.send(MonitorEvent::Unregistered {
            root: self.root.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::SystemTime;

    #[test]
    fn test_closure_filter() {
        let only_rs = |info: &FileInfo| info.path().extension().map_or(false, |e| e == "rs");
        let t = SystemTime::UNIX_EPOCH;

        assert!(only_rs.accept(&FileInfo::file("/w/main.rs", t, 0)));
        assert!(!only_rs.accept(&FileInfo::file("/w/notes.md", t, 0)));
        assert!(AcceptAll.accept(&FileInfo::file("/w/notes.md", t, 0)));
    }

    #[test]
    fn test_closure_scan_hook() {
        let deny = |dir: &FileInfo| -> Result<()> {
            Err(MonitorError::ScanRejected {
                path: dir.path().to_path_buf(),
                reason: "denied".to_string(),
            })
        };
        let info = FileInfo::directory("/w/private", SystemTime::UNIX_EPOCH);

        assert!(deny.before_scan_dir(&info).is_err());
        assert!(NoScanHook.before_scan_dir(&info).is_ok());
    }

    #[test]
    fn test_channel_subscriber_forwards_events() {
        let (tx, rx) = mpsc::channel();
        let mut subscriber = ChannelSubscriber::new("/w", tx);
        let info = FileInfo::file("/w/a", SystemTime::UNIX_EPOCH, 1);

        subscriber.on_registered(&Tree::with_root(FileInfo::directory("/w", SystemTime::UNIX_EPOCH)));
        subscriber.on_files_changed(&[ChangeEvent::added(info)]);
        subscriber.on_unregistered();

        assert!(matches!(rx.recv().unwrap(), MonitorEvent::Registered { entries: 1, .. }));
        match rx.recv().unwrap() {
            MonitorEvent::FilesChanged { changes, .. } => assert_eq!(changes.len(), 1),
            other => panic!("Expected FilesChanged, got {:?}", other),
        }
        assert!(matches!(rx.recv().unwrap(), MonitorEvent::Unregistered { .. }));
    }
}
