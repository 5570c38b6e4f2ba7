use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::file_info::FileInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

impl ChangeKind {
    pub fn label(&self) -> &'static str {
        match self {
            ChangeKind::Added => "ADDED",
            ChangeKind::Modified => "MODIFIED",
            ChangeKind::Removed => "REMOVED",
        }
    }

    pub fn short_label(&self) -> &'static str {
        match self {
            ChangeKind::Added => "A",
            ChangeKind::Modified => "M",
            ChangeKind::Removed => "R",
        }
    }
}

/// One semantic change in a batch. Batches are ordered: replaying them in
/// order against a copy of the tree reproduces the engine's tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub info: FileInfo,
}

impl ChangeEvent {
    pub fn new(kind: ChangeKind, info: FileInfo) -> Self {
        Self { kind, info }
    }

    pub fn added(info: FileInfo) -> Self {
        Self::new(ChangeKind::Added, info)
    }

    pub fn modified(info: FileInfo) -> Self {
        Self::new(ChangeKind::Modified, info)
    }

    pub fn removed(info: FileInfo) -> Self {
        Self::new(ChangeKind::Removed, info)
    }

    pub fn path(&self) -> &Path {
        self.info.path()
    }
}

/// Counts of each change kind in a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchStats {
    pub added: usize,
    pub modified: usize,
    pub removed: usize,
}

impl BatchStats {
    pub fn from_changes(changes: &[ChangeEvent]) -> Self {
        let mut stats = Self::default();
        for change in changes {
            match change.kind {
                ChangeKind::Added => stats.added += 1,
                ChangeKind::Modified => stats.modified += 1,
                ChangeKind::Removed => stats.removed += 1,
            }
        }
        stats
    }

    pub fn total(&self) -> usize {
        self.added + self.modified + self.removed
    }
}

/// What the platform backend says happened at a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RawKind {
    Appeared,
    Changed,
    Disappeared,
}

/// Unordered, possibly coalesced path-level notification from the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawNotification {
    pub path: PathBuf,
    pub kind: RawKind,
}

impl RawNotification {
    pub fn new(path: impl Into<PathBuf>, kind: RawKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    pub fn appeared(path: impl Into<PathBuf>) -> Self {
        Self::new(path, RawKind::Appeared)
    }

    pub fn changed(path: impl Into<PathBuf>) -> Self {
        Self::new(path, RawKind::Changed)
    }

    pub fn disappeared(path: impl Into<PathBuf>) -> Self {
        Self::new(path, RawKind::Disappeared)
    }
}

/// Watch lifecycle and change notifications as delivered over a channel
/// by [`ChannelSubscriber`](super::ChannelSubscriber).
#[derive(Debug, Clone)]
pub enum MonitorEvent {
    Registered { root: PathBuf, entries: usize },
    FilesChanged { root: PathBuf, changes: Vec<ChangeEvent> },
    MonitoringError { root: PathBuf, message: String },
    Unregistered { root: PathBuf },
}

impl MonitorEvent {
    pub fn root(&self) -> &Path {
        match self {
            MonitorEvent::Registered { root, .. }
            | MonitorEvent::FilesChanged { root, .. }
            | MonitorEvent::MonitoringError { root, .. }
            | MonitorEvent::Unregistered { root } => root,
        }
    }
}
