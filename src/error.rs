//! Error types shared by the engine, the backend adapter and the registry.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::core::tree::TreeError;
use crate::registry::WatchHandle;

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("cannot access {path}: {source}")]
    FilesystemAccess {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("path vanished before it could be scanned: {0}")]
    PathVanished(PathBuf),

    #[error("watch backend dropped events, resync required")]
    ResyncRequired,

    #[error("scan of {path} rejected: {reason}")]
    ScanRejected { path: PathBuf, reason: String },

    #[error("watch backend error: {0}")]
    Backend(#[from] notify::Error),

    #[error("tree out of sync with filesystem: {0}")]
    Tree(#[from] TreeError),

    #[error("no active watch with handle {0}")]
    UnknownWatch(WatchHandle),

    #[error("a watch cannot be stopped from its own subscriber callback")]
    ReentrantStop,

    #[error("watch registry has been shut down")]
    RegistryClosed,

    #[error("scan cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, MonitorError>;

impl MonitorError {
    /// Classifies an I/O failure on `path`.
    pub fn from_io(path: &Path, err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::NotFound {
            MonitorError::PathVanished(path.to_path_buf())
        } else {
            MonitorError::FilesystemAccess {
                path: path.to_path_buf(),
                source: err,
            }
        }
    }

    /// Races and cancellations that degrade to a no-op instead of being reported.
    pub fn is_benign(&self) -> bool {
        matches!(self, MonitorError::PathVanished(_) | MonitorError::Cancelled)
    }

    /// The filesystem path this error is about, when there is one.
    pub fn path(&self) -> Option<&Path> {
        match self {
            MonitorError::FilesystemAccess { path, .. }
            | MonitorError::ScanRejected { path, .. }
            | MonitorError::PathVanished(path) => Some(path),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_maps_to_vanished() {
        let err = MonitorError::from_io(
            Path::new("/tmp/gone"),
            io::Error::new(io::ErrorKind::NotFound, "gone"),
        );
        assert!(matches!(err, MonitorError::PathVanished(_)));
        assert!(err.is_benign());
        assert_eq!(err.path(), Some(Path::new("/tmp/gone")));
    }

    #[test]
    fn test_permission_denied_maps_to_access_error() {
        let err = MonitorError::from_io(
            Path::new("/root/secret"),
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(matches!(err, MonitorError::FilesystemAccess { .. }));
        assert!(!err.is_benign());
        assert!(err.to_string().contains("/root/secret"));
    }
}
