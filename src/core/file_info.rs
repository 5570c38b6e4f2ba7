use std::cmp::Ordering;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::error::{MonitorError, Result};

/// Snapshot of a single filesystem entry.
///
/// Equality, hashing and ordering only look at `path`, so siblings in a
/// [`Tree`](super::Tree) can be kept sorted and binary searched. Use
/// [`FileInfo::is_identical`] to compare metadata as well.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileInfo {
    path: PathBuf,
    is_directory: bool,
    last_write_time: SystemTime,
    size: Option<u64>,
}

impl FileInfo {
    pub fn new(
        path: impl Into<PathBuf>,
        is_directory: bool,
        last_write_time: SystemTime,
        size: Option<u64>,
    ) -> Self {
        Self {
            path: path.into(),
            is_directory,
            last_write_time,
            size,
        }
    }

    pub fn file(path: impl Into<PathBuf>, last_write_time: SystemTime, size: u64) -> Self {
        Self::new(path, false, last_write_time, Some(size))
    }

    pub fn directory(path: impl Into<PathBuf>, last_write_time: SystemTime) -> Self {
        Self::new(path, true, last_write_time, None)
    }

    /// Reads the entry's metadata without following symbolic links.
    pub fn from_path(path: &Path) -> Result<Self> {
        let metadata = fs::symlink_metadata(path).map_err(|e| MonitorError::from_io(path, e))?;
        let last_write_time = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);

        if metadata.is_dir() {
            Ok(Self::directory(path, last_write_time))
        } else {
            Ok(Self::file(path, last_write_time, metadata.len()))
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_directory(&self) -> bool {
        self.is_directory
    }

    pub fn last_write_time(&self) -> SystemTime {
        self.last_write_time
    }

    pub fn size(&self) -> Option<u64> {
        self.size
    }

    /// True when every field matches, not only the path.
    pub fn is_identical(&self, other: &FileInfo) -> bool {
        self.path == other.path
            && self.is_directory == other.is_directory
            && self.last_write_time == other.last_write_time
            && self.size == other.size
    }

    /// Whether `self` sits directly inside `parent`.
    pub fn is_child_of(&self, parent: &Path) -> bool {
        self.path.parent() == Some(parent)
    }
}

impl PartialEq for FileInfo {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for FileInfo {}

impl Hash for FileInfo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
    }
}

impl PartialOrd for FileInfo {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FileInfo {
    // Path ordering is component-wise, so "a/b" sorts before "a-b".
    fn cmp(&self, other: &Self) -> Ordering {
        self.path.cmp(&other.path)
    }
}
