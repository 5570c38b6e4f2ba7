//! Full recursive scan of a directory into a fresh [`Tree`].

use std::fs;
use std::path::Path;

use super::events::ChangeEvent;
use super::file_info::FileInfo;
use super::hooks::{Filter, ScanHook};
use super::tree::{NodeId, Tree, TreeError};
use crate::error::{MonitorError, Result};

/// Per-watch scanning parameters shared by discovery and the reconciler.
#[derive(Clone, Copy)]
pub struct ScanOptions<'a> {
    pub recursive: bool,
    pub filter: &'a dyn Filter,
    pub hook: &'a dyn ScanHook,
}

impl<'a> ScanOptions<'a> {
    pub fn new(recursive: bool, filter: &'a dyn Filter, hook: &'a dyn ScanHook) -> Self {
        Self {
            recursive,
            filter,
            hook,
        }
    }
}

/// Result of a discovery pass.
#[derive(Debug)]
pub struct Discovery {
    pub tree: Tree,
    /// Added events for every node, root first, in pre-order.
    pub changes: Vec<ChangeEvent>,
    /// Directories below the root that could not be scanned. They are in
    /// `tree` as empty nodes.
    pub failures: Vec<MonitorError>,
}

/// Scans `root` and everything below it that passes the filter.
///
/// The root's immediate children are always listed; `recursive` controls
/// whether the scan descends further. Failing to read the root itself is
/// returned as an error.
pub fn discover(root: &Path, options: &ScanOptions<'_>) -> Result<Discovery> {
    let info = FileInfo::from_path(root)?;
    discover_from(info, options, true)
}

/// Builds the subtree for an entry whose metadata is already known.
///
/// `list_root` lists a directory root even when the scan is not recursive.
pub(crate) fn discover_from(
    info: FileInfo,
    options: &ScanOptions<'_>,
    list_root: bool,
) -> Result<Discovery> {
    let scan_root = info.is_directory() && (options.recursive || list_root);
    let mut tree = Tree::with_root(info);
    let mut failures = Vec::new();

    if scan_root {
        if let Some(root) = tree.root() {
            scan_dir(&mut tree, root, options, &mut failures)?;
        }
    }

    let changes = tree.iter().cloned().map(ChangeEvent::added).collect();
    Ok(Discovery {
        tree,
        changes,
        failures,
    })
}

/// Lists one directory into `tree`, children sorted, then descends.
///
/// Errors returned here are about `dir` itself; failures deeper down are
/// pushed to `failures` and do not stop the siblings.
fn scan_dir(
    tree: &mut Tree,
    dir: NodeId,
    options: &ScanOptions<'_>,
    failures: &mut Vec<MonitorError>,
) -> Result<()> {
    let dir_info = tree.get(dir).cloned().ok_or(TreeError::StaleNode)?;
    options.hook.before_scan_dir(&dir_info)?;

    let entries = fs::read_dir(dir_info.path()).map_err(|e| MonitorError::from_io(dir_info.path(), e))?;

    let mut children = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!("Error reading entry in {}: {}", dir_info.path().display(), err);
                continue;
            }
        };

        match FileInfo::from_path(&entry.path()) {
            Ok(info) if options.filter.accept(&info) => children.push(info),
            Ok(_) => {}
            Err(err) if err.is_benign() => {
                tracing::debug!("Skipping entry that vanished during scan: {}", err);
            }
            Err(err) => failures.push(err),
        }
    }
    children.sort();

    for info in children {
        let descend = info.is_directory() && options.recursive;
        let child = tree.append_child(dir, info)?;
        if !descend {
            continue;
        }

        if let Err(err) = scan_dir(tree, child, options, failures) {
            match err {
                MonitorError::Cancelled => return Err(err),
                MonitorError::PathVanished(_) => {
                    tree.remove_subtree(child)?;
                }
                err => {
                    tracing::warn!("Skipping contents of directory: {}", err);
                    failures.push(err);
                }
            }
        }
    }

    Ok(())
}
