//! Turns raw backend notifications into tree mutations and change batches.
//!
//! Every function here appends to a [`Reconciliation`] in the order a
//! subscriber has to replay it: additions parent first, removals children
//! first. An `Err` return means the tree no longer matches what the caller
//! believed (stale handles, structural conflicts) and a resync is due.

use std::cmp::Ordering;
use std::path::Path;

use super::discovery::{discover, discover_from, ScanOptions};
use super::events::{ChangeEvent, ChangeKind, RawKind, RawNotification};
use super::file_info::FileInfo;
use super::hooks::ChangeSubscriber;
use super::tree::{NodeId, Tree, TreeError};
use crate::error::{MonitorError, Result};

/// Output of one reconciliation pass.
#[derive(Debug, Default)]
pub struct Reconciliation {
    pub changes: Vec<ChangeEvent>,
    /// Contained scan failures; the rest of the pass still applied.
    pub failures: Vec<MonitorError>,
}

impl Reconciliation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty() && self.failures.is_empty()
    }
}

/// Handles an entry that appeared under `parent`.
///
/// A new directory in a recursive watch is discovered in full and inserted
/// as one subtree. An entry that is already tracked is re-read instead.
pub fn process_file_added(
    tree: &mut Tree,
    parent: NodeId,
    added: FileInfo,
    options: &ScanOptions<'_>,
    out: &mut Reconciliation,
) -> Result<()> {
    if !options.filter.accept(&added) {
        return Ok(());
    }

    if let Some(existing) = tree.find_child(parent, added.path()) {
        return refresh_existing(tree, parent, existing, added, options, out);
    }

    if added.is_directory() && options.recursive {
        match discover_from(added.clone(), options, false) {
            Ok(discovery) => {
                tree.insert_subtree(parent, discovery.tree)?;
                out.changes.extend(discovery.changes);
                out.failures.extend(discovery.failures);
                return Ok(());
            }
            Err(MonitorError::Cancelled) => return Err(MonitorError::Cancelled),
            Err(MonitorError::PathVanished(path)) => {
                tracing::debug!("Added directory vanished before scan: {}", path.display());
                return Ok(());
            }
            Err(err) => {
                // Track the directory itself; its contents stay unknown.
                tracing::warn!("Failed to scan added directory: {}", err);
                out.failures.push(err);
            }
        }
    }

    tree.append_child(parent, added.clone())?;
    out.changes.push(ChangeEvent::added(added));
    Ok(())
}

/// Handles a change notification for an entry under `parent`.
///
/// Untracked entries are treated as missed additions. Directories do not
/// produce Modified events.
pub fn process_file_modified(
    tree: &mut Tree,
    parent: NodeId,
    modified: FileInfo,
    options: &ScanOptions<'_>,
    out: &mut Reconciliation,
) -> Result<()> {
    let Some(existing) = tree.find_child(parent, modified.path()) else {
        tracing::debug!(
            "Change for untracked {}, treating as added",
            modified.path().display()
        );
        return process_file_added(tree, parent, modified, options, out);
    };

    let was_directory = tree.get(existing).ok_or(TreeError::StaleNode)?.is_directory();
    if was_directory != modified.is_directory() {
        return replace_entry(tree, parent, existing, modified, options, out);
    }
    if was_directory {
        return Ok(());
    }

    tree.update_node(existing, modified.clone())?;
    out.changes.push(ChangeEvent::modified(modified));
    Ok(())
}

/// Handles an entry that disappeared from under `parent`. Untracked paths
/// are ignored, so repeated removals are harmless.
pub fn process_file_removed(
    tree: &mut Tree,
    parent: NodeId,
    removed: &Path,
    out: &mut Reconciliation,
) -> Result<()> {
    match tree.find_child(parent, removed) {
        Some(existing) => remove_entry(tree, existing, out),
        None => Ok(()),
    }
}

/// Rescans the root, diffs the result against `tree`, swaps it in and
/// reports the combined batch once.
///
/// Returns the contained failures of the fresh scan; a failure at the root
/// is returned as the error and leaves `tree` untouched.
pub fn discover_and_process_file_changes(
    root: &Path,
    options: &ScanOptions<'_>,
    tree: &mut Tree,
    subscriber: &mut dyn ChangeSubscriber,
) -> Result<Vec<MonitorError>> {
    let discovery = discover(root, options)?;
    let changes = diff_trees(tree, &discovery.tree);
    *tree = discovery.tree;

    if !changes.is_empty() {
        subscriber.on_files_changed(&changes);
    }
    Ok(discovery.failures)
}

/// Minimal change list that turns `old` into `new`.
///
/// Both trees are walked in path order. Directory metadata is not compared.
pub fn diff_trees(old: &Tree, new: &Tree) -> Vec<ChangeEvent> {
    let mut changes = Vec::new();
    match (old.root(), new.root()) {
        (Some(old_root), Some(new_root)) => {
            let same_root = match (old.get(old_root), new.get(new_root)) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            };
            if same_root {
                diff_entry(old, old_root, new, new_root, &mut changes);
            } else {
                push_removed(old, old_root, &mut changes);
                push_added(new, new_root, &mut changes);
            }
        }
        (Some(old_root), None) => push_removed(old, old_root, &mut changes),
        (None, Some(new_root)) => push_added(new, new_root, &mut changes),
        (None, None) => {}
    }
    changes
}

/// Applies a raw notification to `tree`.
///
/// Resolves the parent node, reads the entry's metadata, and dispatches to
/// the add, modify or remove handler. A notification whose parent is not
/// tracked is healed by adding the topmost missing ancestor.
pub fn apply_notification(
    tree: &mut Tree,
    notification: &RawNotification,
    options: &ScanOptions<'_>,
) -> Result<Reconciliation> {
    let mut out = Reconciliation::new();
    let root_path = tree
        .root_info()
        .map(|info| info.path().to_path_buf())
        .ok_or(MonitorError::ResyncRequired)?;
    let path = notification.path.as_path();

    if path == root_path {
        if notification.kind == RawKind::Disappeared {
            return Err(MonitorError::PathVanished(root_path));
        }
        refresh_root_file(tree, &mut out)?;
        return Ok(out);
    }

    let Ok(relative) = path.strip_prefix(&root_path) else {
        return Ok(out);
    };
    if !options.recursive && relative.components().count() > 1 {
        return Ok(out);
    }

    if notification.kind == RawKind::Disappeared {
        let parent = path.parent().and_then(|parent| tree.find(parent));
        if let Some(parent) = parent {
            process_file_removed(tree, parent, path, &mut out)?;
        }
        return Ok(out);
    }

    let Some(anchor) = path.ancestors().skip(1).find_map(|a| tree.find(a)) else {
        return Ok(out);
    };
    let anchor_info = tree.get(anchor).cloned().ok_or(TreeError::StaleNode)?;

    if !anchor_info.is_directory() {
        // A tracked file turned into a directory before we heard about it.
        if let Some(grandparent) = tree.parent(anchor) {
            if let Some(info) = read_info(anchor_info.path(), &mut out) {
                process_file_modified(tree, grandparent, info, options, &mut out)?;
            }
        }
        return Ok(out);
    }

    let target = match path
        .strip_prefix(anchor_info.path())
        .ok()
        .and_then(|rest| rest.components().next())
    {
        Some(first) => anchor_info.path().join(first),
        None => return Ok(out),
    };
    let Some(info) = read_info(&target, &mut out) else {
        return Ok(out);
    };

    if target == path && notification.kind == RawKind::Changed {
        process_file_modified(tree, anchor, info, options, &mut out)?;
    } else {
        process_file_added(tree, anchor, info, options, &mut out)?;
    }
    Ok(out)
}

/// Applies a change batch to a mirror tree, the way a subscriber would.
pub fn replay(tree: &mut Tree, changes: &[ChangeEvent]) -> std::result::Result<(), TreeError> {
    for change in changes {
        let path = change.path();
        match change.kind {
            ChangeKind::Added => match path.parent().and_then(|parent| tree.find(parent)) {
                Some(parent) => {
                    tree.append_child(parent, change.info.clone())?;
                }
                None if tree.is_empty() => *tree = Tree::with_root(change.info.clone()),
                None => {
                    return Err(TreeError::NotAChild {
                        parent: path.parent().map(Path::to_path_buf).unwrap_or_default(),
                        child: path.to_path_buf(),
                    })
                }
            },
            ChangeKind::Modified => {
                let id = tree.find(path).ok_or(TreeError::StaleNode)?;
                tree.update_node(id, change.info.clone())?;
            }
            ChangeKind::Removed => {
                let id = tree.find(path).ok_or(TreeError::StaleNode)?;
                tree.remove_subtree(id)?;
            }
        }
    }
    Ok(())
}

fn refresh_existing(
    tree: &mut Tree,
    parent: NodeId,
    existing: NodeId,
    fresh: FileInfo,
    options: &ScanOptions<'_>,
    out: &mut Reconciliation,
) -> Result<()> {
    let current = tree.get(existing).cloned().ok_or(TreeError::StaleNode)?;

    if current.is_directory() != fresh.is_directory() {
        replace_entry(tree, parent, existing, fresh, options, out)
    } else if !fresh.is_directory() {
        if !current.is_identical(&fresh) {
            tree.update_node(existing, fresh.clone())?;
            out.changes.push(ChangeEvent::modified(fresh));
        }
        Ok(())
    } else if options.recursive {
        rescan_directory(tree, parent, existing, fresh, options, out)
    } else {
        Ok(())
    }
}

/// Re-discovers a tracked directory and reports only what differs.
fn rescan_directory(
    tree: &mut Tree,
    parent: NodeId,
    existing: NodeId,
    fresh: FileInfo,
    options: &ScanOptions<'_>,
    out: &mut Reconciliation,
) -> Result<()> {
    match discover_from(fresh, options, false) {
        Ok(discovery) => {
            let old = tree.remove_subtree(existing)?;
            out.changes.extend(diff_trees(&old, &discovery.tree));
            tree.insert_subtree(parent, discovery.tree)?;
            out.failures.extend(discovery.failures);
            Ok(())
        }
        Err(MonitorError::Cancelled) => Err(MonitorError::Cancelled),
        Err(err) if err.is_benign() => Ok(()),
        Err(err) => {
            out.failures.push(err);
            Ok(())
        }
    }
}

fn replace_entry(
    tree: &mut Tree,
    parent: NodeId,
    existing: NodeId,
    fresh: FileInfo,
    options: &ScanOptions<'_>,
    out: &mut Reconciliation,
) -> Result<()> {
    remove_entry(tree, existing, out)?;
    process_file_added(tree, parent, fresh, options, out)
}

fn remove_entry(tree: &mut Tree, id: NodeId, out: &mut Reconciliation) -> Result<()> {
    let removed = tree.remove_subtree(id)?;
    if let Some(root) = removed.root() {
        out.changes.extend(
            removed
                .post_order(root)
                .into_iter()
                .cloned()
                .map(ChangeEvent::removed),
        );
    }
    Ok(())
}

/// A watch rooted at a file reports the file's own changes. Directory roots
/// are never Modified.
fn refresh_root_file(tree: &mut Tree, out: &mut Reconciliation) -> Result<()> {
    let root = tree.root().ok_or(MonitorError::ResyncRequired)?;
    let current = tree.get(root).cloned().ok_or(TreeError::StaleNode)?;
    if current.is_directory() {
        return Ok(());
    }

    let Some(fresh) = read_info(current.path(), out) else {
        return Ok(());
    };
    if fresh.is_directory() {
        // Root turned into a directory: rediscover it as a whole.
        return Err(MonitorError::ResyncRequired);
    }
    tree.update_node(root, fresh.clone())?;
    out.changes.push(ChangeEvent::modified(fresh));
    Ok(())
}

fn read_info(path: &Path, out: &mut Reconciliation) -> Option<FileInfo> {
    match FileInfo::from_path(path) {
        Ok(info) => Some(info),
        Err(err) if err.is_benign() => {
            tracing::debug!("Ignoring notification: {}", err);
            None
        }
        Err(err) => {
            out.failures.push(err);
            None
        }
    }
}

fn diff_entry(old: &Tree, old_id: NodeId, new: &Tree, new_id: NodeId, changes: &mut Vec<ChangeEvent>) {
    let (Some(before), Some(after)) = (old.get(old_id), new.get(new_id)) else {
        return;
    };

    if before.is_directory() != after.is_directory() {
        push_removed(old, old_id, changes);
        push_added(new, new_id, changes);
    } else if before.is_directory() {
        diff_children(old, old_id, new, new_id, changes);
    } else if !before.is_identical(after) {
        changes.push(ChangeEvent::modified(after.clone()));
    }
}

fn diff_children(old: &Tree, old_id: NodeId, new: &Tree, new_id: NodeId, changes: &mut Vec<ChangeEvent>) {
    let before = old.children(old_id);
    let after = new.children(new_id);
    let (mut i, mut j) = (0, 0);

    loop {
        let left = before.get(i).and_then(|id| old.get(*id));
        let right = after.get(j).and_then(|id| new.get(*id));
        let order = match (left, right) {
            (Some(a), Some(b)) => a.path().cmp(b.path()),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => break,
        };

        match order {
            Ordering::Less => {
                push_removed(old, before[i], changes);
                i += 1;
            }
            Ordering::Greater => {
                push_added(new, after[j], changes);
                j += 1;
            }
            Ordering::Equal => {
                diff_entry(old, before[i], new, after[j], changes);
                i += 1;
                j += 1;
            }
        }
    }
}

fn push_added(tree: &Tree, id: NodeId, changes: &mut Vec<ChangeEvent>) {
    changes.extend(tree.descendants(id).cloned().map(ChangeEvent::added));
}

fn push_removed(tree: &Tree, id: NodeId, changes: &mut Vec<ChangeEvent>) {
    changes.extend(tree.post_order(id).into_iter().cloned().map(ChangeEvent::removed));
}
