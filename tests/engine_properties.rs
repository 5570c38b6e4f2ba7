use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use treewatch::{
    apply_notification, discover, discover_and_process_file_changes, replay, AcceptAll,
    ChangeEvent, ChangeKind, FileInfo, MonitorError, NoScanHook, RawNotification, ScanOptions,
    Tree,
};

fn options() -> ScanOptions<'static> {
    ScanOptions::new(true, &AcceptAll, &NoScanHook)
}

fn relative(root: &Path, changes: &[ChangeEvent]) -> Vec<(ChangeKind, PathBuf)> {
    changes
        .iter()
        .map(|c| (c.kind, c.path().strip_prefix(root).unwrap().to_path_buf()))
        .collect()
}

fn added(path: &str) -> (ChangeKind, PathBuf) {
    (ChangeKind::Added, PathBuf::from(path))
}

fn removed(path: &str) -> (ChangeKind, PathBuf) {
    (ChangeKind::Removed, PathBuf::from(path))
}

#[test]
fn test_initial_discovery_is_pre_order_and_replayable() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let root = temp_dir.path();
    fs::create_dir_all(root.join("b/inner")).unwrap();
    fs::write(root.join("b/inner/x.txt"), "x").unwrap();
    fs::write(root.join("a.txt"), "a").unwrap();
    fs::write(root.join("c.txt"), "c").unwrap();

    let discovery = discover(root, &options()).unwrap();

    assert_eq!(
        relative(root, &discovery.changes),
        vec![
            added(""),
            added("a.txt"),
            added("b"),
            added("b/inner"),
            added("b/inner/x.txt"),
            added("c.txt"),
        ]
    );

    let mut mirror = Tree::new();
    replay(&mut mirror, &discovery.changes).unwrap();
    assert_eq!(mirror, discovery.tree);
}

#[test]
fn test_resync_reports_minimal_diff() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let root = temp_dir.path();
    fs::create_dir(root.join("a")).unwrap();
    fs::write(root.join("a/b"), "b").unwrap();
    fs::write(root.join("c"), "c").unwrap();

    let mut tree = discover(root, &options()).unwrap().tree;
    let mut mirror = tree.clone();

    fs::remove_file(root.join("a/b")).unwrap();
    fs::write(root.join("a/d"), "d").unwrap();

    let mut batches: Vec<Vec<ChangeEvent>> = Vec::new();
    let mut subscriber = |changes: &[ChangeEvent]| batches.push(changes.to_vec());
    let failures =
        discover_and_process_file_changes(root, &options(), &mut tree, &mut subscriber).unwrap();

    assert!(failures.is_empty());
    assert_eq!(batches.len(), 1);
    assert_eq!(relative(root, &batches[0]), vec![removed("a/b"), added("a/d")]);

    replay(&mut mirror, &batches[0]).unwrap();
    assert_eq!(mirror, tree);
}

#[test]
fn test_resync_without_changes_stays_silent() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let root = temp_dir.path();
    fs::write(root.join("a.txt"), "a").unwrap();

    let mut tree = discover(root, &options()).unwrap().tree;
    let mut calls = 0;
    let mut subscriber = |_: &[ChangeEvent]| calls += 1;
    discover_and_process_file_changes(root, &options(), &mut tree, &mut subscriber).unwrap();

    assert_eq!(calls, 0);
}

#[test]
fn test_new_directory_arrives_parent_first() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let root = temp_dir.path();
    let mut tree = discover(root, &options()).unwrap().tree;
    let mut mirror = tree.clone();

    fs::create_dir_all(root.join("x/y")).unwrap();
    fs::write(root.join("x/y/z.txt"), "z").unwrap();
    fs::write(root.join("x/w.txt"), "w").unwrap();

    let result =
        apply_notification(&mut tree, &RawNotification::appeared(root.join("x")), &options()).unwrap();

    assert_eq!(
        relative(root, &result.changes),
        vec![added("x"), added("x/w.txt"), added("x/y"), added("x/y/z.txt")]
    );
    replay(&mut mirror, &result.changes).unwrap();
    assert_eq!(mirror, tree);
}

#[test]
fn test_missed_parent_is_healed() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let root = temp_dir.path();
    let mut tree = discover(root, &options()).unwrap().tree;

    fs::create_dir_all(root.join("x/y")).unwrap();
    fs::write(root.join("x/y/z.txt"), "z").unwrap();

    // Only the deepest entry is reported
    let result = apply_notification(
        &mut tree,
        &RawNotification::appeared(root.join("x/y/z.txt")),
        &options(),
    )
    .unwrap();

    assert_eq!(
        relative(root, &result.changes),
        vec![added("x"), added("x/y"), added("x/y/z.txt")]
    );
    assert!(tree.find(&root.join("x/y/z.txt")).is_some());
}

#[test]
fn test_removed_directory_children_first_and_idempotent() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let root = temp_dir.path();
    fs::create_dir_all(root.join("x/y")).unwrap();
    fs::write(root.join("x/y/z.txt"), "z").unwrap();
    let mut tree = discover(root, &options()).unwrap().tree;
    let mut mirror = tree.clone();

    fs::remove_dir_all(root.join("x")).unwrap();
    let gone = RawNotification::disappeared(root.join("x"));

    let first = apply_notification(&mut tree, &gone, &options()).unwrap();
    assert_eq!(
        relative(root, &first.changes),
        vec![removed("x/y/z.txt"), removed("x/y"), removed("x")]
    );
    replay(&mut mirror, &first.changes).unwrap();
    assert_eq!(mirror, tree);

    let second = apply_notification(&mut tree, &gone, &options()).unwrap();
    assert!(second.is_empty());
    assert_eq!(tree.len(), 1);
}

#[test]
fn test_scan_failure_is_contained() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let root = temp_dir.path();
    fs::create_dir_all(root.join("private/secret")).unwrap();
    fs::create_dir(root.join("public")).unwrap();
    fs::write(root.join("public/readme.txt"), "hi").unwrap();

    let deny_private = |dir: &FileInfo| -> treewatch::Result<()> {
        if dir.path().ends_with("private") {
            return Err(MonitorError::ScanRejected {
                path: dir.path().to_path_buf(),
                reason: "private".to_string(),
            });
        }
        Ok(())
    };
    let options = ScanOptions::new(true, &AcceptAll, &deny_private);
    let discovery = discover(root, &options).unwrap();

    assert_eq!(discovery.failures.len(), 1);
    assert!(matches!(discovery.failures[0], MonitorError::ScanRejected { .. }));
    assert!(discovery.tree.find(&root.join("private")).is_some());
    assert!(discovery.tree.find(&root.join("private/secret")).is_none());
    assert!(discovery.tree.find(&root.join("public/readme.txt")).is_some());
}

#[test]
fn test_filter_excludes_whole_subtree() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let root = temp_dir.path();
    fs::create_dir_all(root.join("target/debug")).unwrap();
    fs::write(root.join("target/debug/app"), "bin").unwrap();
    fs::write(root.join("main.rs"), "fn main() {}").unwrap();

    let no_target = |info: &FileInfo| !info.path().ends_with("target");
    let options = ScanOptions::new(true, &no_target, &NoScanHook);
    let mut tree = discover(root, &options).unwrap().tree;

    assert_eq!(tree.len(), 2);

    fs::write(root.join("target/debug/app"), "bin2").unwrap();
    let result = apply_notification(
        &mut tree,
        &RawNotification::changed(root.join("target/debug/app")),
        &options,
    )
    .unwrap();
    assert!(result.changes.is_empty());
}

#[test]
fn test_root_removal_is_reported() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let root = temp_dir.path().join("watched");
    fs::create_dir(&root).unwrap();
    let mut tree = discover(&root, &options()).unwrap().tree;

    fs::remove_dir(&root).unwrap();
    let result = apply_notification(&mut tree, &RawNotification::disappeared(&root), &options());

    assert!(matches!(result, Err(MonitorError::PathVanished(path)) if path == root));
}
