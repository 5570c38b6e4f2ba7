use std::fs;
use std::path::Path;
use proptest::prelude::*;
use tempfile::TempDir;
use treewatch::{
    apply_notification, discover, replay, AcceptAll, NoScanHook, RawNotification, ScanOptions,
    Tree,
};

/// Paths the generated steps operate on, relative to the root.
const POOL: &[&str] = &["a", "b", "c", "a/x", "a/y", "b/x", "a/x/deep", "b/x/deep"];

#[derive(Debug, Clone)]
enum Step {
    CreateFile(usize),
    Write(usize),
    MkdirAll(usize),
    Remove(usize),
    Rename(usize, usize),
}

fn step() -> impl Strategy<Value = Step> {
    let n = POOL.len();
    prop_oneof![
        (0..n).prop_map(Step::CreateFile),
        (0..n).prop_map(Step::Write),
        (0..n).prop_map(Step::MkdirAll),
        (0..n).prop_map(Step::Remove),
        (0..n, 0..n).prop_map(|(from, to)| Step::Rename(from, to)),
    ]
}

/// True when some ancestor of `path` below `root` is a regular file.
fn under_a_file(root: &Path, path: &Path) -> bool {
    path.ancestors()
        .skip(1)
        .take_while(|ancestor| *ancestor != root)
        .any(|ancestor| ancestor.is_file())
}

/// Performs `step` on disk and returns what a backend would report for it.
fn perform(root: &Path, step: &Step) -> Vec<RawNotification> {
    match *step {
        Step::CreateFile(i) => {
            let path = root.join(POOL[i]);
            if path.exists() || under_a_file(root, &path) {
                return Vec::new();
            }
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(&path, "new").unwrap();
            // Only the leaf is reported; missing parents must be inferred
            vec![RawNotification::appeared(path)]
        }
        Step::Write(i) => {
            let path = root.join(POOL[i]);
            if !path.is_file() {
                return Vec::new();
            }
            fs::write(&path, "rewritten with more content").unwrap();
            vec![RawNotification::changed(path)]
        }
        Step::MkdirAll(i) => {
            let path = root.join(POOL[i]);
            if path.exists() || under_a_file(root, &path) {
                return Vec::new();
            }
            fs::create_dir_all(&path).unwrap();
            vec![RawNotification::appeared(path)]
        }
        Step::Remove(i) => {
            let path = root.join(POOL[i]);
            if path.is_dir() {
                fs::remove_dir_all(&path).unwrap();
            } else if path.is_file() {
                fs::remove_file(&path).unwrap();
            } else {
                return Vec::new();
            }
            vec![RawNotification::disappeared(path)]
        }
        Step::Rename(from, to) => {
            let source = root.join(POOL[from]);
            let target = root.join(POOL[to]);
            let parent_ready = target.parent().map_or(false, |parent| parent.is_dir());
            if !source.exists() || target.exists() || target.starts_with(&source) || !parent_ready {
                return Vec::new();
            }
            fs::rename(&source, &target).unwrap();
            vec![
                RawNotification::disappeared(source),
                RawNotification::appeared(target),
            ]
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn test_random_sequences_keep_mirror_and_disk_in_sync(steps in prop::collection::vec(step(), 1..60)) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let root = temp_dir.path();
        let options = ScanOptions::new(true, &AcceptAll, &NoScanHook);

        let discovery = discover(root, &options).unwrap();
        let mut tree = discovery.tree;
        let mut mirror = Tree::new();
        replay(&mut mirror, &discovery.changes).unwrap();

        for step in &steps {
            for notification in perform(root, step) {
                let result = apply_notification(&mut tree, &notification, &options).unwrap();
                prop_assert!(result.failures.is_empty(), "{:?} failed: {:?}", step, result.failures);
                prop_assert!(replay(&mut mirror, &result.changes).is_ok(), "{:?} did not replay", step);
            }
            prop_assert_eq!(&mirror, &tree, "mirror diverged after {:?}", step);
            prop_assert_eq!(&tree, &discover(root, &options).unwrap().tree, "tree diverged from disk after {:?}", step);
        }
    }
}
