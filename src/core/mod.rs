//! Change-monitoring engine
//!
//! Contains the tree mirror, discovery, and the reconciler that turns raw
//! notifications into ordered change batches. Nothing in here knows about
//! threads or the platform backend.

pub mod discovery;
pub mod events;
pub mod file_info;
pub mod hooks;
pub mod reconcile;
pub mod tree;

// Re-export main types
pub use discovery::{discover, Discovery, ScanOptions};
pub use events::{BatchStats, ChangeEvent, ChangeKind, MonitorEvent, RawKind, RawNotification};
pub use file_info::FileInfo;
pub use hooks::{AcceptAll, ChangeSubscriber, ChannelSubscriber, Filter, NoScanHook, ScanHook};
pub use reconcile::{
    apply_notification, diff_trees, discover_and_process_file_changes, process_file_added,
    process_file_modified, process_file_removed, replay, Reconciliation,
};
pub use tree::{NodeId, PreOrder, Tree, TreeError};
