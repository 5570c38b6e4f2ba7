pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod filter;
pub mod registry;
pub mod watcher;

pub use crate::core::*;
pub use config::{FilterSettings, TreewatchConfig, WatchSettings};
pub use error::{MonitorError, Result};
pub use filter::{ExtensionFilter, FilterChain, IgnoreFilter, RegexFilter};
pub use registry::{WatchHandle, WatchRegistry, WatchSummary};
pub use watcher::{translate_event, WatchOptions};
