use clap::Parser;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use serde::Serialize;

use treewatch::{
    cli::{Cli, OutputFormat},
    discover, BatchStats, ChangeEvent, ChangeKind, ChannelSubscriber, FilterChain, MonitorEvent,
    NoScanHook, ScanOptions, TreewatchConfig, WatchOptions, WatchRegistry,
};

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Err(err) = cli.validate() {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }

    cli.setup_logging();

    let mut config = TreewatchConfig::load_or_default(cli.config.as_deref())?;
    cli.apply_to(&mut config);
    if let Err(err) = config.validate() {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }

    let printer = Printer {
        format: cli.output,
        color: !cli.no_color,
    };

    if cli.once {
        run_once(&cli, &config, &printer)
    } else {
        run_watch(&cli, &config, &printer)
    }
}

fn canonical_roots(cli: &Cli) -> Result<Vec<PathBuf>> {
    cli.get_watch_paths()
        .iter()
        .map(|path| {
            std::fs::canonicalize(path)
                .with_context(|| format!("Failed to resolve {}", path.display()))
        })
        .collect()
}

fn run_once(cli: &Cli, config: &TreewatchConfig, printer: &Printer) -> Result<()> {
    for root in canonical_roots(cli)? {
        let filter = FilterChain::from_settings(&root, &config.filter)?;
        let options = ScanOptions::new(config.watch.recursive, &filter, &NoScanHook);
        let discovery = discover(&root, &options)
            .with_context(|| format!("Failed to scan {}", root.display()))?;

        for failure in &discovery.failures {
            tracing::warn!("{}", failure);
        }

        let changes = if config.watch.include_root_event {
            &discovery.changes[..]
        } else {
            discovery.changes.get(1..).unwrap_or(&[])
        };
        printer.print_batch(&root, changes)?;
    }

    Ok(())
}

fn run_watch(cli: &Cli, config: &TreewatchConfig, printer: &Printer) -> Result<()> {
    let registry = WatchRegistry::new();
    let (tx, rx) = mpsc::channel();

    for root in canonical_roots(cli)? {
        let filter = FilterChain::from_settings(&root, &config.filter)?;
        let options = WatchOptions::from_settings(&config.watch).with_filter(filter);
        registry
            .register(&root, options, ChannelSubscriber::new(&root, tx.clone()))
            .with_context(|| format!("Failed to watch {}", root.display()))?;
    }
    drop(tx);

    if printer.format == OutputFormat::Text {
        eprintln!("Press Ctrl+C to quit");
    }

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    while running.load(Ordering::SeqCst) {
        match rx.recv_timeout(Duration::from_millis(100)) {
            Ok(event) => printer.print_event(&event)?,
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            // Every watch has ended on its own
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    registry.shutdown();
    for event in rx.try_iter() {
        printer.print_event(&event)?;
    }

    Ok(())
}

struct Printer {
    format: OutputFormat,
    color: bool,
}

#[derive(Serialize)]
struct JsonRecord<'a> {
    timestamp: DateTime<Local>,
    root: &'a Path,
    kind: ChangeKind,
    path: &'a Path,
    is_directory: bool,
    size: Option<u64>,
}

impl Printer {
    fn print_event(&self, event: &MonitorEvent) -> Result<()> {
        match event {
            MonitorEvent::Registered { root, entries } => {
                tracing::info!("Watching {} ({} entries)", root.display(), entries);
            }
            MonitorEvent::FilesChanged { root, changes } => self.print_batch(root, changes)?,
            MonitorEvent::MonitoringError { root, message } => {
                tracing::warn!("{}: {}", root.display(), message);
            }
            MonitorEvent::Unregistered { root } => {
                tracing::info!("Stopped watching {}", root.display());
            }
        }
        Ok(())
    }

    fn print_batch(&self, root: &Path, changes: &[ChangeEvent]) -> Result<()> {
        let now = Local::now();
        match self.format {
            OutputFormat::Text => {
                for change in changes {
                    self.print_text_change(&now, change);
                }
                let stats = BatchStats::from_changes(changes);
                if stats.total() > 1 {
                    println!(
                        "--- {}: {} added, {} modified, {} removed",
                        root.display(),
                        stats.added,
                        stats.modified,
                        stats.removed
                    );
                }
            }
            OutputFormat::Json => {
                for change in changes {
                    let record = JsonRecord {
                        timestamp: now,
                        root,
                        kind: change.kind,
                        path: change.path(),
                        is_directory: change.info.is_directory(),
                        size: change.info.size(),
                    };
                    println!("{}", serde_json::to_string(&record)?);
                }
            }
            OutputFormat::Compact => {
                for change in changes {
                    println!("{} {}", change.kind.short_label(), change.path().display());
                }
            }
        }
        Ok(())
    }

    fn print_text_change(&self, now: &DateTime<Local>, change: &ChangeEvent) {
        let time_str = now.format("%H:%M:%S");
        let suffix = if change.info.is_directory() { "/" } else { "" };

        if self.color {
            let color = match change.kind {
                ChangeKind::Added => "\x1b[32m",    // Green
                ChangeKind::Modified => "\x1b[33m", // Yellow
                ChangeKind::Removed => "\x1b[31m",  // Red
            };
            println!(
                "[{}] {}{:<8}\x1b[0m {}{}",
                time_str,
                color,
                change.kind.label(),
                change.path().display(),
                suffix
            );
        } else {
            println!(
                "[{}] {:<8} {}{}",
                time_str,
                change.kind.label(),
                change.path().display(),
                suffix
            );
        }
    }
}
