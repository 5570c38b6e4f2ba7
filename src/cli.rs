use std::path::PathBuf;
use clap::{Parser, ValueEnum};

use crate::config::TreewatchConfig;

#[derive(Parser)]
#[command(name = "treewatch")]
#[command(author = "xicv")]
#[command(version = "0.1.0")]
#[command(about = "Recursive filesystem change monitor")]
#[command(long_about = "treewatch keeps an in-memory mirror of one or more directory trees and prints ordered batches of Added, Modified and Removed entries as the filesystem changes. Respects .gitignore patterns by default.")]
pub struct Cli {
    /// Directories to watch
    #[arg(value_name = "PATHS", help = "Paths to watch (defaults to current directory)")]
    pub paths: Vec<PathBuf>,

    /// Configuration file
    #[arg(short, long, value_name = "FILE", help = "TOML configuration file")]
    pub config: Option<PathBuf>,

    /// Only track the direct children of each root
    #[arg(long, help = "Do not descend into subdirectories")]
    pub no_recursive: bool,

    /// Periodic resync interval
    #[arg(long, value_name = "SECS", help = "Rescan each root every SECS seconds (0 disables)")]
    pub resync: Option<u64>,

    /// Output format
    #[arg(long, default_value = "text", help = "Output format")]
    pub output: OutputFormat,

    /// Disable colors in output
    #[arg(long, help = "Disable colored output")]
    pub no_color: bool,

    /// Ignore .gitignore and .ignore files
    #[arg(long, help = "Do not apply .gitignore rules")]
    pub no_gitignore: bool,

    /// Ignore additional patterns beyond .gitignore
    #[arg(long, value_delimiter = ',', help = "Additional patterns to ignore")]
    pub ignore: Option<Vec<String>>,

    /// Exclude paths matching regular expressions
    #[arg(long, value_delimiter = ',', help = "Regular expressions of paths to exclude")]
    pub exclude: Option<Vec<String>>,

    /// Show only specific file types
    #[arg(long, value_delimiter = ',', help = "File extensions to watch (e.g., rs,py,js)")]
    pub extensions: Option<Vec<String>>,

    /// Print the initial tree and exit
    #[arg(long, help = "Scan once, print the initial batch and exit")]
    pub once: bool,

    /// Enable verbose logging
    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Timestamped, colored lines (default)
    Text,
    /// One JSON object per change for scripting
    Json,
    /// Compact single-line format
    Compact,
}

impl Cli {
    pub fn get_watch_paths(&self) -> Vec<PathBuf> {
        if self.paths.is_empty() {
            vec![std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))]
        } else {
            self.paths.clone()
        }
    }

    /// Command line flags override the loaded configuration.
    pub fn apply_to(&self, config: &mut TreewatchConfig) {
        if self.no_recursive {
            config.watch.recursive = false;
        }
        if let Some(secs) = self.resync {
            config.watch.resync_interval_secs = secs;
        }
        if self.no_gitignore {
            config.filter.respect_gitignore = false;
        }
        if let Some(ref patterns) = self.ignore {
            config.filter.ignore_patterns.extend(patterns.iter().cloned());
        }
        if let Some(ref patterns) = self.exclude {
            config.filter.exclude_regex.extend(patterns.iter().cloned());
        }
        if let Some(ref extensions) = self.extensions {
            config.filter.extensions = extensions.clone();
        }
    }

    pub fn setup_logging(&self) {
        let level = if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        };

        tracing_subscriber::fmt()
            .with_max_level(level)
            .with_writer(std::io::stderr)
            .with_ansi(!self.no_color)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .init();
    }

    pub fn validate(&self) -> Result<(), String> {
        for path in self.get_watch_paths() {
            if !path.exists() {
                return Err(format!("Path does not exist: {}", path.display()));
            }

            if !path.is_dir() {
                return Err(format!("Path is not a directory: {}", path.display()));
            }
        }

        if let Some(ref config) = self.config {
            if !config.is_file() {
                return Err(format!("Config file not found: {}", config.display()));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_flags() {
        let cli = Cli::parse_from([
            "treewatch",
            "/a",
            "/b",
            "--no-recursive",
            "--resync",
            "30",
            "--output",
            "json",
            "--extensions",
            "rs,toml",
        ]);

        assert_eq!(cli.get_watch_paths(), vec![PathBuf::from("/a"), PathBuf::from("/b")]);
        assert!(cli.no_recursive);
        assert_eq!(cli.resync, Some(30));
        assert_eq!(cli.output, OutputFormat::Json);
        assert_eq!(cli.extensions, Some(vec!["rs".to_string(), "toml".to_string()]));
        assert!(!cli.once);
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::parse_from([
            "treewatch",
            "--no-gitignore",
            "--ignore",
            "*.tmp,*.bak",
            "--exclude",
            "generated",
        ]);
        let mut config = TreewatchConfig::default();
        config.filter.ignore_patterns.push("*.log".to_string());

        cli.apply_to(&mut config);

        assert!(config.watch.recursive);
        assert!(!config.filter.respect_gitignore);
        assert_eq!(config.filter.ignore_patterns, vec!["*.log", "*.tmp", "*.bak"]);
        assert_eq!(config.filter.exclude_regex, vec!["generated"]);
    }

    #[test]
    fn test_validate_paths() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let file = temp_dir.path().join("file.txt");
        std::fs::write(&file, "x").unwrap();

        let ok = Cli::parse_from(["treewatch".into(), temp_dir.path().to_path_buf()]);
        assert!(ok.validate().is_ok());

        let not_dir = Cli::parse_from(["treewatch".into(), file]);
        assert!(not_dir.validate().is_err());

        let missing = Cli::parse_from(["treewatch".into(), temp_dir.path().join("missing")]);
        assert!(missing.validate().is_err());
    }
}
