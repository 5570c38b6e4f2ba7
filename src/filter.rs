//! Concrete [`Filter`] implementations used by the command line tool.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use regex::Regex;

use crate::config::FilterSettings;
use crate::core::{FileInfo, Filter};

/// Excludes what git would ignore below `root`, plus `.git` itself.
///
/// Reads `.gitignore` and `.ignore` from the root only.
pub struct IgnoreFilter {
    root: PathBuf,
    gitignore: Gitignore,
    include_hidden: bool,
}

impl IgnoreFilter {
    pub fn new<P: AsRef<Path>>(
        root: P,
        respect_gitignore: bool,
        extra_patterns: &[String],
        include_hidden: bool,
    ) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let mut builder = GitignoreBuilder::new(&root);

        if respect_gitignore {
            for name in [".gitignore", ".ignore"] {
                let file = root.join(name);
                if file.is_file() {
                    if let Some(err) = builder.add(&file) {
                        tracing::warn!("Error reading {}: {}", file.display(), err);
                    }
                }
            }
        }

        for pattern in extra_patterns {
            builder
                .add_line(None, pattern)
                .with_context(|| format!("Invalid ignore pattern: {}", pattern))?;
        }

        let gitignore = builder.build().context("Failed to build ignore rules")?;
        Ok(Self {
            root,
            gitignore,
            include_hidden,
        })
    }
}

impl Filter for IgnoreFilter {
    fn accept(&self, info: &FileInfo) -> bool {
        let path = info.path();
        let Ok(relative) = path.strip_prefix(&self.root) else {
            return true;
        };
        if relative.as_os_str().is_empty() {
            return true;
        }

        // Always ignore .git directory itself
        if relative.components().any(|comp| comp.as_os_str() == ".git") {
            return false;
        }

        if !self.include_hidden {
            let hidden = path
                .file_name()
                .and_then(|name| name.to_str())
                .map_or(false, |name| name.starts_with('.'));
            if hidden {
                return false;
            }
        }

        !self
            .gitignore
            .matched_path_or_any_parents(path, info.is_directory())
            .is_ignore()
    }
}

/// Keeps files with one of the given extensions. Directories always pass so
/// the scan can reach files inside them.
pub struct ExtensionFilter {
    extensions: Vec<String>,
}

impl ExtensionFilter {
    pub fn new(extensions: &[String]) -> Self {
        Self {
            extensions: extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_string())
                .collect(),
        }
    }
}

impl Filter for ExtensionFilter {
    fn accept(&self, info: &FileInfo) -> bool {
        if info.is_directory() || self.extensions.is_empty() {
            return true;
        }
        match info.path().extension().and_then(|s| s.to_str()) {
            Some(ext) => self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)),
            None => false,
        }
    }
}

/// Excludes any entry whose full path matches one of the patterns.
pub struct RegexFilter {
    patterns: Vec<Regex>,
}

impl RegexFilter {
    pub fn new(patterns: &[String]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| Regex::new(p).with_context(|| format!("Invalid exclude regex: {}", p)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }
}

impl Filter for RegexFilter {
    fn accept(&self, info: &FileInfo) -> bool {
        let path = info.path().to_string_lossy();
        !self.patterns.iter().any(|re| re.is_match(&path))
    }
}

/// Accepts an entry only if every filter in the chain does.
#[derive(Default)]
pub struct FilterChain {
    filters: Vec<Box<dyn Filter>>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, filter: impl Filter + 'static) -> Self {
        self.filters.push(Box::new(filter));
        self
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Builds the filter stack described by the configuration for `root`.
    pub fn from_settings(root: &Path, settings: &FilterSettings) -> Result<Self> {
        let mut chain = Self::new().with(IgnoreFilter::new(
            root,
            settings.respect_gitignore,
            &settings.ignore_patterns,
            settings.include_hidden,
        )?);
        if !settings.exclude_regex.is_empty() {
            chain = chain.with(RegexFilter::new(&settings.exclude_regex)?);
        }
        if !settings.extensions.is_empty() {
            chain = chain.with(ExtensionFilter::new(&settings.extensions));
        }
        Ok(chain)
    }
}

impl Filter for FilterChain {
    fn accept(&self, info: &FileInfo) -> bool {
        self.filters.iter().all(|f| f.accept(info))
    }
}
