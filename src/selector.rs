//! Input file-set selection.
//!
//! A [`Selector`] is a base directory plus include/exclude glob patterns,
//! matched against paths relative to the base with `/` separators:
//!
//! ```text
//! base:    src/
//! include: **/*
//! exclude: img/**/*, css/**/*, js/**/*, **/*.html
//! dot:     true
//! ```
//!
//! `*` never crosses a `/`; `**/` spans any number of directories (including
//! none). Unless the selector opts in with [`Selector::with_dot`], wildcards
//! do not match path components that start with a dot. Exclusions always
//! match dot files, so excluding `img/**/*` also drops `img/.DS_Store`.
//!
//! A base directory that does not exist selects nothing; stages treat that as
//! "no input" rather than an error.

use glob::{MatchOptions, Pattern};
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum SelectError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid glob pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        source: glob::PatternError,
    },
}

/// A file picked by a selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedFile {
    /// Absolute (or root-joined) path on disk.
    pub path: PathBuf,
    /// Path relative to the selector base, `/`-separated.
    pub relative: String,
}

#[derive(Debug, Clone)]
pub struct Selector {
    base: PathBuf,
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
    dot: bool,
}

impl Selector {
    pub fn new(base: impl Into<PathBuf>, include: &[&str]) -> Result<Self, SelectError> {
        Ok(Self {
            base: base.into(),
            include: compile(include)?,
            exclude: Vec::new(),
            dot: false,
        })
    }

    /// Select exactly one file. Glob metacharacters in the name are escaped.
    pub fn file(path: &Path) -> Result<Self, SelectError> {
        let base = path.parent().unwrap_or_else(|| Path::new("")).to_path_buf();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let escaped = Pattern::escape(&name);
        Ok(Self::new(base, &[escaped.as_str()])?.with_dot())
    }

    pub fn exclude(mut self, patterns: &[&str]) -> Result<Self, SelectError> {
        self.exclude.extend(compile(patterns)?);
        Ok(self)
    }

    /// Let wildcards match hidden files and directories.
    pub fn with_dot(mut self) -> Self {
        self.dot = true;
        self
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Whether a base-relative, `/`-separated path is selected.
    pub fn matches(&self, relative: &str) -> bool {
        let include_opts = MatchOptions {
            case_sensitive: true,
            require_literal_separator: true,
            require_literal_leading_dot: !self.dot,
        };
        let exclude_opts = MatchOptions {
            require_literal_leading_dot: false,
            ..include_opts
        };
        self.include
            .iter()
            .any(|p| p.matches_with(relative, include_opts))
            && !self
                .exclude
                .iter()
                .any(|p| p.matches_with(relative, exclude_opts))
    }

    /// Walk the base directory and return matching files, sorted by relative path.
    pub fn select(&self) -> Result<Vec<SelectedFile>, SelectError> {
        if !self.base.is_dir() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        for entry in WalkDir::new(&self.base).sort_by_file_name() {
            let entry = entry.map_err(std::io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(rel) = entry.path().strip_prefix(&self.base) else {
                continue;
            };
            let relative = relative_string(rel);
            if self.matches(&relative) {
                files.push(SelectedFile {
                    path: entry.path().to_path_buf(),
                    relative,
                });
            }
        }
        files.sort_by(|a, b| a.relative.cmp(&b.relative));
        Ok(files)
    }
}

/// Join path components with `/` regardless of platform.
pub fn relative_string(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn compile(patterns: &[&str]) -> Result<Vec<Pattern>, SelectError> {
    patterns
        .iter()
        .map(|p| {
            Pattern::new(p).map_err(|source| SelectError::Pattern {
                pattern: p.to_string(),
                source,
            })
        })
        .collect()
}
