//! Ignore rules for repository walks
//!
//! Combines a fixed deny-list of non-build content (docs, CI descriptors,
//! build output directories) with gitignore-style patterns read from the
//! repository root.

use std::path::Path;

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use tracing::debug;

use crate::error::{GraphError, Result};

/// Directory names that never contribute to a build
pub const DENIED_DIRS: &[&str] = &[
    ".git",
    ".vs",
    ".vscode",
    ".idea",
    ".github",
    ".gitlab",
    ".skipr",
    "bin",
    "obj",
    "node_modules",
    "TestResults",
    "docs",
];

/// File patterns that never contribute to a build
pub const DENIED_FILES: &[&str] = &[
    "*.md",
    "*.markdown",
    "LICENSE*",
    ".gitignore",
    ".gitattributes",
    ".skiprignore",
    ".gitlab-ci.yml",
    "azure-pipelines.yml",
    "appveyor.yml",
    ".travis.yml",
    "Jenkinsfile",
    "*.user",
    "*.suo",
];

/// Compiled ignore rules
#[derive(Debug, Clone)]
pub struct IgnoreRules {
    /// Built-in file deny-list; user patterns cannot re-include these
    denied: GlobSet,
    /// `.gitignore`, the tool ignore file and configured patterns, with
    /// gitignore semantics (anchoring, directory-only, `!` negation)
    user: Gitignore,
}

impl IgnoreRules {
    /// Only the built-in deny-list
    pub fn builtin() -> Self {
        Self {
            denied: denied_files().unwrap_or_else(|_| GlobSet::empty()),
            user: Gitignore::empty(),
        }
    }

    /// Load rules from the repository root: `.gitignore`, the tool ignore
    /// file, and any extra configured patterns, in that order.
    pub fn load(root: &Path, ignore_file: &str, extra: &[String]) -> Result<Self> {
        let mut lines: Vec<String> = Vec::new();

        for name in [".gitignore", ignore_file] {
            let path = root.join(name);
            if let Ok(content) = std::fs::read_to_string(&path) {
                debug!(path = %path.display(), "reading ignore file");
                lines.extend(content.lines().map(str::to_string));
            }
        }
        lines.extend(extra.iter().cloned());

        Self::from_patterns(&lines)
    }

    /// Build rules from gitignore-style lines. Later lines win, so a `!`
    /// line re-includes a path an earlier pattern ignored.
    pub fn from_patterns(lines: &[String]) -> Result<Self> {
        let mut builder = GitignoreBuilder::new(".");
        for line in lines {
            builder.add_line(None, line).map_err(|e| invalid(line, e))?;
        }
        let user = builder.build().map_err(|e| invalid("<ignore set>", e))?;

        Ok(Self {
            denied: denied_files()?,
            user,
        })
    }

    /// Number of user patterns, negations included (excluding the built-in
    /// deny-list)
    pub fn pattern_count(&self) -> usize {
        self.user.len()
    }

    /// Whether a directory name is on the fixed deny-list
    pub fn is_denied_dir(name: &str) -> bool {
        DENIED_DIRS.iter().any(|d| d.eq_ignore_ascii_case(name))
    }

    /// Check a repo-relative path (`/` separated). A path is ignored when it
    /// or any of its parent directories is.
    pub fn is_ignored(&self, relative: &str, is_dir: bool) -> bool {
        let relative = relative.trim_matches('/');
        if relative.is_empty() {
            return false;
        }

        let mut parts: Vec<&str> = relative.split('/').collect();
        let name = parts.pop().unwrap_or(relative);
        if parts.iter().any(|p| Self::is_denied_dir(p)) || (is_dir && Self::is_denied_dir(name)) {
            return true;
        }
        if !is_dir && self.denied.is_match(relative) {
            return true;
        }
        self.user
            .matched_path_or_any_parents(relative, is_dir)
            .is_ignore()
    }
}

fn denied_files() -> Result<GlobSet> {
    let mut set = GlobSetBuilder::new();
    for pattern in DENIED_FILES {
        let pattern = format!("**/{}", pattern);
        let glob = GlobBuilder::new(&pattern)
            .literal_separator(true)
            .build()
            .map_err(|e| invalid(&pattern, e))?;
        set.add(glob);
    }
    set.build().map_err(|e| invalid("<deny-list>", e).into())
}

fn invalid(pattern: &str, e: impl std::fmt::Display) -> GraphError {
    GraphError::InvalidPattern {
        pattern: pattern.to_string(),
        message: e.to_string(),
    }
}
