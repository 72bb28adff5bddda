//! Configuration types

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Main configuration for skipr
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Execution engine settings
    pub engine: EngineConfig,

    /// Test subset selection settings
    pub selection: SelectionConfig,

    /// Content hashing ignore rules
    pub ignore: IgnoreConfig,
}

/// How targets sharing a solution are batched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchPolicy {
    /// Batch a solution only when every member is a target
    #[default]
    Auto,
    /// Batch a solution when at least two members are targets
    Force,
    /// Always run projects individually
    Never,
}

impl BatchPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Force => "force",
            Self::Never => "never",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "auto" => Some(Self::Auto),
            "force" => Some(Self::Force),
            "never" | "off" => Some(Self::Never),
            _ => None,
        }
    }
}

impl std::fmt::Display for BatchPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Execution engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Worker count (0 = number of logical CPUs)
    pub concurrency: usize,

    /// Keep running independent jobs after a failure
    pub keep_going: bool,

    /// Solution batching policy
    pub batching: BatchPolicy,

    /// Cache directory, relative to the repository root
    pub cache_dir: PathBuf,

    /// External build/test tool
    pub tool: String,

    /// Capacity of the progress channel; excess lines are dropped
    pub progress_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            concurrency: 0,
            keep_going: false,
            batching: BatchPolicy::Auto,
            cache_dir: PathBuf::from(".skipr").join("cache"),
            tool: "dotnet".to_string(),
            progress_capacity: 256,
        }
    }
}

/// Test subset selection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Enabled naming heuristics (empty = heuristic selection disabled)
    pub heuristics: Vec<String>,

    /// Use coverage maps when available
    pub coverage: bool,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            heuristics: Vec::new(),
            coverage: true,
        }
    }
}

/// Ignore rules applied when hashing project contents
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IgnoreConfig {
    /// Extra glob patterns to ignore
    pub patterns: Vec<String>,

    /// Tool-specific ignore file at the repository root
    pub ignore_file: String,
}

impl Default for IgnoreConfig {
    fn default() -> Self {
        Self {
            patterns: Vec::new(),
            ignore_file: ".skiprignore".to_string(),
        }
    }
}
