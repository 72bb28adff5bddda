//! Error types for skipr

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using SkiprError
pub type Result<T> = std::result::Result<T, SkiprError>;

/// Main error type for skipr operations
#[derive(Debug, Error)]
pub enum SkiprError {
    /// Configuration-related errors
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Project graph errors
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Version control errors
    #[error(transparent)]
    Vcs(#[from] VcsError),
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found at {0}")]
    NotFound(PathBuf),

    /// Invalid configuration value
    #[error("Invalid configuration: {field} - {message}")]
    InvalidValue { field: String, message: String },

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// IO error
    #[error("IO error reading config: {0}")]
    Io(#[from] std::io::Error),
}

/// Project graph and descriptor errors
#[derive(Debug, Error)]
pub enum GraphError {
    /// A project descriptor could not be read
    #[error("Failed to read project descriptor {path}: {source}")]
    DescriptorRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A solution descriptor could not be read
    #[error("Failed to read solution {path}: {source}")]
    SolutionRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Two descriptors resolved to the same project path
    #[error("Duplicate project path: {0}")]
    DuplicateProject(String),

    /// Unknown project referenced by the caller
    #[error("Unknown project: {0}")]
    UnknownProject(String),

    /// Invalid ignore pattern
    #[error("Invalid ignore pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },
}

/// Version control errors
#[derive(Debug, Error)]
pub enum VcsError {
    /// Not inside a repository
    #[error("Not a repository: {0}")]
    NotARepository(PathBuf),

    /// Failed to open the repository
    #[error("Failed to open repository: {0}")]
    OpenFailed(String),

    /// The reference could not be resolved
    #[error("Unknown reference: {0}")]
    UnknownReference(String),

    /// Repository has no commits yet
    #[error("No commits found in repository")]
    NoCommits,

    /// Backend error
    #[error("VCS error: {0}")]
    Backend(String),
}
