//! skipr core - project model and dependency graph
//!
//! This crate provides the foundational types, error handling, configuration,
//! repository discovery and the project dependency graph used by the
//! incremental execution engine.

pub mod config;
pub mod discovery;
pub mod error;
pub mod graph;
pub mod ignore;
pub mod project;
pub mod vcs;

pub use config::{BatchPolicy, Config};
pub use discovery::{scan_repository, RepositoryScan};
pub use error::{ConfigError, GraphError, Result, SkiprError, VcsError};
pub use graph::{compute_affected, ProjectGraph};
pub use ignore::IgnoreRules;
pub use project::{is_under, normalize_path, to_repo_path, Project, Solution};
pub use vcs::VcsProvider;
