//! Repository context shared by commands

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use tracing::{debug, info};

use skipr_core::config::load_config_or_default;
use skipr_core::{scan_repository, Config, IgnoreRules, ProjectGraph, Solution, VcsProvider};
use skipr_git::GitRepo;
use skipr_tasks::ContentCache;

/// Configuration, ignore rules and the project graph for one repository
pub struct Workspace {
    pub root: PathBuf,
    pub config: Config,
    pub rules: Arc<IgnoreRules>,
    pub graph: Arc<ProjectGraph>,
    pub solutions: Vec<Solution>,
    vcs: Option<GitRepo>,
}

impl Workspace {
    /// Load the workspace containing `cwd`. The git root is the repository
    /// root when there is one.
    pub fn load(cwd: &Path) -> anyhow::Result<Self> {
        let vcs = match GitRepo::discover(cwd) {
            Ok(repo) => Some(repo),
            Err(e) => {
                debug!(error = %e, "no git repository; change detection disabled");
                None
            }
        };
        let root = vcs
            .as_ref()
            .map(|repo| repo.root().to_path_buf())
            .unwrap_or_else(|| cwd.to_path_buf());

        let (config, config_path) = load_config_or_default(&root).context("Failed to load configuration")?;
        if let Some(path) = &config_path {
            debug!(path = %path.display(), "using config file");
        }

        let rules = IgnoreRules::load(&root, &config.ignore.ignore_file, &config.ignore.patterns)
            .context("Failed to load ignore rules")?;
        let scan = scan_repository(&root, &rules).context("Failed to scan repository")?;
        let graph = ProjectGraph::build(&scan.projects);
        info!(
            root = %root.display(),
            projects = graph.len(),
            solutions = scan.solutions.len(),
            "workspace loaded"
        );

        Ok(Self {
            root,
            config,
            rules: Arc::new(rules),
            graph: Arc::new(graph),
            solutions: scan.solutions,
            vcs,
        })
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.root.join(&self.config.engine.cache_dir)
    }

    pub fn open_cache(&self) -> anyhow::Result<ContentCache> {
        ContentCache::open(self.cache_dir()).context("Failed to open result cache")
    }

    fn repo(&self) -> anyhow::Result<&GitRepo> {
        self.vcs
            .as_ref()
            .context("Change detection needs a git repository (use --all to run everything)")
    }

    /// Revision id for display
    pub fn revision(&self) -> String {
        self.vcs
            .as_ref()
            .and_then(|repo| repo.revision().ok())
            .unwrap_or_else(|| "(no repository)".to_string())
    }

    /// Uncommitted changes, or changes since `since` when given
    pub fn changed_files(&self, since: Option<&str>) -> anyhow::Result<Vec<String>> {
        let files = self
            .repo()?
            .changed_files(since)
            .with_context(|| match since {
                Some(reference) => format!("Failed to list changes since {}", reference),
                None => "Failed to list uncommitted changes".to_string(),
            })?;
        debug!(files = files.len(), "changed files detected");
        Ok(files)
    }
}
