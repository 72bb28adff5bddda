//! Repository scan for project and solution descriptors

use std::collections::HashSet;
use std::path::Path;

use tracing::{debug, info, instrument};
use walkdir::WalkDir;

use crate::error::{GraphError, Result};
use crate::ignore::IgnoreRules;
use crate::project::{to_repo_path, Project, Solution, PROJECT_EXTENSIONS};

/// Everything found by a repository scan
#[derive(Debug, Clone, Default)]
pub struct RepositoryScan {
    /// Discovered projects, sorted by path
    pub projects: Vec<Project>,
    /// Discovered solutions, sorted by path
    pub solutions: Vec<Solution>,
}

/// Walk the repository and parse every project and solution descriptor.
#[instrument(skip_all, fields(root = %root.display()))]
pub fn scan_repository(root: &Path, rules: &IgnoreRules) -> Result<RepositoryScan> {
    let mut scan = RepositoryScan::default();
    let mut seen: HashSet<String> = HashSet::new();

    let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
        if entry.depth() == 0 {
            return true;
        }
        let relative = to_repo_path(root, entry.path());
        !rules.is_ignored(&relative, entry.file_type().is_dir())
    });

    for entry in walker.flatten() {
        if !entry.file_type().is_file() {
            continue;
        }

        let ext = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();
        let relative = to_repo_path(root, entry.path());

        if PROJECT_EXTENSIONS.contains(&ext.as_str()) {
            let content =
                std::fs::read_to_string(entry.path()).map_err(|e| GraphError::DescriptorRead {
                    path: entry.path().to_path_buf(),
                    source: e,
                })?;
            let project = Project::parse(&relative, &content);
            if !seen.insert(project.path.clone()) {
                return Err(GraphError::DuplicateProject(project.path).into());
            }
            debug!(
                project = %project.path,
                references = project.references.len(),
                is_test = project.is_test,
                "discovered project"
            );
            scan.projects.push(project);
        } else if ext == "sln" || ext == "slnx" {
            let content =
                std::fs::read_to_string(entry.path()).map_err(|e| GraphError::SolutionRead {
                    path: entry.path().to_path_buf(),
                    source: e,
                })?;
            let solution = Solution::parse(&relative, &content);
            debug!(
                solution = %solution.path,
                members = solution.projects.len(),
                "discovered solution"
            );
            scan.solutions.push(solution);
        }
    }

    scan.projects.sort_by(|a, b| a.path.cmp(&b.path));
    scan.solutions.sort_by(|a, b| a.path.cmp(&b.path));

    info!(
        projects = scan.projects.len(),
        solutions = scan.solutions.len(),
        "repository scan complete"
    );
    Ok(scan)
}
