//! Git repository handle

use std::path::{Path, PathBuf};

use git2::Repository;
use tracing::{debug, info, instrument};

use skipr_core::error::VcsError;

/// Result type for git operations
pub type Result<T> = std::result::Result<T, VcsError>;

/// Map a git2 failure onto the backend variant
pub(crate) fn backend(e: git2::Error) -> VcsError {
    VcsError::Backend(e.message().to_string())
}

/// Git repository wrapper
pub struct GitRepo {
    pub(crate) repo: Repository,
    root: PathBuf,
}

impl GitRepo {
    /// Open a repository at the given path
    #[instrument(fields(path = %path.display()))]
    pub fn open(path: &Path) -> Result<Self> {
        info!(path = %path.display(), "opening git repository");
        let repo = Repository::open(path).map_err(|e| {
            if e.code() == git2::ErrorCode::NotFound {
                VcsError::NotARepository(path.to_path_buf())
            } else {
                VcsError::OpenFailed(e.to_string())
            }
        })?;
        Self::from_repository(repo)
    }

    /// Discover and open a repository by searching parent directories
    #[instrument(fields(start_path = %start_path.display()))]
    pub fn discover(start_path: &Path) -> Result<Self> {
        debug!(start_path = %start_path.display(), "discovering git repository");
        let repo = Repository::discover(start_path).map_err(|e| {
            if e.code() == git2::ErrorCode::NotFound {
                VcsError::NotARepository(start_path.to_path_buf())
            } else {
                VcsError::OpenFailed(e.to_string())
            }
        })?;
        Self::from_repository(repo)
    }

    fn from_repository(repo: Repository) -> Result<Self> {
        // Paths are reported relative to the working tree, so bare
        // repositories are of no use here.
        let root = repo
            .workdir()
            .map(Path::to_path_buf)
            .ok_or_else(|| VcsError::OpenFailed("repository has no working tree".to_string()))?;
        Ok(Self { repo, root })
    }

    /// Working tree root; every reported path is relative to it
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the HEAD commit
    pub fn head_commit(&self) -> Result<git2::Commit<'_>> {
        let head = match self.repo.head() {
            Ok(head) => head,
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => {
                return Err(VcsError::NoCommits)
            }
            Err(e) => return Err(backend(e)),
        };
        head.peel_to_commit().map_err(backend)
    }

    /// Short id of HEAD, with a `-dirty` suffix when the tree has local changes
    pub fn describe_head(&self) -> Result<String> {
        let commit = match self.head_commit() {
            Ok(commit) => commit,
            Err(VcsError::NoCommits) => return Ok("(no commits)".to_string()),
            Err(e) => return Err(e),
        };
        let id = commit.id().to_string();
        let short = &id[..id.len().min(12)];
        if self.is_clean()? {
            Ok(short.to_string())
        } else {
            Ok(format!("{}-dirty", short))
        }
    }
}
