//! Version control collaborator
//!
//! The engine only consumes the outputs of version control: a display-only
//! revision id and lists of repo-relative changed paths.

use crate::error::VcsError;

/// Read-only view of a working copy
pub trait VcsProvider {
    /// Opaque current revision id, for display
    fn revision(&self) -> Result<String, VcsError>;

    /// Staged, unstaged and untracked files
    fn uncommitted_files(&self) -> Result<Vec<String>, VcsError>;

    /// Files changed between `reference` and the working copy, including
    /// uncommitted changes.
    ///
    /// Fails with [`VcsError::UnknownReference`] when the reference cannot be
    /// resolved.
    fn changed_since(&self, reference: &str) -> Result<Vec<String>, VcsError>;

    /// Changed files relative to `reference`, or only the uncommitted ones
    /// when no reference is given
    fn changed_files(&self, reference: Option<&str>) -> Result<Vec<String>, VcsError> {
        let mut files = match reference {
            Some(reference) => self.changed_since(reference)?,
            None => self.uncommitted_files()?,
        };
        files.sort();
        files.dedup();
        Ok(files)
    }
}
