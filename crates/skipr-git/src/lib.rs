//! skipr git - change detection backed by git
//!
//! Implements [`VcsProvider`] over a `git2` repository: the HEAD revision,
//! uncommitted files, and files changed since an arbitrary reference.

mod diff;
mod repository;
mod status;

use skipr_core::error::VcsError;
use skipr_core::VcsProvider;

pub use repository::{GitRepo, Result};

impl VcsProvider for GitRepo {
    fn revision(&self) -> std::result::Result<String, VcsError> {
        self.describe_head()
    }

    fn uncommitted_files(&self) -> std::result::Result<Vec<String>, VcsError> {
        self.uncommitted()
    }

    fn changed_since(&self, reference: &str) -> std::result::Result<Vec<String>, VcsError> {
        self.changed_since_reference(reference)
    }
}
