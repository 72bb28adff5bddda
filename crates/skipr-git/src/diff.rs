//! Changes relative to a reference

use std::collections::BTreeSet;

use git2::{DiffOptions, ErrorCode};
use tracing::{debug, instrument};

use skipr_core::error::VcsError;

use crate::repository::{backend, GitRepo, Result};

impl GitRepo {
    /// Files that differ between `reference` and the working tree (index
    /// and untracked files included), sorted
    #[instrument(skip(self))]
    pub fn changed_since_reference(&self, reference: &str) -> Result<Vec<String>> {
        let object = self.repo.revparse_single(reference).map_err(|e| {
            if matches!(e.code(), ErrorCode::NotFound | ErrorCode::Ambiguous | ErrorCode::InvalidSpec) {
                VcsError::UnknownReference(reference.to_string())
            } else {
                backend(e)
            }
        })?;
        let tree = object
            .peel_to_tree()
            .map_err(|_| VcsError::UnknownReference(reference.to_string()))?;

        let mut opts = DiffOptions::new();
        opts.include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_ignored(false);

        let diff = self
            .repo
            .diff_tree_to_workdir_with_index(Some(&tree), Some(&mut opts))
            .map_err(backend)?;

        let mut files = BTreeSet::new();
        for delta in diff.deltas() {
            for file in [delta.old_file(), delta.new_file()] {
                if let Some(path) = file.path() {
                    files.insert(path.to_string_lossy().replace('\\', "/"));
                }
            }
        }

        debug!(reference, count = files.len(), "collected changed files");
        Ok(files.into_iter().collect())
    }
}
