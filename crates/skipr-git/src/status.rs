//! Working tree status

use std::collections::BTreeSet;

use tracing::debug;

use crate::repository::{backend, GitRepo, Result};

impl GitRepo {
    fn statuses(&self) -> Result<git2::Statuses<'_>> {
        let mut opts = git2::StatusOptions::new();
        opts.include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_ignored(false)
            .renames_head_to_index(true);
        self.repo.statuses(Some(&mut opts)).map_err(backend)
    }

    /// Check if the working directory is clean (no uncommitted changes)
    pub fn is_clean(&self) -> Result<bool> {
        let statuses = self.statuses()?;
        Ok(statuses
            .iter()
            .all(|entry| entry.status().is_empty() || entry.status().is_ignored()))
    }

    /// Staged, unstaged and untracked paths, sorted
    pub fn uncommitted(&self) -> Result<Vec<String>> {
        let statuses = self.statuses()?;
        let mut files = BTreeSet::new();

        for entry in statuses.iter() {
            let status = entry.status();
            if status.is_empty() || status.is_ignored() {
                continue;
            }
            if let Some(path) = entry.path() {
                files.insert(path.to_string());
            }
            // The source side of a staged rename changed too
            if let Some(delta) = entry.head_to_index() {
                if let Some(old) = delta.old_file().path() {
                    files.insert(old.to_string_lossy().replace('\\', "/"));
                }
            }
        }

        debug!(count = files.len(), "collected uncommitted files");
        Ok(files.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use git2::{Repository, Signature};
    use std::path::Path;
    use tempfile::TempDir;

    fn setup_repo() -> (TempDir, GitRepo) {
        let temp = TempDir::new().unwrap();
        let repo = Repository::init(temp.path()).unwrap();
        let sig = Signature::now("Test", "test@example.com").unwrap();

        std::fs::create_dir_all(temp.path().join("src/Core")).unwrap();
        std::fs::write(temp.path().join("src/Core/Foo.cs"), "class Foo {}").unwrap();
        let mut index = repo.index().unwrap();
        index.add_path(Path::new("src/Core/Foo.cs")).unwrap();
        index.write().unwrap();

        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        repo.commit(Some("HEAD"), &sig, &sig, "Initial commit", &tree, &[])
            .unwrap();

        let git_repo = GitRepo::open(temp.path()).unwrap();
        (temp, git_repo)
    }

    #[test]
    fn test_is_clean() {
        let (_temp, repo) = setup_repo();
        assert!(repo.is_clean().unwrap());
        assert!(repo.uncommitted().unwrap().is_empty());
    }

    #[test]
    fn test_uncommitted_includes_modified_and_untracked() {
        let (temp, repo) = setup_repo();
        std::fs::write(temp.path().join("src/Core/Foo.cs"), "class Foo { }").unwrap();
        std::fs::create_dir_all(temp.path().join("src/New")).unwrap();
        std::fs::write(temp.path().join("src/New/Bar.cs"), "class Bar {}").unwrap();

        assert!(!repo.is_clean().unwrap());
        assert_eq!(
            repo.uncommitted().unwrap(),
            vec!["src/Core/Foo.cs", "src/New/Bar.cs"]
        );
    }

    #[test]
    fn test_describe_dirty() {
        let (temp, repo) = setup_repo();
        assert!(!repo.describe_head().unwrap().ends_with("-dirty"));
        std::fs::write(temp.path().join("scratch.txt"), "x").unwrap();
        assert!(repo.describe_head().unwrap().ends_with("-dirty"));
    }
}
