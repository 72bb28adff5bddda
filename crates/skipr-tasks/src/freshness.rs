//! Restore/build skip check
//!
//! Compares the newest source timestamp under a project's relevant
//! directories against its restore manifest and build output. The result
//! only produces advisory flags; it never affects cache keys.

use std::fs;
use std::path::Path;
use std::time::SystemTime;

use tracing::debug;
use walkdir::WalkDir;

use skipr_core::{IgnoreRules, Project};

use crate::hashing::collect_files;

/// Flag telling the tool to skip restore
pub const NO_RESTORE: &str = "--no-restore";
/// Flag telling the tool to skip building
pub const NO_BUILD: &str = "--no-build";

/// Phases that can be skipped for one job
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Freshness {
    pub skip_restore: bool,
    pub skip_build: bool,
}

impl Freshness {
    /// Advisory flags for the tool invocation
    pub fn flags(&self) -> Vec<String> {
        let mut flags = Vec::new();
        if self.skip_build {
            flags.push(NO_BUILD.to_string());
        }
        if self.skip_restore {
            flags.push(NO_RESTORE.to_string());
        }
        flags
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Newest modification time of any file under `dir`
fn newest_in(dir: &Path) -> Option<SystemTime> {
    WalkDir::new(dir)
        .into_iter()
        .flatten()
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok().and_then(|m| m.modified().ok()))
        .max()
}

/// Newest modification time of any non-ignored source file
pub fn newest_source(root: &Path, dirs: &[String], rules: &IgnoreRules) -> Option<SystemTime> {
    collect_files(root, dirs, rules)
        .iter()
        .filter_map(|f| modified(&root.join(f)))
        .max()
}

/// Probe whether restore (and, when `allow_skip_build`, build) can be
/// skipped for `project`
pub fn check(
    root: &Path,
    project: &Project,
    relevant_dirs: &[String],
    rules: &IgnoreRules,
    allow_skip_build: bool,
) -> Freshness {
    let Some(sources) = newest_source(root, relevant_dirs, rules) else {
        return Freshness::default();
    };
    let project_dir = root.join(&project.dir);

    let skip_restore = modified(&project_dir.join("obj").join("project.assets.json"))
        .is_some_and(|manifest| sources < manifest);
    let skip_build = allow_skip_build
        && skip_restore
        && newest_in(&project_dir.join("bin")).is_some_and(|output| sources < output);

    let freshness = Freshness {
        skip_restore,
        skip_build,
    };
    debug!(project = %project.path, ?freshness, "freshness checked");
    freshness
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, rel).unwrap();
    }

    fn age(root: &Path, rel: &str, seconds_ago: u64) {
        let file = fs::File::options().write(true).open(root.join(rel)).unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(seconds_ago))
            .unwrap();
    }

    fn project() -> Project {
        Project::new("src/Core.Tests/Core.Tests.csproj").with_test(true)
    }

    fn dirs() -> Vec<String> {
        vec!["src/Core.Tests".to_string()]
    }

    #[test]
    fn test_nothing_built_yet() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "src/Core.Tests/FooTests.cs");
        let f = check(temp.path(), &project(), &dirs(), &IgnoreRules::builtin(), true);
        assert_eq!(f, Freshness::default());
        assert!(f.flags().is_empty());
    }

    #[test]
    fn test_fresh_restore_and_build() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "src/Core.Tests/FooTests.cs");
        write(temp.path(), "src/Core.Tests/obj/project.assets.json");
        write(temp.path(), "src/Core.Tests/bin/Debug/Core.Tests.dll");
        age(temp.path(), "src/Core.Tests/FooTests.cs", 600);

        let f = check(temp.path(), &project(), &dirs(), &IgnoreRules::builtin(), true);
        assert!(f.skip_restore && f.skip_build);
        assert_eq!(f.flags(), vec![NO_BUILD, NO_RESTORE]);

        let f = check(temp.path(), &project(), &dirs(), &IgnoreRules::builtin(), false);
        assert!(f.skip_restore && !f.skip_build);
    }

    #[test]
    fn test_source_newer_than_manifest() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "src/Core.Tests/obj/project.assets.json");
        write(temp.path(), "src/Core.Tests/FooTests.cs");
        age(temp.path(), "src/Core.Tests/obj/project.assets.json", 600);

        let f = check(temp.path(), &project(), &dirs(), &IgnoreRules::builtin(), true);
        assert!(!f.skip_restore);
        assert!(!f.skip_build);
    }
}
