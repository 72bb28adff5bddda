//! Per-test coverage maps
//!
//! A map is generated by a separate instrumentation pass and is read-only
//! input to test selection.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cache::CacheError;
use crate::hashing::short_hash;

/// Structured output of the coverage-report collaborator for one test
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageReport {
    /// Repo-relative files with at least one execution hit
    pub hit_files: BTreeSet<String>,
    /// Every repo-relative file the report mentions
    pub all_files: BTreeSet<String>,
}

/// One entry of an imported report list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCoverage {
    /// Fully qualified test name
    pub test: String,
    #[serde(flatten)]
    pub report: CoverageReport,
}

/// Bidirectional file/test mapping for one test project
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageMap {
    /// Test project path
    pub project: String,
    file_to_tests: BTreeMap<String, BTreeSet<String>>,
    test_to_files: BTreeMap<String, BTreeSet<String>>,
}

impl CoverageMap {
    /// Build the map from per-test reports.
    ///
    /// Files a report mentions without a hit are recorded with no covering
    /// test from that report.
    pub fn from_reports<I>(project: impl Into<String>, reports: I) -> Self
    where
        I: IntoIterator<Item = (String, CoverageReport)>,
    {
        let mut map = Self {
            project: project.into(),
            ..Default::default()
        };

        for (test, report) in reports {
            for file in &report.all_files {
                map.file_to_tests.entry(file.clone()).or_default();
            }
            let covered = map.test_to_files.entry(test.clone()).or_default();
            for file in &report.hit_files {
                covered.insert(file.clone());
                map.file_to_tests
                    .entry(file.clone())
                    .or_default()
                    .insert(test.clone());
            }
        }

        debug!(
            project = %map.project,
            files = map.file_to_tests.len(),
            tests = map.test_to_files.len(),
            "coverage map built"
        );
        map
    }

    /// Tests covering a file; `None` when the file has no entry at all
    pub fn tests_for_file(&self, file: &str) -> Option<&BTreeSet<String>> {
        self.file_to_tests.get(file)
    }

    /// Files covered by a test
    pub fn files_for_test(&self, test: &str) -> Option<&BTreeSet<String>> {
        self.test_to_files.get(test)
    }

    /// Number of tests in the map
    pub fn test_count(&self) -> usize {
        self.test_to_files.len()
    }

    /// Number of files in the map
    pub fn file_count(&self) -> usize {
        self.file_to_tests.len()
    }

    /// Every file with the tests covering it, in path order
    pub fn files(&self) -> impl Iterator<Item = (&String, &BTreeSet<String>)> {
        self.file_to_tests.iter()
    }
}

/// On-disk coverage maps, one JSON file per test project
#[derive(Debug, Clone)]
pub struct CoverageStore {
    dir: PathBuf,
}

impl CoverageStore {
    /// Store rooted at `<cache_dir>/coverage`
    pub fn new(cache_dir: &Path) -> Self {
        Self {
            dir: cache_dir.join("coverage"),
        }
    }

    fn path_for(&self, project: &str) -> PathBuf {
        self.dir.join(format!("{}.json", short_hash(project)))
    }

    /// Load the map for a project. Missing or unreadable maps yield `None`.
    pub fn load(&self, project: &str) -> Option<CoverageMap> {
        let path = self.path_for(project);
        let contents = fs::read_to_string(&path).ok()?;
        match serde_json::from_str::<CoverageMap>(&contents) {
            Ok(map) if map.project == project => Some(map),
            Ok(map) => {
                warn!(expected = project, found = %map.project, "coverage map belongs to another project");
                None
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unreadable coverage map");
                None
            }
        }
    }

    /// Persist a map, replacing any previous one for the project
    pub fn save(&self, map: &CoverageMap) -> Result<PathBuf, CacheError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(&map.project);
        let json = serde_json::to_string_pretty(map)?;
        fs::write(&path, json)?;
        info!(project = %map.project, path = %path.display(), "coverage map saved");
        Ok(path)
    }
}
