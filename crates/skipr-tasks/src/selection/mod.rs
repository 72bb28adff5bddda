//! Test subset selection
//!
//! For a test project and its changed files, decide whether the run can be
//! narrowed. Strategies are tried in order (coverage, naming heuristics,
//! changed-test-files-only) and the first that applies wins. Every strategy
//! is fail-closed: any doubt means no narrowing.

mod filter;
mod heuristics;
mod index;
mod safety;

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, instrument};

use skipr_core::project::is_under;
use skipr_core::{IgnoreRules, Project};

use crate::coverage::CoverageStore;
use crate::session::Session;

pub use filter::{combine, excluded_categories};
pub use heuristics::Heuristic;
pub use index::{is_test_file_name, SourceFile, TestClass, TestIndex, TestMethod};
pub use safety::{check_lone_test_file, is_helper_name, SafetyRejection};

/// Which strategy produced a filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionStrategy {
    Coverage,
    Heuristic,
    TestFilesOnly,
}

impl std::fmt::Display for SelectionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Coverage => write!(f, "coverage"),
            Self::Heuristic => write!(f, "heuristics"),
            Self::TestFilesOnly => write!(f, "changed test files"),
        }
    }
}

/// Outcome of one selection decision
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterResult {
    /// Whether the run was narrowed
    pub can_filter: bool,
    /// Expression to pass to the runner; the user's filter alone when
    /// nothing was computed
    pub filter_expression: String,
    /// Fully qualified tests the computed filter selects
    pub matched_tests: Vec<String>,
    /// Human-readable explanation
    pub reason: String,
    /// Every matched test is excluded by the user's filter; the caller
    /// should skip the run
    pub excluded_by_user_filter: bool,
    pub strategy: Option<SelectionStrategy>,
}

#[derive(Debug, Default)]
struct Selection {
    classes: BTreeSet<String>,
    tests: BTreeSet<String>,
}

/// Chooses test subsets for test projects
pub struct TestSelector {
    root: PathBuf,
    rules: Arc<IgnoreRules>,
    heuristics: Vec<Heuristic>,
    coverage: Option<CoverageStore>,
    session: Arc<Session>,
}

impl TestSelector {
    /// Selector with coverage and heuristics disabled
    pub fn new(root: impl Into<PathBuf>, rules: Arc<IgnoreRules>, session: Arc<Session>) -> Self {
        Self {
            root: root.into(),
            rules,
            heuristics: Vec::new(),
            coverage: None,
            session,
        }
    }

    /// Enable naming heuristics, in evaluation order
    pub fn with_heuristics(mut self, heuristics: Vec<Heuristic>) -> Self {
        self.heuristics = heuristics;
        self
    }

    /// Consult coverage maps from this store
    pub fn with_coverage(mut self, store: CoverageStore) -> Self {
        self.coverage = Some(store);
        self
    }

    /// Decide the filter for `project` given the changed files under its
    /// relevant directories
    #[instrument(skip_all, fields(project = %project.path, changed = changed_files.len()))]
    pub fn get_filter(
        &self,
        project: &Project,
        changed_files: &[String],
        user_filter: Option<&str>,
    ) -> FilterResult {
        let user = user_filter.map(str::trim).filter(|u| !u.is_empty());

        // Ignored files never reach the content hash, so they cannot veto
        // narrowing either.
        let changed: Vec<String> = changed_files
            .iter()
            .filter(|f| !self.rules.is_ignored(f, false))
            .cloned()
            .collect();
        if changed.len() < changed_files.len() {
            debug!(ignored = changed_files.len() - changed.len(), "dropped ignored changed files");
        }
        if changed.is_empty() {
            return unfiltered("no changed files", user);
        }
        let changed_files = changed.as_slice();

        let index = TestIndex::build(&self.root, &project.dir, &self.rules);
        let mut rejections: Vec<String> = Vec::new();

        for strategy in [
            SelectionStrategy::Coverage,
            SelectionStrategy::Heuristic,
            SelectionStrategy::TestFilesOnly,
        ] {
            let attempt = match strategy {
                SelectionStrategy::Coverage => self.by_coverage(project, changed_files, &index),
                SelectionStrategy::Heuristic => self.by_heuristics(project, changed_files, &index),
                SelectionStrategy::TestFilesOnly => by_test_files(project, changed_files, &index),
            };
            match attempt {
                Ok(selection) => return finish(strategy, selection, &index, user),
                Err(reason) => {
                    debug!(%strategy, %reason, "strategy rejected");
                    rejections.push(format!("{}: {}", strategy, reason));
                }
            }
        }

        unfiltered(&rejections.join("; "), user)
    }

    fn by_coverage(
        &self,
        project: &Project,
        changed: &[String],
        index: &TestIndex,
    ) -> Result<Selection, String> {
        let store = self.coverage.as_ref().ok_or("disabled")?;
        let map = store.load(&project.path).ok_or("no coverage map")?;
        let mut selection = Selection::default();

        for file in changed {
            if is_test_file(project, file, index) {
                check_lone_test_file(index, file).map_err(|e| e.to_string())?;
                selection.classes.extend(test_classes_of(index, file));
                continue;
            }
            match map.tests_for_file(file) {
                Some(tests) if !tests.is_empty() => selection.tests.extend(tests.iter().cloned()),
                _ => {
                    if self.session.first_time(&format!("coverage-gap:{}", project.path)) {
                        info!(
                            project = %project.path,
                            file = %file,
                            "coverage map has no entry for a changed file; regenerate coverage to enable narrowing"
                        );
                    }
                    return Err(format!("no coverage for {}", file));
                }
            }
        }

        Ok(selection)
    }

    fn by_heuristics(
        &self,
        project: &Project,
        changed: &[String],
        index: &TestIndex,
    ) -> Result<Selection, String> {
        if self.heuristics.is_empty() {
            return Err("none enabled".to_string());
        }
        let mut selection = Selection::default();

        for file in changed {
            if !file.ends_with(".cs") {
                return Err(format!("unrecognized source type: {}", file));
            }
            if is_test_file(project, file, index) {
                check_lone_test_file(index, file).map_err(|e| e.to_string())?;
                selection.classes.extend(test_classes_of(index, file));
                continue;
            }

            let found: BTreeSet<String> = self
                .heuristics
                .iter()
                .flat_map(|h| h.candidates(file, index))
                .collect();
            if found.is_empty() {
                return Err(format!("no heuristic matched {}", file));
            }
            selection.classes.extend(found);
        }

        Ok(selection)
    }
}

fn by_test_files(project: &Project, changed: &[String], index: &TestIndex) -> Result<Selection, String> {
    let mut selection = Selection::default();
    for file in changed {
        if !is_test_file(project, file, index) {
            return Err(format!("non-test file changed: {}", file));
        }
        check_lone_test_file(index, file).map_err(|e| e.to_string())?;
        selection.classes.extend(test_classes_of(index, file));
    }
    Ok(selection)
}

/// A changed file inside the test project that follows test naming or
/// declares tests
fn is_test_file(project: &Project, file: &str, index: &TestIndex) -> bool {
    file.ends_with(".cs")
        && is_under(file, &project.dir)
        && (is_test_file_name(file) || index.file(file).is_some_and(SourceFile::has_tests))
}

fn test_classes_of(index: &TestIndex, file: &str) -> BTreeSet<String> {
    index
        .file(file)
        .map(SourceFile::test_class_names)
        .unwrap_or_default()
}

fn unfiltered(reason: &str, user: Option<&str>) -> FilterResult {
    FilterResult {
        can_filter: false,
        filter_expression: combine(None, user),
        reason: reason.to_string(),
        ..Default::default()
    }
}

fn finish(
    strategy: SelectionStrategy,
    selection: Selection,
    index: &TestIndex,
    user: Option<&str>,
) -> FilterResult {
    let mut clauses = filter::class_filter(&selection.classes);
    clauses.extend(filter::test_filter(&selection.tests));
    if clauses.is_empty() {
        return unfiltered(&format!("{}: selected nothing", strategy), user);
    }
    let computed = filter::any_of(&clauses);

    let mut matched: BTreeSet<String> = selection.tests.clone();
    for class in &selection.classes {
        matched.extend(index.tests_in_class(class));
    }

    let excluded = user
        .map(excluded_categories)
        .is_some_and(|categories| filter::all_excluded(&matched, index, &categories));

    info!(
        %strategy,
        classes = selection.classes.len(),
        tests = matched.len(),
        excluded_by_user_filter = excluded,
        "narrowed test run"
    );

    FilterResult {
        can_filter: true,
        filter_expression: combine(Some(&computed), user),
        matched_tests: matched.into_iter().collect(),
        reason: format!(
            "{} selected {} class(es) and {} test(s)",
            strategy,
            selection.classes.len(),
            selection.tests.len()
        ),
        excluded_by_user_filter: excluded,
        strategy: Some(strategy),
    }
}
