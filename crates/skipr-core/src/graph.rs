//! Project dependency graph and affected-set computation

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use tracing::{debug, info, instrument};

use crate::project::{is_under, Project};

/// Dependency graph over discovered projects.
///
/// Built once per run and never mutated. References that point outside the
/// scanned set are dropped and treated as already satisfied.
#[derive(Debug, Clone, Default)]
pub struct ProjectGraph {
    /// Projects indexed by path
    projects: BTreeMap<String, Project>,
    /// Project -> direct dependencies
    forward: HashMap<String, Vec<String>>,
    /// Project -> direct dependents
    reverse: HashMap<String, Vec<String>>,
    /// Memoized relevant directories per project
    relevant: HashMap<String, Vec<String>>,
}

impl ProjectGraph {
    /// Build the graph in O(projects + edges)
    #[instrument(skip_all, fields(projects = projects.len()))]
    pub fn build(projects: &[Project]) -> Self {
        let mut index: BTreeMap<String, Project> = BTreeMap::new();
        for project in projects {
            index.insert(project.path.clone(), project.clone());
        }

        let mut forward: HashMap<String, Vec<String>> = HashMap::new();
        let mut reverse: HashMap<String, Vec<String>> = HashMap::new();
        let mut dropped = 0usize;

        for project in index.values() {
            let mut deps: Vec<String> = Vec::new();
            for reference in &project.references {
                if reference == &project.path || !index.contains_key(reference) {
                    dropped += 1;
                    continue;
                }
                if !deps.contains(reference) {
                    deps.push(reference.clone());
                }
            }
            for dep in &deps {
                reverse.entry(dep.clone()).or_default().push(project.path.clone());
            }
            forward.insert(project.path.clone(), deps);
        }

        let mut graph = Self {
            projects: index,
            forward,
            reverse,
            relevant: HashMap::new(),
        };
        graph.relevant = graph.compute_relevant_dirs();

        info!(
            projects = graph.projects.len(),
            edges = graph.forward.values().map(Vec::len).sum::<usize>(),
            dropped_references = dropped,
            "project graph built"
        );
        graph
    }

    /// Relevant dirs for every project. Projects on a common cycle share
    /// one set, and each strongly connected component is computed once from
    /// the already finished components it depends on.
    fn compute_relevant_dirs(&self) -> HashMap<String, Vec<String>> {
        let components = Components::find(self);
        let component_of: HashMap<&str, usize> = components
            .iter()
            .enumerate()
            .flat_map(|(i, members)| members.iter().map(move |p| (*p, i)))
            .collect();

        // Components come out dependencies first, so every component a
        // member points at outside its own is already complete.
        let mut dirs_of: Vec<BTreeSet<String>> = Vec::with_capacity(components.len());
        for (i, members) in components.iter().enumerate() {
            let mut dirs = BTreeSet::new();
            for path in members {
                if let Some(project) = self.projects.get(*path) {
                    dirs.insert(project.dir.clone());
                }
                for dep in self.dependencies(path) {
                    let finished = component_of
                        .get(dep.as_str())
                        .filter(|&&j| j != i)
                        .and_then(|&j| dirs_of.get(j));
                    if let Some(done) = finished {
                        dirs.extend(done.iter().cloned());
                    }
                }
            }
            if members.len() > 1 {
                debug!(projects = members.len(), "reference cycle shares relevant dirs");
            }
            dirs_of.push(dirs);
        }

        component_of
            .into_iter()
            .map(|(path, i)| {
                let dirs = dirs_of.get(i).map(|d| d.iter().cloned().collect()).unwrap_or_default();
                (path.to_string(), dirs)
            })
            .collect()
    }

    /// Get a project by path
    pub fn get(&self, path: &str) -> Option<&Project> {
        self.projects.get(path)
    }

    /// All projects, sorted by path
    pub fn projects(&self) -> impl Iterator<Item = &Project> {
        self.projects.values()
    }

    /// Number of projects
    pub fn len(&self) -> usize {
        self.projects.len()
    }

    /// Whether the graph is empty
    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }

    /// Direct dependencies of a project
    pub fn dependencies(&self, path: &str) -> &[String] {
        self.forward.get(path).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Direct dependents of a project
    pub fn dependents(&self, path: &str) -> &[String] {
        self.reverse.get(path).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The project's directory plus the directories of all its transitive
    /// dependencies
    pub fn relevant_dirs(&self, path: &str) -> &[String] {
        self.relevant.get(path).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The project whose directory is the longest prefix of `file`
    pub fn owning_project(&self, file: &str) -> Option<&Project> {
        self.projects
            .values()
            .filter(|p| p.contains(file))
            .max_by_key(|p| p.dir.len())
    }

    /// Projects directly containing any of the changed files
    pub fn changed_projects<S: AsRef<str>>(&self, files: &[S]) -> BTreeSet<String> {
        files
            .iter()
            .filter_map(|f| self.owning_project(f.as_ref()))
            .map(|p| p.path.clone())
            .collect()
    }

    /// Closure of `changed` over the reverse graph: the changed projects plus
    /// everything that transitively depends on them
    pub fn affected(&self, changed: &BTreeSet<String>) -> BTreeSet<String> {
        let mut affected = BTreeSet::new();
        let mut queue: VecDeque<String> = changed
            .iter()
            .filter(|p| self.projects.contains_key(*p))
            .cloned()
            .collect();

        while let Some(current) = queue.pop_front() {
            if !affected.insert(current.clone()) {
                continue;
            }
            for dependent in self.dependents(&current) {
                if !affected.contains(dependent) {
                    queue.push_back(dependent.clone());
                }
            }
        }

        debug!(
            changed = changed.len(),
            affected = affected.len(),
            "affected set computed"
        );
        affected
    }

    /// Every project transitively depending on `path` (excluding itself)
    pub fn all_dependents(&self, path: &str) -> BTreeSet<String> {
        let mut start = BTreeSet::new();
        start.insert(path.to_string());
        let mut all = self.affected(&start);
        all.remove(path);
        all
    }

    /// Non-test projects among `targets` that no test project depends on,
    /// transitively. These can only be verified by building them.
    pub fn untested_projects(&self, targets: &BTreeSet<String>) -> BTreeSet<String> {
        targets
            .iter()
            .filter(|path| {
                self.get(path).is_some_and(|p| !p.is_test)
                    && !self
                        .all_dependents(path)
                        .iter()
                        .any(|d| self.get(d).is_some_and(|p| p.is_test))
            })
            .cloned()
            .collect()
    }

    /// Changed files that fall under the project's relevant directories
    pub fn files_for_project<S: AsRef<str>>(&self, path: &str, files: &[S]) -> Vec<String> {
        let dirs = self.relevant_dirs(path);
        files
            .iter()
            .map(AsRef::as_ref)
            .filter(|f| dirs.iter().any(|d| is_under(f, d)))
            .map(str::to_string)
            .collect()
    }
}

/// Tarjan's strongly connected components over the dependency edges
struct Components<'a> {
    graph: &'a ProjectGraph,
    index: HashMap<&'a str, usize>,
    low: HashMap<&'a str, usize>,
    stack: Vec<&'a str>,
    on_stack: HashSet<&'a str>,
    found: Vec<Vec<&'a str>>,
}

impl<'a> Components<'a> {
    /// Components in reverse topological order: a component is emitted only
    /// after every component it depends on
    fn find(graph: &'a ProjectGraph) -> Vec<Vec<&'a str>> {
        let mut state = Self {
            graph,
            index: HashMap::new(),
            low: HashMap::new(),
            stack: Vec::new(),
            on_stack: HashSet::new(),
            found: Vec::new(),
        };
        for path in graph.projects.keys() {
            if !state.index.contains_key(path.as_str()) {
                state.connect(path);
            }
        }
        state.found
    }

    fn connect(&mut self, path: &'a str) {
        let order = self.index.len();
        self.index.insert(path, order);
        self.low.insert(path, order);
        self.stack.push(path);
        self.on_stack.insert(path);

        let graph = self.graph;
        for dep in graph.dependencies(path) {
            let dep = dep.as_str();
            let reached = if !self.index.contains_key(dep) {
                self.connect(dep);
                self.low.get(dep).copied()
            } else if self.on_stack.contains(dep) {
                self.index.get(dep).copied()
            } else {
                None
            };
            if let (Some(reached), Some(low)) = (reached, self.low.get_mut(path)) {
                *low = (*low).min(reached);
            }
        }

        if self.low.get(path) == self.index.get(path) {
            let mut members = Vec::new();
            while let Some(member) = self.stack.pop() {
                self.on_stack.remove(member);
                members.push(member);
                if member == path {
                    break;
                }
            }
            self.found.push(members);
        }
    }
}

/// Affected set for a list of changed repo-relative paths
pub fn compute_affected<S: AsRef<str>>(projects: &[Project], changed_paths: &[S]) -> BTreeSet<String> {
    let graph = ProjectGraph::build(projects);
    let changed = graph.changed_projects(changed_paths);
    graph.affected(&changed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_projects() -> Vec<Project> {
        vec![
            Project::new("src/Core/Core.csproj"),
            Project::new("src/Utils/Utils.csproj").with_reference("src/Core/Core.csproj"),
            Project::new("src/App/App.csproj")
                .with_reference("src/Core/Core.csproj")
                .with_reference("src/Utils/Utils.csproj"),
            Project::new("tests/Core.Tests/Core.Tests.csproj")
                .with_reference("src/Core/Core.csproj")
                .with_test(true),
        ]
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_forward_and_reverse_edges() {
        let graph = ProjectGraph::build(&create_projects());

        assert_eq!(graph.dependencies("src/Utils/Utils.csproj"), ["src/Core/Core.csproj"]);
        let dependents: BTreeSet<String> =
            graph.dependents("src/Core/Core.csproj").iter().cloned().collect();
        assert_eq!(
            dependents,
            set(&[
                "src/App/App.csproj",
                "src/Utils/Utils.csproj",
                "tests/Core.Tests/Core.Tests.csproj"
            ])
        );
    }

    #[test]
    fn test_references_outside_scan_are_ignored() {
        let projects = vec![Project::new("a/A.csproj").with_reference("external/X.csproj")];
        let graph = ProjectGraph::build(&projects);
        assert!(graph.dependencies("a/A.csproj").is_empty());
    }

    #[test]
    fn test_affected_includes_transitive_dependents() {
        let graph = ProjectGraph::build(&create_projects());

        let affected = graph.affected(&set(&["src/Core/Core.csproj"]));
        assert_eq!(affected.len(), 4);

        let affected = graph.affected(&set(&["src/Utils/Utils.csproj"]));
        assert_eq!(affected, set(&["src/App/App.csproj", "src/Utils/Utils.csproj"]));
    }

    #[test]
    fn test_leaf_change_affects_nothing_else() {
        let graph = ProjectGraph::build(&create_projects());
        let affected = graph.affected(&set(&["src/App/App.csproj"]));
        assert_eq!(affected, set(&["src/App/App.csproj"]));
    }

    #[test]
    fn test_compute_affected_from_files() {
        let affected = compute_affected(&create_projects(), &["src/Utils/Strings.cs", "README.md"]);
        assert_eq!(affected, set(&["src/App/App.csproj", "src/Utils/Utils.csproj"]));
    }

    #[test]
    fn test_owning_project_prefers_deepest_dir() {
        let projects = vec![
            Project::new("src/Core/Core.csproj"),
            Project::new("src/Core/Plugins/Plugins.csproj"),
        ];
        let graph = ProjectGraph::build(&projects);
        let owner = graph.owning_project("src/Core/Plugins/Loader.cs").unwrap();
        assert_eq!(owner.path, "src/Core/Plugins/Plugins.csproj");
        assert!(graph.owning_project("tools/build.sh").is_none());
    }

    #[test]
    fn test_relevant_dirs_diamond() {
        let graph = ProjectGraph::build(&create_projects());
        assert_eq!(
            graph.relevant_dirs("src/App/App.csproj"),
            ["src/App", "src/Core", "src/Utils"]
        );
        assert_eq!(graph.relevant_dirs("src/Core/Core.csproj"), ["src/Core"]);
    }

    #[test]
    fn test_relevant_dirs_survive_cycle() {
        let projects = vec![
            Project::new("a/A.csproj").with_reference("b/B.csproj"),
            Project::new("b/B.csproj").with_reference("a/A.csproj"),
        ];
        let graph = ProjectGraph::build(&projects);
        assert!(graph.relevant_dirs("a/A.csproj").contains(&"b".to_string()));
    }

    #[test]
    fn test_cycle_members_see_every_dependency() {
        let projects = vec![
            Project::new("a/A.csproj")
                .with_reference("b/B.csproj")
                .with_reference("e/E.csproj"),
            Project::new("b/B.csproj").with_reference("a/A.csproj"),
            Project::new("e/E.csproj"),
            Project::new("c/C.csproj").with_reference("b/B.csproj"),
        ];
        let graph = ProjectGraph::build(&projects);

        assert_eq!(graph.relevant_dirs("a/A.csproj"), ["a", "b", "e"]);
        assert_eq!(graph.relevant_dirs("b/B.csproj"), ["a", "b", "e"]);
        assert_eq!(graph.relevant_dirs("c/C.csproj"), ["a", "b", "c", "e"]);
        assert_eq!(graph.relevant_dirs("e/E.csproj"), ["e"]);
    }

    #[test]
    fn test_untested_projects() {
        let graph = ProjectGraph::build(&create_projects());
        let targets = set(&[
            "src/App/App.csproj",
            "src/Core/Core.csproj",
            "src/Utils/Utils.csproj",
            "tests/Core.Tests/Core.Tests.csproj",
        ]);
        assert_eq!(
            graph.untested_projects(&targets),
            set(&["src/App/App.csproj", "src/Utils/Utils.csproj"])
        );
    }

    #[test]
    fn test_files_for_project() {
        let graph = ProjectGraph::build(&create_projects());
        let files = graph.files_for_project(
            "tests/Core.Tests/Core.Tests.csproj",
            &["src/Core/Foo.cs", "src/App/Program.cs", "tests/Core.Tests/FooTests.cs"],
        );
        assert_eq!(files, vec!["src/Core/Foo.cs", "tests/Core.Tests/FooTests.cs"]);
    }
}
