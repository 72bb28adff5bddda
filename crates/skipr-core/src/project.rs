//! Project and solution model
//!
//! Projects are identified by their repo-relative descriptor path
//! (`src/Core/Core.csproj`), always `/` separated.

use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Project descriptor extensions recognised during a scan
pub const PROJECT_EXTENSIONS: &[&str] = &["csproj", "fsproj", "vbproj"];

/// Package identifiers that mark a project as a test project
const TEST_PACKAGE_PREFIXES: &[&str] = &[
    "microsoft.net.test.sdk",
    "xunit",
    "nunit",
    "mstest.",
];

/// A buildable project in the repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// Repo-relative descriptor path (unique id)
    pub path: String,
    /// Display name (descriptor file stem)
    pub name: String,
    /// Repo-relative project directory
    pub dir: String,
    /// Whether this is a test project
    pub is_test: bool,
    /// Referenced projects (repo-relative descriptor paths)
    pub references: Vec<String>,
    /// External package identifiers
    pub packages: Vec<String>,
}

impl Project {
    /// Create a project with no references
    pub fn new(path: impl Into<String>) -> Self {
        let path = normalize_path(&path.into());
        let (dir, file) = match path.rsplit_once('/') {
            Some((dir, file)) => (dir.to_string(), file.to_string()),
            None => (String::new(), path.clone()),
        };
        let name = file
            .rsplit_once('.')
            .map(|(stem, _)| stem.to_string())
            .unwrap_or(file);

        Self {
            path,
            name,
            dir,
            is_test: false,
            references: Vec::new(),
            packages: Vec::new(),
        }
    }

    /// Add a project reference
    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.references.push(normalize_path(&reference.into()));
        self
    }

    /// Mark as a test project
    pub fn with_test(mut self, is_test: bool) -> Self {
        self.is_test = is_test;
        self
    }

    /// Whether a repo-relative file path lives under this project's directory
    pub fn contains(&self, file: &str) -> bool {
        is_under(file, &self.dir)
    }

    /// Parse a project descriptor.
    ///
    /// `path` is the repo-relative descriptor path; reference paths inside the
    /// descriptor are resolved relative to it.
    pub fn parse(path: &str, content: &str) -> Self {
        let mut project = Self::new(path);

        for cap in project_reference_re().captures_iter(content) {
            let raw = cap[1].replace('\\', "/");
            let joined = if project.dir.is_empty() {
                raw
            } else {
                format!("{}/{}", project.dir, raw)
            };
            project.references.push(normalize_path(&joined));
        }

        for cap in package_reference_re().captures_iter(content) {
            project.packages.push(cap[1].to_string());
        }

        let declared_test = is_test_project_re()
            .captures(content)
            .map(|c| c[1].eq_ignore_ascii_case("true"));

        project.is_test = declared_test.unwrap_or_else(|| {
            project.packages.iter().any(|p| {
                let lower = p.to_lowercase();
                TEST_PACKAGE_PREFIXES.iter().any(|prefix| lower.starts_with(prefix))
            })
        });

        project
    }
}

/// A solution grouping several projects
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Solution {
    /// Repo-relative solution path
    pub path: String,
    /// Member project paths
    pub projects: Vec<String>,
}

impl Solution {
    pub fn new(path: impl Into<String>, projects: Vec<String>) -> Self {
        Self {
            path: normalize_path(&path.into()),
            projects: projects.iter().map(|p| normalize_path(p)).collect(),
        }
    }

    /// Parse a `.sln` or `.slnx` descriptor
    pub fn parse(path: &str, content: &str) -> Self {
        let path = normalize_path(path);
        let dir = path.rsplit_once('/').map(|(d, _)| d.to_string()).unwrap_or_default();

        let re = if path.ends_with(".slnx") {
            slnx_project_re()
        } else {
            sln_project_re()
        };

        let mut projects = Vec::new();
        for cap in re.captures_iter(content) {
            let raw = cap[1].replace('\\', "/");
            let is_descriptor = PROJECT_EXTENSIONS
                .iter()
                .any(|ext| raw.to_lowercase().ends_with(&format!(".{}", ext)));
            if !is_descriptor {
                // Solution folders and other items
                continue;
            }
            let joined = if dir.is_empty() {
                raw
            } else {
                format!("{}/{}", dir, raw)
            };
            let member = normalize_path(&joined);
            if !projects.contains(&member) {
                projects.push(member);
            }
        }

        Self { path, projects }
    }
}

/// Normalise a relative path: `/` separators, no `.` segments, `..` resolved.
pub fn normalize_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

/// Convert a filesystem path relative to `root` into a repo path
pub fn to_repo_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let mut out = PathBuf::new();
    for component in relative.components() {
        if let Component::Normal(part) = component {
            out.push(part);
        }
    }
    normalize_path(&out.to_string_lossy())
}

/// Whether `file` lives under `dir` (both repo-relative)
pub fn is_under(file: &str, dir: &str) -> bool {
    if dir.is_empty() {
        return true;
    }
    file.strip_prefix(dir)
        .is_some_and(|rest| rest.starts_with('/'))
}

fn project_reference_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"<ProjectReference\s+Include\s*=\s*"([^"]+)""#).expect("valid regex")
    })
}

fn package_reference_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"<PackageReference\s+Include\s*=\s*"([^"]+)""#).expect("valid regex")
    })
}

fn is_test_project_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"<IsTestProject>\s*(\w+)\s*</IsTestProject>").expect("valid regex")
    })
}

fn sln_project_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?m)^Project\("\{[^}]+\}"\)\s*=\s*"[^"]*",\s*"([^"]+)""#)
            .expect("valid regex")
    })
}

fn slnx_project_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"<Project\s+Path\s*=\s*"([^"]+)""#).expect("valid regex"))
}
