//! Safety check before trusting a lone changed test file

use super::index::{file_stem, TestIndex};

/// Name fragments of helper, fixture and base-class files
const HELPER_PREFIXES: &[&str] = &["Base", "Abstract", "Shared", "Common"];
const HELPER_FRAGMENTS: &[&str] = &["Helper", "Fixture", "Mock", "Fake", "Stub", "Util"];
const HELPER_SUFFIXES: &[&str] = &["Base", "Setup", "Context", "Collection", "Builder", "Extensions"];

/// Why a changed test file cannot be trusted on its own
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SafetyRejection {
    /// Named like a helper, fixture or base class
    HelperName(String),
    /// No recognizable test method
    NoTestMethods(String),
    /// Another test file inherits from or mentions a class defined here
    ReferencedBy { file: String, class: String },
}

impl std::fmt::Display for SafetyRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HelperName(path) => write!(f, "{} looks like a shared helper", path),
            Self::NoTestMethods(path) => write!(f, "{} declares no test methods", path),
            Self::ReferencedBy { file, class } => {
                write!(f, "{} is referenced from {}", class, file)
            }
        }
    }
}

/// Whether a file stem follows helper/fixture/base naming conventions
pub fn is_helper_name(stem: &str) -> bool {
    HELPER_PREFIXES.iter().any(|p| stem.starts_with(p))
        || HELPER_FRAGMENTS.iter().any(|f| stem.contains(f))
        || HELPER_SUFFIXES.iter().any(|s| stem.ends_with(s))
}

/// Check whether narrowing a run to this file's classes is safe
pub fn check_lone_test_file(index: &TestIndex, path: &str) -> Result<(), SafetyRejection> {
    let stem = file_stem(path).unwrap_or(path);
    if is_helper_name(stem) {
        return Err(SafetyRejection::HelperName(path.to_string()));
    }

    let file = match index.file(path) {
        Some(file) if file.has_tests() => file,
        _ => return Err(SafetyRejection::NoTestMethods(path.to_string())),
    };

    for class in &file.classes {
        for other in index.files().filter(|f| f.path != path) {
            let inherits = other
                .classes
                .iter()
                .any(|c| c.base.as_deref() == Some(class.name.as_str()));
            if inherits || other.mentions(&class.name) {
                return Err(SafetyRejection::ReferencedBy {
                    file: other.path.clone(),
                    class: class.name.clone(),
                });
            }
        }
    }

    Ok(())
}
