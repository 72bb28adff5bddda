//! Index of test classes, methods and categories in a test project
//!
//! A line-oriented scan of C# sources. It recognises namespaces, class
//! declarations with their first base type, test methods marked by a test
//! attribute, and category attributes at class and method level.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, trace};
use walkdir::WalkDir;

use skipr_core::project::to_repo_path;
use skipr_core::IgnoreRules;

/// Attribute names that mark a test method
const TEST_ATTRIBUTES: &[&str] = &[
    "Fact",
    "Theory",
    "Test",
    "TestMethod",
    "TestCase",
    "TestCaseSource",
    "DataTestMethod",
];

/// File stem suffixes that follow test naming conventions
const TEST_NAME_SUFFIXES: &[&str] = &["Tests", "Test", "Specs", "Spec"];

/// A test method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestMethod {
    pub name: String,
    /// Method-level categories only
    pub categories: BTreeSet<String>,
}

/// A class declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestClass {
    pub name: String,
    pub namespace: Option<String>,
    /// Simple name of the first base type
    pub base: Option<String>,
    /// Class-level categories
    pub categories: BTreeSet<String>,
    pub methods: Vec<TestMethod>,
}

impl TestClass {
    pub fn full_name(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{}.{}", ns, self.name),
            None => self.name.clone(),
        }
    }

    pub fn has_tests(&self) -> bool {
        !self.methods.is_empty()
    }

    /// Fully qualified test names paired with their resolved categories
    /// (class-level plus method-level)
    pub fn tests(&self) -> impl Iterator<Item = (String, BTreeSet<String>)> + '_ {
        let class = self.full_name();
        self.methods.iter().map(move |m| {
            let mut categories = self.categories.clone();
            categories.extend(m.categories.iter().cloned());
            (format!("{}.{}", class, m.name), categories)
        })
    }
}

/// One parsed source file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceFile {
    pub path: String,
    pub classes: Vec<TestClass>,
    identifiers: BTreeSet<String>,
}

impl SourceFile {
    /// Parse a C# source file
    pub fn parse(path: &str, content: &str) -> Self {
        let mut file = Self {
            path: path.to_string(),
            classes: Vec::new(),
            identifiers: identifier_re()
                .find_iter(content)
                .map(|m| m.as_str().to_string())
                .collect(),
        };

        let mut namespace: Option<String> = None;
        let mut pending = String::new();
        let mut in_attribute = false;
        let mut current: Option<usize> = None;

        for raw in content.lines() {
            let line = match raw.find("//") {
                Some(i) => &raw[..i],
                None => raw,
            };
            let mut rest = line.trim();
            if rest.is_empty() {
                continue;
            }

            if in_attribute {
                match rest.find(']') {
                    Some(end) => {
                        pending.push_str(&rest[..=end]);
                        rest = rest[end + 1..].trim();
                        in_attribute = false;
                    }
                    None => {
                        pending.push_str(rest);
                        continue;
                    }
                }
            }

            while rest.starts_with('[') {
                match rest.find(']') {
                    Some(end) => {
                        pending.push_str(&rest[..=end]);
                        rest = rest[end + 1..].trim();
                    }
                    None => {
                        pending.push_str(rest);
                        in_attribute = true;
                        rest = "";
                    }
                }
            }
            if rest.is_empty() {
                continue;
            }

            if let Some(cap) = namespace_re().captures(rest) {
                namespace = Some(cap[1].to_string());
                pending.clear();
                continue;
            }

            if let Some(cap) = class_re().captures(rest) {
                let base = cap.get(2).map(|m| {
                    let name = m.as_str();
                    name.rsplit('.').next().unwrap_or(name).to_string()
                });
                file.classes.push(TestClass {
                    name: cap[1].to_string(),
                    namespace: namespace.clone(),
                    base,
                    categories: categories_in(&pending),
                    methods: Vec::new(),
                });
                current = Some(file.classes.len() - 1);
                pending.clear();
                continue;
            }

            if let (Some(idx), Some(cap)) = (current, method_re().captures(rest)) {
                if has_test_attribute(&pending) {
                    file.classes[idx].methods.push(TestMethod {
                        name: cap[1].to_string(),
                        categories: categories_in(&pending),
                    });
                }
            }
            pending.clear();
        }

        trace!(path, classes = file.classes.len(), "parsed source file");
        file
    }

    /// Whether any class in the file declares a test method
    pub fn has_tests(&self) -> bool {
        self.classes.iter().any(TestClass::has_tests)
    }

    /// Whether the file mentions an identifier anywhere
    pub fn mentions(&self, name: &str) -> bool {
        self.identifiers.contains(name)
    }

    /// Names of classes declaring tests
    pub fn test_class_names(&self) -> BTreeSet<String> {
        self.classes
            .iter()
            .filter(|c| c.has_tests())
            .map(|c| c.name.clone())
            .collect()
    }
}

/// All parsed sources of one test project
#[derive(Debug, Clone, Default)]
pub struct TestIndex {
    files: BTreeMap<String, SourceFile>,
}

impl TestIndex {
    /// Parse every non-ignored `.cs` file under a repo-relative directory
    pub fn build(root: &Path, dir: &str, rules: &IgnoreRules) -> Self {
        let start = if dir.is_empty() {
            root.to_path_buf()
        } else {
            root.join(dir)
        };
        let mut sources = Vec::new();

        let walker = WalkDir::new(&start).into_iter().filter_entry(|entry| {
            let relative = to_repo_path(root, entry.path());
            relative.is_empty() || !rules.is_ignored(&relative, entry.file_type().is_dir())
        });

        for entry in walker.flatten() {
            let is_cs = entry.path().extension().is_some_and(|e| e == "cs");
            if !entry.file_type().is_file() || !is_cs {
                continue;
            }
            let relative = to_repo_path(root, entry.path());
            match std::fs::read_to_string(entry.path()) {
                Ok(content) => sources.push((relative, content)),
                Err(e) => debug!(path = %relative, error = %e, "skipping unreadable source"),
            }
        }

        let index = Self::from_sources(sources);
        debug!(dir, files = index.files.len(), "test index built");
        index
    }

    /// Build from in-memory `(path, content)` pairs
    pub fn from_sources<I, P, C>(sources: I) -> Self
    where
        I: IntoIterator<Item = (P, C)>,
        P: AsRef<str>,
        C: AsRef<str>,
    {
        let files = sources
            .into_iter()
            .map(|(path, content)| {
                let file = SourceFile::parse(path.as_ref(), content.as_ref());
                (file.path.clone(), file)
            })
            .collect();
        Self { files }
    }

    pub fn file(&self, path: &str) -> Option<&SourceFile> {
        self.files.get(path)
    }

    pub fn files(&self) -> impl Iterator<Item = &SourceFile> {
        self.files.values()
    }

    /// Every class that declares tests
    pub fn test_classes(&self) -> impl Iterator<Item = &TestClass> {
        self.files
            .values()
            .flat_map(|f| f.classes.iter())
            .filter(|c| c.has_tests())
    }

    /// Fully qualified names of the tests in every class with this name
    pub fn tests_in_class(&self, name: &str) -> Vec<String> {
        self.test_classes()
            .filter(|c| c.name == name)
            .flat_map(|c| c.tests().map(|(fqn, _)| fqn))
            .collect()
    }

    /// Resolved categories of a test; `None` for an unknown test
    pub fn categories_of(&self, test: &str) -> Option<BTreeSet<String>> {
        // Parameterised ids carry their arguments after the name
        let test = test.split('(').next().unwrap_or(test).trim();
        self.test_classes()
            .flat_map(|c| c.tests())
            .find(|(fqn, _)| fqn == test)
            .map(|(_, categories)| categories)
    }
}

/// Whether a path follows test file naming conventions
pub fn is_test_file_name(path: &str) -> bool {
    file_stem(path).is_some_and(|stem| {
        TEST_NAME_SUFFIXES
            .iter()
            .any(|s| stem.len() > s.len() && stem.ends_with(s))
    })
}

/// File name without directory and extension
pub fn file_stem(path: &str) -> Option<&str> {
    let name = path.rsplit('/').next()?;
    Some(name.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(name))
}

fn has_test_attribute(attributes: &str) -> bool {
    attribute_name_re()
        .captures_iter(attributes)
        .any(|cap| TEST_ATTRIBUTES.contains(&&cap[1]))
}

fn categories_in(attributes: &str) -> BTreeSet<String> {
    let mut categories: BTreeSet<String> = trait_category_re()
        .captures_iter(attributes)
        .map(|c| c[1].to_string())
        .collect();
    categories.extend(category_re().captures_iter(attributes).map(|c| c[1].to_string()));
    categories
}

fn namespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^namespace\s+([\w.]+)").expect("valid regex"))
}

fn class_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"\b(?:class|record)\s+([A-Za-z_]\w*)(?:\s*<[^>{]*>)?(?:\s*\([^)]*\))?\s*(?::\s*([A-Za-z_][\w.]*))?",
        )
        .expect("valid regex")
    })
}

fn method_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?:(?:public|private|protected|internal|static|async|virtual|override|sealed|new)\s+)*[\w<>\[\],.?]+\s+([A-Za-z_]\w*)\s*(?:<[^>]*>)?\s*\(",
        )
        .expect("valid regex")
    })
}

fn attribute_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\[,]\s*(?:\w+\.)*(\w+)").expect("valid regex"))
}

fn trait_category_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"Trait\s*\(\s*"Category"\s*,\s*"([^"]+)""#).expect("valid regex")
    })
}

fn category_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"\b(?:Test)?Category\s*\(\s*"([^"]+)""#).expect("valid regex"))
}

fn identifier_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[A-Za-z_]\w*").expect("valid regex"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const FOO_TESTS: &str = r#"
using Xunit;

namespace Core.Tests;

[Trait("Category", "Unit")]
public class FooTests : TestBase
{
    [Fact]
    public void Adds() { }

    [Theory]
    [InlineData(1, 2)]
    [Trait("Category", "Slow")]
    public async Task AddsMany(int a, int b) { }

    private void Helper() { }
}
"#;

    #[test]
    fn test_parse_classes_and_methods() {
        let file = SourceFile::parse("tests/Core.Tests/FooTests.cs", FOO_TESTS);
        assert_eq!(file.classes.len(), 1);
        let class = &file.classes[0];
        assert_eq!(class.full_name(), "Core.Tests.FooTests");
        assert_eq!(class.base.as_deref(), Some("TestBase"));
        let names: Vec<&str> = class.methods.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["Adds", "AddsMany"]);
    }

    #[test]
    fn test_categories_resolve_class_and_method() {
        let index = TestIndex::from_sources([("FooTests.cs", FOO_TESTS)]);
        let adds = index.categories_of("Core.Tests.FooTests.Adds").unwrap();
        assert_eq!(adds.into_iter().collect::<Vec<_>>(), vec!["Unit"]);

        let many = index.categories_of("Core.Tests.FooTests.AddsMany(a: 1, b: 2)").unwrap();
        assert_eq!(many.into_iter().collect::<Vec<_>>(), vec!["Slow", "Unit"]);

        assert!(index.categories_of("Core.Tests.FooTests.Missing").is_none());
    }

    #[test]
    fn test_nunit_and_mstest_attributes() {
        let content = r#"
namespace Utils.Tests
{
    [TestFixture, Category("Integration")]
    public class ParserTests
    {
        [Test, Category("Fast")]
        public void Parses() { }

        [TestMethod]
        [TestCategory("Nightly")]
        public void Other() { }
    }
}
"#;
        let index = TestIndex::from_sources([("ParserTests.cs", content)]);
        let parses = index.categories_of("Utils.Tests.ParserTests.Parses").unwrap();
        assert!(parses.contains("Integration") && parses.contains("Fast"));
        let other = index.categories_of("Utils.Tests.ParserTests.Other").unwrap();
        assert!(other.contains("Nightly"));
    }

    #[test]
    fn test_multiline_attribute() {
        let content = "namespace N;\npublic class ATests {\n  [Trait(\"Category\",\n    \"Slow\")]\n  [Fact]\n  public void Works() {}\n}\n";
        let index = TestIndex::from_sources([("ATests.cs", content)]);
        let cats = index.categories_of("N.ATests.Works").unwrap();
        assert!(cats.contains("Slow"));
    }

    #[test]
    fn test_file_without_tests() {
        let file = SourceFile::parse(
            "TestBase.cs",
            "namespace Core.Tests;\npublic abstract class TestBase { protected void Setup() {} }",
        );
        assert!(!file.has_tests());
        assert!(file.mentions("TestBase"));
    }

    #[test]
    fn test_test_file_names() {
        assert!(is_test_file_name("tests/Core.Tests/FooTests.cs"));
        assert!(is_test_file_name("FooTest.cs"));
        assert!(!is_test_file_name("src/Core/Foo.cs"));
        assert!(!is_test_file_name("Tests.cs"));
    }
}
