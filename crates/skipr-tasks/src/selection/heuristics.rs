//! Naming heuristics mapping a changed source file to test classes

use std::collections::BTreeSet;

use super::index::{file_stem, TestIndex};

/// Closed set of naming heuristics. All are opt-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Heuristic {
    /// `Foo.cs` -> `FooTests`
    DirectName,
    /// `Parsing/Lexer.cs` -> test classes in a `*.Parsing` namespace
    DirectoryNamespace,
    /// `FooExtensions.cs` -> `FooTests`
    ExtensionBase,
    /// `IFoo.cs` -> tests of `Foo` and of any `*Foo` implementation
    InterfaceImplementation,
    /// `Foo.cs` -> any test class whose name starts with `Foo`
    CatchAll,
}

impl Heuristic {
    pub const ALL: [Heuristic; 5] = [
        Self::DirectName,
        Self::DirectoryNamespace,
        Self::ExtensionBase,
        Self::InterfaceImplementation,
        Self::CatchAll,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::DirectName => "direct-name",
            Self::DirectoryNamespace => "directory-namespace",
            Self::ExtensionBase => "extension-base",
            Self::InterfaceImplementation => "interface-implementation",
            Self::CatchAll => "catch-all",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|h| h.name() == name)
    }

    /// Enabled heuristics from configured names, unknown names dropped
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Vec<Self> {
        let mut enabled = Vec::new();
        for name in names {
            if let Some(h) = Self::parse(name.as_ref()) {
                if !enabled.contains(&h) {
                    enabled.push(h);
                }
            }
        }
        enabled
    }

    /// Test class names in `index` this heuristic maps `file` to
    pub fn candidates(&self, file: &str, index: &TestIndex) -> BTreeSet<String> {
        let Some(stem) = file_stem(file) else {
            return BTreeSet::new();
        };

        let named = |names: &[String]| -> BTreeSet<String> {
            index
                .test_classes()
                .filter(|c| names.contains(&c.name))
                .map(|c| c.name.clone())
                .collect()
        };

        match self {
            Self::DirectName => named(&test_names(stem)),
            Self::DirectoryNamespace => {
                let Some(segment) = file
                    .rsplit_once('/')
                    .and_then(|(dir, _)| dir.rsplit('/').next())
                    .filter(|s| !s.is_empty())
                else {
                    return BTreeSet::new();
                };
                index
                    .test_classes()
                    .filter(|c| {
                        c.namespace
                            .as_deref()
                            .is_some_and(|ns| ns.split('.').any(|part| part == segment))
                    })
                    .map(|c| c.name.clone())
                    .collect()
            }
            Self::ExtensionBase => match stem.strip_suffix("Extensions") {
                Some(base) if !base.is_empty() => {
                    let mut names = test_names(base);
                    names.extend(test_names(stem));
                    named(&names)
                }
                _ => BTreeSet::new(),
            },
            Self::InterfaceImplementation => {
                let implementation = match stem.strip_prefix('I') {
                    Some(rest) if rest.starts_with(|c: char| c.is_ascii_uppercase()) => rest,
                    _ => return BTreeSet::new(),
                };
                index
                    .test_classes()
                    .filter(|c| {
                        test_names(implementation).contains(&c.name)
                            || ["Tests", "Test"].iter().any(|suffix| {
                                c.name
                                    .strip_suffix(suffix)
                                    .is_some_and(|n| n.ends_with(implementation))
                            })
                    })
                    .map(|c| c.name.clone())
                    .collect()
            }
            Self::CatchAll => index
                .test_classes()
                .filter(|c| c.name.len() > stem.len() && c.name.starts_with(stem))
                .map(|c| c.name.clone())
                .collect(),
        }
    }
}

impl std::fmt::Display for Heuristic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

fn test_names(stem: &str) -> Vec<String> {
    vec![format!("{}Tests", stem), format!("{}Test", stem)]
}
