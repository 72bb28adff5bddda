//! Filter expressions for the external test runner

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;

use super::index::TestIndex;

/// Filter selecting whole classes by name
pub fn class_filter(classes: &BTreeSet<String>) -> Vec<String> {
    classes
        .iter()
        .map(|c| format!("FullyQualifiedName~{}", c))
        .collect()
}

/// Filter selecting exact tests
pub fn test_filter(tests: &BTreeSet<String>) -> Vec<String> {
    tests
        .iter()
        .map(|t| {
            let name = t.split('(').next().unwrap_or(t).trim();
            format!("FullyQualifiedName={}", name)
        })
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Join clauses with logical OR
pub fn any_of(clauses: &[String]) -> String {
    clauses.join("|")
}

/// AND a computed filter with the user's filter. The user's filter is used
/// verbatim when nothing was computed.
pub fn combine(computed: Option<&str>, user: Option<&str>) -> String {
    match (computed.filter(|c| !c.is_empty()), user.filter(|u| !u.is_empty())) {
        (Some(c), Some(u)) => format!("({})&({})", c, u),
        (Some(c), None) => c.to_string(),
        (None, Some(u)) => u.to_string(),
        (None, None) => String::new(),
    }
}

fn exclusion_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(?:TestCategory|Category|Trait)\s*!=\s*([^&|()\s]+)").expect("valid regex")
    })
}

/// Categories a user filter excludes
pub fn excluded_categories(user: &str) -> BTreeSet<String> {
    exclusion_re()
        .captures_iter(user)
        .map(|c| c[1].trim_matches('"').to_string())
        .collect()
}

/// Whether every matched test carries an excluded category. Unknown tests
/// are never considered excluded.
pub fn all_excluded(matched: &BTreeSet<String>, index: &TestIndex, excluded: &BTreeSet<String>) -> bool {
    if matched.is_empty() || excluded.is_empty() {
        return false;
    }
    matched.iter().all(|test| {
        index
            .categories_of(test)
            .is_some_and(|categories| !categories.is_disjoint(excluded))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_class_and_test_clauses() {
        let classes = class_filter(&set(&["FooTests"]));
        let tests = test_filter(&set(&["N.BarTests.A", "N.BarTests.B(x: 1)", "N.BarTests.B(x: 2)"]));
        let mut all = classes;
        all.extend(tests);
        assert_eq!(
            any_of(&all),
            "FullyQualifiedName~FooTests|FullyQualifiedName=N.BarTests.A|FullyQualifiedName=N.BarTests.B"
        );
    }

    #[test]
    fn test_combine() {
        assert_eq!(
            combine(Some("FullyQualifiedName~FooTests"), Some("Category!=Slow")),
            "(FullyQualifiedName~FooTests)&(Category!=Slow)"
        );
        assert_eq!(combine(None, Some("Category!=Slow")), "Category!=Slow");
        assert_eq!(combine(Some(""), None), "");
    }

    #[test]
    fn test_excluded_categories() {
        let excluded = excluded_categories("Category!=Slow&TestCategory != Nightly|Priority=1");
        assert_eq!(excluded, set(&["Nightly", "Slow"]));
        assert!(excluded_categories("Category=Slow").is_empty());
    }

    #[test]
    fn test_all_excluded() {
        let index = TestIndex::from_sources([(
            "SlowTests.cs",
            "namespace N;\n[Trait(\"Category\", \"Slow\")]\npublic class SlowTests {\n  [Fact]\n  public void A() {}\n  [Fact]\n  public void B() {}\n}\n",
        )]);
        let excluded = set(&["Slow"]);
        assert!(all_excluded(&set(&["N.SlowTests.A", "N.SlowTests.B"]), &index, &excluded));
        assert!(!all_excluded(&set(&["N.SlowTests.A", "N.Other.C"]), &index, &excluded));
        assert!(!all_excluded(&BTreeSet::new(), &index, &excluded));
    }
}
