//! Scanning of external tool output

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Literal markers that mean the run failed regardless of exit code
pub const FAILURE_MARKERS: &[&str] = &["Build FAILED", "Test Run Failed", "error MSB"];

/// Markers that mean external dependencies were never restored
pub const RESTORE_MARKERS: &[&str] = &["NETSDK1004", "NETSDK1047", "project.assets.json"];

/// Structured test totals reported by the tool
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSummary {
    pub failed: u32,
    pub passed: u32,
    pub skipped: u32,
    pub total: u32,
}

impl TestSummary {
    fn add(&mut self, other: &TestSummary) {
        self.failed += other.failed;
        self.passed += other.passed;
        self.skipped += other.skipped;
        self.total += other.total;
    }
}

impl std::fmt::Display for TestSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} passed, {} failed, {} skipped ({} total)",
            self.passed, self.failed, self.skipped, self.total
        )
    }
}

/// What the engine learned from one run's output
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputScan {
    /// First failure marker found
    pub failure_marker: Option<&'static str>,
    /// Output indicates a missing restore
    pub needs_restore: bool,
    /// Summed summaries, if any were printed
    pub summary: Option<TestSummary>,
}

impl OutputScan {
    /// Whether a run with this output and exit code succeeded
    pub fn succeeded(&self, exit_code: Option<i32>) -> bool {
        exit_code == Some(0) && self.failure_marker.is_none()
    }
}

fn summary_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"Failed:\s*(\d+),\s*Passed:\s*(\d+),\s*Skipped:\s*(\d+),\s*Total:\s*(\d+)")
            .expect("valid regex")
    })
}

/// Scan combined output text
pub fn scan(text: &str) -> OutputScan {
    let failure_marker = FAILURE_MARKERS.iter().copied().find(|m| text.contains(m));
    let needs_restore = RESTORE_MARKERS.iter().any(|m| text.contains(m));

    let mut summary: Option<TestSummary> = None;
    for cap in summary_re().captures_iter(text) {
        let parse = |i: usize| cap[i].parse::<u32>().unwrap_or(0);
        let one = TestSummary {
            failed: parse(1),
            passed: parse(2),
            skipped: parse(3),
            total: parse(4),
        };
        summary.get_or_insert_with(TestSummary::default).add(&one);
    }

    OutputScan {
        failure_marker,
        needs_restore,
        summary,
    }
}
