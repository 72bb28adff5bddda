//! skipr tasks - incremental execution engine
//!
//! This crate turns a set of target projects into dependency-gated jobs,
//! skips work whose inputs are unchanged via a content-addressed cache,
//! and narrows test runs to the tests affected by a change.

pub mod batching;
pub mod cache;
pub mod coverage;
pub mod freshness;
pub mod hashing;
pub mod job;
pub mod output;
pub mod reporter;
pub mod runner;
pub mod scheduler;
pub mod selection;
pub mod session;

pub use batching::{plan_batches, BatchPlan, SolutionGroup};
pub use cache::{CacheEntry, CacheError, CacheKey, CacheStats, ContentCache, PruneStats};
pub use coverage::{CoverageMap, CoverageReport, CoverageStore, TestCoverage};
pub use job::{Job, JobKind, JobResult, JobStatus, StuckJob};
pub use output::TestSummary;
pub use reporter::{CollectingReporter, JobEvent, JobReporter, TracingReporter};
pub use runner::{Invocation, ProcessRunner, RunnerError, ToolOutput, ToolRunner};
pub use scheduler::{ExecuteOptions, RunReport, Scheduler, SchedulerError, BUILD_VERB, TEST_VERB};
pub use selection::{FilterResult, Heuristic, SelectionStrategy, TestSelector};
pub use session::Session;
