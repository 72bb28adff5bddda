//! Dependency-gated job scheduler
//!
//! A fixed pool of workers drains a shared queue of eligible jobs. One
//! control loop owns all scheduling state (pending dependency counts, the
//! queue sender, the stop flag) and only changes it in response to
//! completion messages sent by workers.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use skipr_core::{BatchPolicy, IgnoreRules, ProjectGraph, Solution};

use crate::batching::{plan_batches, BatchPlan};
use crate::cache::{CacheEntry, CacheError, CacheKey, ContentCache};
use crate::freshness::{self, Freshness};
use crate::hashing::{args_hash, content_hash, run_args_hash};
use crate::job::{build_jobs, find_stuck, Job, JobKind, JobResult, JobStatus, StuckJob};
use crate::output::{self, OutputScan};
use crate::reporter::{JobEvent, JobReporter, TracingReporter};
use crate::runner::{Invocation, RunnerError, ToolRunner};
use crate::selection::{FilterResult, TestSelector};

/// Verb that runs tests and enables test selection
pub const TEST_VERB: &str = "test";
/// Verb used for build-only jobs
pub const BUILD_VERB: &str = "build";

const DEFAULT_PROGRESS_CAPACITY: usize = 256;

/// Options for one run
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    pub verb: String,
    /// Arguments passed to every invocation; part of the cache key
    pub extra_args: Vec<String>,
    /// Worker count (0 = logical CPUs)
    pub concurrency: usize,
    /// Keep running independent jobs after a failure
    pub keep_going: bool,
    /// Ignore cache hits and freshness
    pub force: bool,
    /// Only accept cache hits that recorded output
    pub replay_output: bool,
    /// Filter expression supplied by the user
    pub user_filter: Option<String>,
    /// Changed files used for test selection
    pub changed_files: Vec<String>,
    pub policy: BatchPolicy,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            verb: TEST_VERB.to_string(),
            extra_args: Vec::new(),
            concurrency: 0,
            keep_going: false,
            force: false,
            replay_output: false,
            user_filter: None,
            changed_files: Vec::new(),
            policy: BatchPolicy::Auto,
        }
    }
}

impl ExecuteOptions {
    fn user_filter(&self) -> Option<&str> {
        self.user_filter
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty())
    }

    /// Hash of the run as started, recorded on every entry it writes
    fn run_args(&self) -> String {
        run_args_hash(&self.verb, &self.extra_args, self.user_filter())
    }

    fn worker_count(&self, jobs: usize) -> usize {
        let requested = if self.concurrency == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        } else {
            self.concurrency
        };
        requested.min(jobs).max(1)
    }
}

/// Aggregated outcome of a run
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    /// One result per job, in plan order
    pub results: Vec<JobResult>,
    pub total: usize,
    /// Successful jobs, cached ones included
    pub succeeded: usize,
    pub failed: usize,
    pub cached: usize,
    pub skipped: usize,
    pub cancelled: usize,
    pub duration: Duration,
}

impl RunReport {
    fn new(results: Vec<JobResult>, duration: Duration) -> Self {
        let count = |f: fn(&JobStatus) -> bool| results.iter().filter(|r| f(&r.status)).count();
        Self {
            total: results.len(),
            succeeded: count(JobStatus::is_success),
            failed: count(|s| matches!(s, JobStatus::Failed(_))),
            cached: count(|s| matches!(s, JobStatus::Cached)),
            skipped: count(|s| matches!(s, JobStatus::Skipped(_))),
            cancelled: count(|s| matches!(s, JobStatus::Cancelled)),
            results,
            duration,
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.cancelled == 0
    }

    /// Jobs that actually invoked the tool to completion
    pub fn executed(&self) -> usize {
        self.succeeded - self.cached + self.failed
    }
}

fn format_stuck(stuck: &[StuckJob]) -> String {
    stuck.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

/// Run-level errors. Per-job failures are reported in [`RunReport`].
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// Some jobs can never become eligible
    #[error("Dependency cycle among targets: {}", format_stuck(.stuck))]
    Cycle { stuck: Vec<StuckJob> },

    #[error("Cache store failure: {0}")]
    Cache(#[from] CacheError),

    #[error("Failed to start runtime: {0}")]
    Runtime(std::io::Error),

    #[error("Worker task failed: {0}")]
    Join(String),
}

/// Schedules jobs over a project graph
pub struct Scheduler {
    root: PathBuf,
    graph: Arc<ProjectGraph>,
    solutions: Vec<Solution>,
    cache: Arc<ContentCache>,
    runner: Arc<dyn ToolRunner>,
    selector: Option<Arc<TestSelector>>,
    reporter: Arc<dyn JobReporter>,
    rules: Arc<IgnoreRules>,
    progress_capacity: usize,
}

impl Scheduler {
    pub fn new(
        root: impl Into<PathBuf>,
        graph: Arc<ProjectGraph>,
        solutions: Vec<Solution>,
        cache: Arc<ContentCache>,
        runner: Arc<dyn ToolRunner>,
    ) -> Self {
        Self {
            root: root.into(),
            graph,
            solutions,
            cache,
            runner,
            selector: None,
            reporter: Arc::new(TracingReporter),
            rules: Arc::new(IgnoreRules::builtin()),
            progress_capacity: DEFAULT_PROGRESS_CAPACITY,
        }
    }

    /// Narrow test runs with this selector
    pub fn with_selector(mut self, selector: TestSelector) -> Self {
        self.selector = Some(Arc::new(selector));
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn JobReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_rules(mut self, rules: Arc<IgnoreRules>) -> Self {
        self.rules = rules;
        self
    }

    /// Progress events beyond this many in flight are dropped
    pub fn with_progress_capacity(mut self, capacity: usize) -> Self {
        self.progress_capacity = capacity.max(1);
        self
    }

    /// Partition `targets` into jobs. `build_only` must be a subset of
    /// `targets`.
    pub fn plan(&self, targets: &[String], build_only: &BTreeSet<String>, options: &ExecuteOptions) -> BatchPlan {
        plan_batches(targets, &self.solutions, options.policy, build_only)
    }

    /// Projects whose latest recorded job, in runs started with `verb`,
    /// `extra_args` and `user_filter`, failed. Narrowed test runs and
    /// build-only jobs of those runs count. Solution entries expand to their
    /// members.
    pub fn failed_projects(
        &self,
        verb: &str,
        extra_args: &[String],
        user_filter: Option<&str>,
    ) -> Result<Vec<String>, CacheError> {
        let hash = run_args_hash(verb, extra_args, user_filter);
        // Entries come sorted by last run, so the final insert per target wins
        let mut latest: BTreeMap<String, bool> = BTreeMap::new();
        for (key, entry) in self.cache.run_entries(&hash)? {
            latest.insert(key.project, entry.success);
        }

        let mut failed = BTreeSet::new();
        for (target, success) in latest {
            if success {
                continue;
            }
            match self.solutions.iter().find(|s| s.path == target) {
                Some(solution) => failed.extend(solution.projects.iter().cloned()),
                None => {
                    failed.insert(target);
                }
            }
        }
        Ok(failed.into_iter().collect())
    }

    /// Execute `plan` on a runtime owned by this call. Must not be called
    /// from inside a Tokio runtime.
    pub fn execute_blocking(
        &self,
        plan: &BatchPlan,
        options: &ExecuteOptions,
        cancel: &CancellationToken,
    ) -> Result<RunReport, SchedulerError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(SchedulerError::Runtime)?;
        runtime.block_on(self.execute(plan, options, cancel))
    }

    /// Execute every job in `plan`, respecting same-run dependencies
    #[instrument(skip_all, fields(jobs = plan.job_count(), verb = %options.verb))]
    pub async fn execute(
        &self,
        plan: &BatchPlan,
        options: &ExecuteOptions,
        cancel: &CancellationToken,
    ) -> Result<RunReport, SchedulerError> {
        let start = Instant::now();
        let jobs = Arc::new(self.jobs_for(plan)?);

        let (progress_tx, mut progress_rx) = mpsc::channel::<JobEvent>(self.progress_capacity);
        let reporter = self.reporter.clone();
        let drain = tokio::spawn(async move {
            while let Some(event) = progress_rx.recv().await {
                reporter.report(&event);
            }
        });

        let run_token = cancel.child_token();
        let ctx = Arc::new(JobContext {
            root: self.root.clone(),
            graph: self.graph.clone(),
            rules: self.rules.clone(),
            cache: self.cache.clone(),
            runner: self.runner.clone(),
            selector: self.selector.clone(),
            options: options.clone(),
            progress: progress_tx,
            cancel: run_token.clone(),
        });

        let outcome = run_jobs(&ctx, &jobs, &run_token).await;
        drop(ctx);
        if let Err(e) = drain.await {
            debug!(error = %e, "progress reporter stopped early");
        }
        let report = RunReport::new(outcome?, start.elapsed());

        self.reporter.report(&JobEvent::AllCompleted {
            total: report.total,
            succeeded: report.succeeded,
            failed: report.failed,
            cached: report.cached,
            skipped: report.skipped,
            duration: report.duration,
        });
        Ok(report)
    }

    /// Jobs for `plan`, checked for cycles. A cycle that only exists because
    /// of solution grouping falls back to running projects individually.
    fn jobs_for(&self, plan: &BatchPlan) -> Result<Vec<Job>, SchedulerError> {
        let jobs = build_jobs(plan, &self.graph);
        let stuck = find_stuck(&jobs);
        if stuck.is_empty() {
            return Ok(jobs);
        }

        let stuck = if plan.groups.is_empty() {
            stuck
        } else {
            let targets: Vec<String> = plan
                .groups
                .iter()
                .flat_map(|g| g.members.iter().cloned())
                .chain(plan.individual.iter().cloned())
                .chain(plan.build_only.iter().cloned())
                .collect();
            let build_only: BTreeSet<String> = plan.build_only.iter().cloned().collect();
            let unbatched = build_jobs(&BatchPlan::unbatched(&targets, &build_only), &self.graph);
            let project_stuck = find_stuck(&unbatched);
            if project_stuck.is_empty() {
                warn!(
                    groups = plan.groups.len(),
                    "solution grouping creates a dependency cycle; running projects individually"
                );
                return Ok(unbatched);
            }
            project_stuck
        };

        for job in &stuck {
            error!(job = %job.target, waiting_on = ?job.waiting_on, "job can never start");
        }
        Err(SchedulerError::Cycle { stuck })
    }
}

/// State shared by every job of one run. Read-only apart from the cache,
/// which serializes its own access.
struct JobContext {
    root: PathBuf,
    graph: Arc<ProjectGraph>,
    rules: Arc<IgnoreRules>,
    cache: Arc<ContentCache>,
    runner: Arc<dyn ToolRunner>,
    selector: Option<Arc<TestSelector>>,
    options: ExecuteOptions,
    progress: mpsc::Sender<JobEvent>,
    cancel: CancellationToken,
}

/// One completed tool invocation
struct Attempt {
    success: bool,
    output: String,
    scan: OutputScan,
    reason: String,
}

impl JobContext {
    /// Best effort; never waits for the reporter
    fn emit(&self, event: JobEvent) {
        if let Err(mpsc::error::TrySendError::Full(_)) = self.progress.try_send(event) {
            debug!("progress channel full; event dropped");
        }
    }

    /// Verb, cache-relevant arguments and test selection for `job`
    async fn invocation_for(&self, job: &Job) -> (String, Vec<String>, Option<FilterResult>) {
        let options = &self.options;
        if job.kind == JobKind::BuildOnly {
            return (BUILD_VERB.to_string(), Vec::new(), None);
        }
        let mut args = options.extra_args.clone();
        if options.verb != TEST_VERB {
            return (options.verb.clone(), args, None);
        }

        let project = match (&job.kind, self.graph.get(&job.target)) {
            (JobKind::Project, Some(project)) if project.is_test => Some(project.clone()),
            _ => None,
        };
        let filter = match (project, &self.selector) {
            (Some(project), Some(selector)) => {
                let changed = self.graph.files_for_project(&project.path, &options.changed_files);
                let selector = selector.clone();
                let user = options.user_filter().map(str::to_string);
                let target = project.path.clone();
                let selected = tokio::task::spawn_blocking(move || {
                    selector.get_filter(&project, &changed, user.as_deref())
                })
                .await;
                match selected {
                    Ok(filter) => Some(filter),
                    Err(e) => {
                        warn!(project = %target, error = %e, "test selection aborted; running unfiltered");
                        None
                    }
                }
            }
            _ => None,
        };

        let expression = match &filter {
            Some(filter) => filter.filter_expression.clone(),
            None => options.user_filter().unwrap_or_default().to_string(),
        };
        if !expression.is_empty() {
            args.push("--filter".to_string());
            args.push(expression);
        }
        (options.verb.clone(), args, filter)
    }

    async fn check_freshness(&self, job: &Job, verb: &str) -> Freshness {
        if self.options.force {
            return Freshness::default();
        }
        let project = match (&job.kind, self.graph.get(&job.target)) {
            (JobKind::Project | JobKind::BuildOnly, Some(project)) => project.clone(),
            _ => return Freshness::default(),
        };
        let root = self.root.clone();
        let dirs = job.dirs.clone();
        let rules = self.rules.clone();
        let allow_skip_build = verb == TEST_VERB;
        tokio::task::spawn_blocking(move || freshness::check(&root, &project, &dirs, &rules, allow_skip_build))
            .await
            .unwrap_or_default()
    }

    /// Run the tool once; `None` when cancelled
    async fn attempt(&self, invocation: &Invocation) -> Option<Attempt> {
        match self.runner.run(invocation, &self.cancel).await {
            Ok(out) => {
                let scan = output::scan(&out.output);
                let success = scan.succeeded(out.exit_code);
                let reason = match (scan.failure_marker, out.exit_code) {
                    (Some(marker), _) => format!("output reports '{}'", marker),
                    (None, Some(code)) => format!("exited with code {}", code),
                    (None, None) => "terminated by signal".to_string(),
                };
                Some(Attempt {
                    success,
                    output: out.output,
                    scan,
                    reason,
                })
            }
            Err(RunnerError::Cancelled) => None,
            Err(e) => Some(Attempt {
                success: false,
                output: e.to_string(),
                scan: OutputScan::default(),
                reason: e.to_string(),
            }),
        }
    }

    fn cancelled(&self, job: &Job, start: Instant) -> JobResult {
        self.emit(JobEvent::Skipped {
            target: job.target.clone(),
            reason: "cancelled".to_string(),
        });
        let mut result = JobResult::new(&job.target, JobStatus::Cancelled);
        result.duration = start.elapsed();
        result
    }

    fn failed(&self, job: &Job, start: Instant, error: String) -> JobResult {
        let duration = start.elapsed();
        self.emit(JobEvent::Failed {
            target: job.target.clone(),
            duration,
            error: error.clone(),
        });
        let mut result = JobResult::new(&job.target, JobStatus::Failed(error));
        result.duration = duration;
        result
    }
}

/// Run one job: select, hash, consult the cache, invoke, record
async fn run_job(ctx: Arc<JobContext>, job: Job) -> Result<JobResult, CacheError> {
    let start = Instant::now();
    if ctx.cancel.is_cancelled() {
        return Ok(ctx.cancelled(&job, start));
    }
    let options = &ctx.options;

    let (verb, args, filter) = ctx.invocation_for(&job).await;
    if filter.as_ref().is_some_and(|f| f.excluded_by_user_filter) {
        let reason = "every selected test is excluded by the user filter".to_string();
        info!(job = %job.target, "{}", reason);
        ctx.emit(JobEvent::Skipped {
            target: job.target.clone(),
            reason: reason.clone(),
        });
        let mut result = JobResult::new(&job.target, JobStatus::Skipped(reason));
        result.filter = filter;
        return Ok(result);
    }

    let invocation = Invocation::new(&job.target, &verb, args);
    let display = invocation.display();
    ctx.emit(JobEvent::Started {
        target: job.target.clone(),
        command: display.clone(),
    });

    let hashed = {
        let root = ctx.root.clone();
        let dirs = job.dirs.clone();
        let rules = ctx.rules.clone();
        tokio::task::spawn_blocking(move || content_hash(&root, &dirs, &rules)).await
    };
    let content = match hashed {
        Ok(Ok(hash)) => hash,
        Ok(Err(e)) => return Ok(ctx.failed(&job, start, format!("content hashing failed: {}", e))),
        Err(e) => return Ok(ctx.failed(&job, start, format!("content hashing aborted: {}", e))),
    };
    let key = CacheKey::new(content, args_hash(&verb, &invocation.args), &job.target);

    if !options.force {
        if let Some(entry) = ctx.cache.lookup(&key)? {
            if entry.success && (!options.replay_output || !entry.output.is_empty()) {
                let duration = start.elapsed();
                ctx.emit(JobEvent::Completed {
                    target: job.target.clone(),
                    duration,
                    cached: true,
                });
                let mut result = JobResult::new(&job.target, JobStatus::Cached);
                result.duration = duration;
                result.summary = output::scan(&entry.output).summary;
                result.output = entry.output;
                result.filter = filter;
                return Ok(result);
            }
            debug!(key = %key, success = entry.success, "cache entry not reusable");
        }
    }

    let freshness = ctx.check_freshness(&job, &verb).await;
    let mut first = invocation.clone();
    first.args.extend(freshness.flags());

    let Some(mut attempt) = ctx.attempt(&first).await else {
        return Ok(ctx.cancelled(&job, start));
    };
    let mut retried = false;
    if !attempt.success && freshness.skip_restore && attempt.scan.needs_restore {
        let reason = "restore was skipped but dependencies are missing".to_string();
        warn!(job = %job.target, "{}; retrying with restore", reason);
        ctx.emit(JobEvent::Retrying {
            target: job.target.clone(),
            reason,
        });
        let Some(again) = ctx.attempt(&invocation).await else {
            return Ok(ctx.cancelled(&job, start));
        };
        attempt = again;
        retried = true;
    }

    // A run cut short by a failing sibling is not a result worth recording
    if !attempt.success && ctx.cancel.is_cancelled() {
        return Ok(ctx.cancelled(&job, start));
    }

    ctx.cache.mark(
        &key,
        CacheEntry {
            success: attempt.success,
            output: attempt.output.clone(),
            last_run: Utc::now(),
            args_display: display,
            run_args: options.run_args(),
        },
    )?;

    let mut result = if attempt.success {
        let duration = start.elapsed();
        ctx.emit(JobEvent::Completed {
            target: job.target.clone(),
            duration,
            cached: false,
        });
        let mut result = JobResult::new(&job.target, JobStatus::Success);
        result.duration = duration;
        result
    } else {
        ctx.failed(&job, start, attempt.reason)
    };
    result.summary = attempt.scan.summary;
    result.output = attempt.output;
    result.filter = filter;
    result.retried = retried;
    Ok(result)
}

type Completion = (usize, Result<JobResult, CacheError>);

async fn worker(
    ctx: Arc<JobContext>,
    jobs: Arc<Vec<Job>>,
    queue: Arc<Mutex<mpsc::UnboundedReceiver<usize>>>,
    done: mpsc::UnboundedSender<Completion>,
) {
    loop {
        let next = queue.lock().await.recv().await;
        let Some(idx) = next else { break };
        let job = jobs[idx].clone();
        let target = job.target.clone();

        let outcome = match tokio::spawn(run_job(ctx.clone(), job)).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(job = %target, error = %e, "job panicked");
                Ok(JobResult::new(target, JobStatus::Failed(format!("job panicked: {}", e))))
            }
        };
        if done.send((idx, outcome)).is_err() {
            break;
        }
    }
}

fn release(queue: &Option<mpsc::UnboundedSender<usize>>, idx: usize, released: &mut usize) {
    if let Some(queue) = queue {
        if queue.send(idx).is_ok() {
            *released += 1;
        }
    }
}

/// The control loop
async fn run_jobs(
    ctx: &Arc<JobContext>,
    jobs: &Arc<Vec<Job>>,
    run_token: &CancellationToken,
) -> Result<Vec<JobResult>, SchedulerError> {
    let options = &ctx.options;
    let total = jobs.len();
    if total == 0 {
        return Ok(Vec::new());
    }

    let mut pending: Vec<usize> = jobs.iter().map(|j| j.deps.len()).collect();
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); total];
    for (idx, job) in jobs.iter().enumerate() {
        for &dep in &job.deps {
            dependents[dep].push(idx);
        }
    }

    let (queue_tx, queue_rx) = mpsc::unbounded_channel::<usize>();
    let queue_rx = Arc::new(Mutex::new(queue_rx));
    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<Completion>();

    let workers = options.worker_count(total);
    info!(jobs = total, workers, keep_going = options.keep_going, "dispatching jobs");
    let handles: Vec<_> = (0..workers)
        .map(|_| {
            tokio::spawn(worker(
                ctx.clone(),
                jobs.clone(),
                queue_rx.clone(),
                done_tx.clone(),
            ))
        })
        .collect();
    drop(done_tx);

    let mut queue = Some(queue_tx);
    let mut released = 0usize;
    let mut finished = 0usize;
    let mut stopping = false;
    let mut fatal: Option<CacheError> = None;
    let mut results: Vec<Option<JobResult>> = vec![None; total];

    for idx in 0..total {
        if pending[idx] == 0 {
            release(&queue, idx, &mut released);
        }
    }
    if released == total {
        // Closing the queue lets idle workers exit once it drains
        queue = None;
    }

    while finished < released {
        let next = tokio::select! {
            next = done_rx.recv() => next,
            _ = run_token.cancelled(), if !stopping => {
                info!("run cancelled; no further jobs will start");
                stopping = true;
                queue = None;
                continue;
            }
        };
        let Some((idx, outcome)) = next else { break };
        finished += 1;

        let result = match outcome {
            Ok(result) => result,
            Err(e) => {
                error!(job = %jobs[idx].target, error = %e, "cache store failed; stopping the run");
                let result = JobResult::new(&jobs[idx].target, JobStatus::Failed(e.to_string()));
                fatal.get_or_insert(e);
                if !stopping {
                    stopping = true;
                    queue = None;
                    run_token.cancel();
                }
                result
            }
        };

        if matches!(result.status, JobStatus::Failed(_)) && !options.keep_going && !stopping {
            info!(job = %result.target, "job failed; cancelling the run");
            stopping = true;
            queue = None;
            run_token.cancel();
        }
        results[idx] = Some(result);

        if stopping {
            continue;
        }
        for &dependent in &dependents[idx] {
            pending[dependent] -= 1;
            if pending[dependent] == 0 {
                release(&queue, dependent, &mut released);
            }
        }
        if released == total {
            queue = None;
        }
    }

    drop(queue);
    for handle in handles {
        handle.await.map_err(|e| SchedulerError::Join(e.to_string()))?;
    }
    if let Some(e) = fatal {
        return Err(e.into());
    }

    Ok(results
        .into_iter()
        .zip(jobs.iter())
        .map(|(result, job)| {
            result.unwrap_or_else(|| {
                let reason = "not started: run stopped".to_string();
                ctx.emit(JobEvent::Skipped {
                    target: job.target.clone(),
                    reason: reason.clone(),
                });
                JobResult::new(&job.target, JobStatus::Skipped(reason))
            })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::freshness::NO_RESTORE;
    use crate::reporter::CollectingReporter;
    use crate::runner::ToolOutput;
    use async_trait::async_trait;
    use skipr_core::Project;
    use std::collections::HashSet;
    use std::fs;
    use std::path::Path;
    use std::time::SystemTime;
    use tempfile::TempDir;

    const CORE: &str = "src/Core/Core.csproj";
    const CORE_TESTS: &str = "tests/Core.Tests/Core.Tests.csproj";

    #[derive(Default)]
    struct FakeRunner {
        failing: HashSet<String>,
        restore_sensitive: bool,
        /// Succeed without printing anything
        quiet: bool,
        delay: Duration,
        log: std::sync::Mutex<Vec<String>>,
        invocations: std::sync::Mutex<Vec<Invocation>>,
    }

    impl FakeRunner {
        fn failing(targets: &[&str]) -> Self {
            Self {
                failing: targets.iter().map(|t| t.to_string()).collect(),
                ..Default::default()
            }
        }

        fn log(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }

        fn invocations(&self) -> Vec<Invocation> {
            self.invocations.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ToolRunner for FakeRunner {
        async fn run(&self, invocation: &Invocation, cancel: &CancellationToken) -> Result<ToolOutput, RunnerError> {
            self.invocations.lock().unwrap().push(invocation.clone());
            self.log.lock().unwrap().push(format!("start:{}", invocation.target));
            tokio::select! {
                _ = tokio::time::sleep(self.delay) => {}
                _ = cancel.cancelled() => return Err(RunnerError::Cancelled),
            }
            self.log.lock().unwrap().push(format!("end:{}", invocation.target));

            if self.failing.contains(&invocation.target) {
                return Ok(ToolOutput {
                    exit_code: Some(1),
                    output: "Build FAILED.".to_string(),
                });
            }
            if self.restore_sensitive && invocation.args.iter().any(|a| a == NO_RESTORE) {
                return Ok(ToolOutput {
                    exit_code: Some(1),
                    output: "error NETSDK1004: Assets file 'project.assets.json' not found.".to_string(),
                });
            }
            let output = if self.quiet {
                String::new()
            } else {
                "Passed!  - Failed:     0, Passed:     3, Skipped:     0, Total:     3".to_string()
            };
            Ok(ToolOutput {
                exit_code: Some(0),
                output,
            })
        }
    }

    struct Fixture {
        temp: TempDir,
        graph: Arc<ProjectGraph>,
        cache: Arc<ContentCache>,
    }

    impl Fixture {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            write(temp.path(), CORE, "<Project />");
            write(temp.path(), "src/Core/Calculator.cs", "class Calculator {}");
            write(temp.path(), CORE_TESTS, "<Project />");
            write(temp.path(), "tests/Core.Tests/CalculatorTests.cs", "class CalculatorTests {}");

            let graph = ProjectGraph::build(&[
                Project::new(CORE),
                Project::new(CORE_TESTS).with_reference(CORE).with_test(true),
            ]);
            let cache = ContentCache::open(temp.path().join(".skipr").join("cache")).unwrap();
            Self {
                temp,
                graph: Arc::new(graph),
                cache: Arc::new(cache),
            }
        }

        fn scheduler(&self, runner: Arc<FakeRunner>) -> Scheduler {
            Scheduler::new(
                self.temp.path(),
                self.graph.clone(),
                Vec::new(),
                self.cache.clone(),
                runner,
            )
        }
    }

    fn write(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    /// Scheduler over `projects`, each with one source file on disk
    fn scheduler_over(
        temp: &TempDir,
        projects: Vec<Project>,
        solutions: Vec<Solution>,
        runner: Arc<FakeRunner>,
    ) -> (Scheduler, Arc<ContentCache>) {
        for project in &projects {
            write(temp.path(), &project.path, "<Project />");
            write(temp.path(), &format!("{}/Source.cs", project.dir), "class Source {}");
        }
        let cache = Arc::new(ContentCache::open(temp.path().join("cache")).unwrap());
        let scheduler = Scheduler::new(
            temp.path(),
            Arc::new(ProjectGraph::build(&projects)),
            solutions,
            cache.clone(),
            runner,
        );
        (scheduler, cache)
    }

    fn position(log: &[String], event: &str) -> usize {
        log.iter().position(|e| e == event).unwrap()
    }

    fn both() -> BatchPlan {
        BatchPlan::unbatched(&[CORE.to_string(), CORE_TESTS.to_string()], &BTreeSet::new())
    }

    fn status_of<'a>(report: &'a RunReport, target: &str) -> &'a JobStatus {
        &report.results.iter().find(|r| r.target == target).unwrap().status
    }

    #[tokio::test]
    async fn test_dependency_finishes_before_dependent_starts() {
        let fx = Fixture::new();
        let runner = Arc::new(FakeRunner {
            delay: Duration::from_millis(20),
            ..Default::default()
        });
        let options = ExecuteOptions {
            concurrency: 4,
            ..Default::default()
        };

        let report = fx
            .scheduler(runner.clone())
            .execute(&both(), &options, &CancellationToken::new())
            .await
            .unwrap();

        assert!(report.is_success());
        assert_eq!(report.executed(), 2);
        let log = runner.log();
        let core_end = log.iter().position(|e| e == &format!("end:{}", CORE)).unwrap();
        let tests_start = log.iter().position(|e| e == &format!("start:{}", CORE_TESTS)).unwrap();
        assert!(core_end < tests_start);
        assert_eq!(report.results[1].summary.unwrap().passed, 3);
    }

    #[tokio::test]
    async fn test_failure_stops_the_run() {
        let fx = Fixture::new();
        let runner = Arc::new(FakeRunner::failing(&[CORE]));

        let report = fx
            .scheduler(runner.clone())
            .execute(&both(), &ExecuteOptions::default(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(!report.is_success());
        assert_eq!(report.failed, 1);
        assert_eq!(report.skipped, 1);
        assert!(matches!(status_of(&report, CORE), JobStatus::Failed(_)));
        assert!(matches!(status_of(&report, CORE_TESTS), JobStatus::Skipped(_)));
        assert_eq!(runner.invocations().len(), 1);
    }

    #[tokio::test]
    async fn test_keep_going_runs_dependents() {
        let fx = Fixture::new();
        let runner = Arc::new(FakeRunner::failing(&[CORE]));
        let options = ExecuteOptions {
            keep_going: true,
            ..Default::default()
        };

        let report = fx
            .scheduler(runner.clone())
            .execute(&both(), &options, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(status_of(&report, CORE_TESTS), &JobStatus::Success);
        assert_eq!(runner.invocations().len(), 2);
    }

    #[tokio::test]
    async fn test_second_run_is_fully_cached() {
        let fx = Fixture::new();
        let runner = Arc::new(FakeRunner::default());
        let scheduler = fx.scheduler(runner.clone());
        let options = ExecuteOptions::default();

        scheduler.execute(&both(), &options, &CancellationToken::new()).await.unwrap();
        let second = scheduler.execute(&both(), &options, &CancellationToken::new()).await.unwrap();

        assert_eq!(second.executed(), 0);
        assert_eq!(second.cached, 2);
        assert_eq!(runner.invocations().len(), 2);
        assert_eq!(second.results[1].summary.unwrap().total, 3);
    }

    #[tokio::test]
    async fn test_failed_entries_rerun() {
        let fx = Fixture::new();
        let plan = BatchPlan::unbatched(&[CORE.to_string()], &BTreeSet::new());
        let options = ExecuteOptions::default();

        let failing = Arc::new(FakeRunner::failing(&[CORE]));
        fx.scheduler(failing)
            .execute(&plan, &options, &CancellationToken::new())
            .await
            .unwrap();

        let passing = Arc::new(FakeRunner::default());
        let report = fx
            .scheduler(passing.clone())
            .execute(&plan, &options, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.results[0].status, JobStatus::Success);
        assert_eq!(passing.invocations().len(), 1);
    }

    #[tokio::test]
    async fn test_changed_library_reruns_tests_and_keeps_old_entry() {
        let fx = Fixture::new();
        let runner = Arc::new(FakeRunner::default());
        let scheduler = fx.scheduler(runner.clone());
        let options = ExecuteOptions::default();
        let rules = IgnoreRules::builtin();
        let dirs = fx.graph.relevant_dirs(CORE_TESTS).to_vec();
        let old_hash = content_hash(fx.temp.path(), &dirs, &rules).unwrap();

        scheduler.execute(&both(), &options, &CancellationToken::new()).await.unwrap();
        write(fx.temp.path(), "src/Core/Calculator.cs", "class Calculator { int Add() => 1; }");
        let report = scheduler.execute(&both(), &options, &CancellationToken::new()).await.unwrap();

        assert_eq!(status_of(&report, CORE_TESTS), &JobStatus::Success);
        assert!(report.results[1].filter.is_none());
        let new_hash = content_hash(fx.temp.path(), &dirs, &rules).unwrap();
        assert_ne!(old_hash, new_hash);

        let args = args_hash(TEST_VERB, &[]);
        let old = fx.cache.lookup(&CacheKey::new(old_hash, args.clone(), CORE_TESTS)).unwrap();
        let new = fx.cache.lookup(&CacheKey::new(new_hash, args, CORE_TESTS)).unwrap();
        assert!(old.is_some_and(|e| e.success));
        assert!(new.is_some_and(|e| e.success));
    }

    #[tokio::test]
    async fn test_cycle_rejected_before_dispatch() {
        let temp = TempDir::new().unwrap();
        let graph = ProjectGraph::build(&[
            Project::new("a/A.csproj").with_reference("b/B.csproj"),
            Project::new("b/B.csproj").with_reference("a/A.csproj"),
        ]);
        let cache = ContentCache::open(temp.path().join("cache")).unwrap();
        let runner = Arc::new(FakeRunner::default());
        let scheduler = Scheduler::new(
            temp.path(),
            Arc::new(graph),
            Vec::new(),
            Arc::new(cache),
            runner.clone(),
        );
        let plan = BatchPlan::unbatched(&["a/A.csproj".to_string(), "b/B.csproj".to_string()], &BTreeSet::new());

        let err = scheduler
            .execute(&plan, &ExecuteOptions::default(), &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            SchedulerError::Cycle { stuck } => {
                assert_eq!(stuck.len(), 2);
                assert_eq!(stuck[0].target, "a/A.csproj");
                assert_eq!(stuck[0].waiting_on, vec!["b/B.csproj"]);
                assert_eq!(stuck[1].waiting_on, vec!["a/A.csproj"]);
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(runner.invocations().is_empty());
    }

    #[tokio::test]
    async fn test_restore_failure_retried_once() {
        let fx = Fixture::new();
        let root = fx.temp.path();
        for file in [CORE, "src/Core/Calculator.cs"] {
            let handle = fs::File::options().write(true).open(root.join(file)).unwrap();
            handle
                .set_modified(SystemTime::now() - Duration::from_secs(600))
                .unwrap();
        }
        write(root, "src/Core/obj/project.assets.json", "{}");

        let runner = Arc::new(FakeRunner {
            restore_sensitive: true,
            ..Default::default()
        });
        let reporter = Arc::new(CollectingReporter::default());
        let plan = BatchPlan::unbatched(&[CORE.to_string()], &BTreeSet::new());
        let options = ExecuteOptions {
            verb: BUILD_VERB.to_string(),
            ..Default::default()
        };

        let report = fx
            .scheduler(runner.clone())
            .with_reporter(reporter.clone())
            .execute(&plan, &options, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.results[0].status, JobStatus::Success);
        assert!(report.results[0].retried);
        let invocations = runner.invocations();
        assert_eq!(invocations.len(), 2);
        assert!(invocations[0].args.iter().any(|a| a == NO_RESTORE));
        assert!(invocations[1].args.is_empty());
        assert!(reporter
            .events()
            .iter()
            .any(|e| matches!(e, JobEvent::Retrying { .. })));
    }

    #[tokio::test]
    async fn test_cancel_stops_in_flight_work() {
        let fx = Fixture::new();
        let runner = Arc::new(FakeRunner {
            delay: Duration::from_secs(30),
            ..Default::default()
        });
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let report = fx
            .scheduler(runner.clone())
            .execute(&both(), &ExecuteOptions::default(), &cancel)
            .await
            .unwrap();

        assert_eq!(status_of(&report, CORE), &JobStatus::Cancelled);
        assert!(matches!(status_of(&report, CORE_TESTS), JobStatus::Skipped(_)));
        assert!(fx.cache.entries(&args_hash(TEST_VERB, &[])).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_build_only_jobs_use_build_verb() {
        let fx = Fixture::new();
        let runner = Arc::new(FakeRunner::default());
        let scheduler = fx.scheduler(runner.clone());
        let options = ExecuteOptions {
            extra_args: vec!["--nologo".to_string()],
            user_filter: Some("Category!=Slow".to_string()),
            ..Default::default()
        };
        let build_only: BTreeSet<String> = [CORE.to_string()].into_iter().collect();
        let plan = scheduler.plan(&[CORE.to_string()], &build_only, &options);

        scheduler.execute(&plan, &options, &CancellationToken::new()).await.unwrap();

        let invocations = runner.invocations();
        assert_eq!(invocations[0].verb, BUILD_VERB);
        assert!(invocations[0].args.is_empty());
    }

    #[tokio::test]
    async fn test_user_filter_passed_through() {
        let fx = Fixture::new();
        let runner = Arc::new(FakeRunner::default());
        let options = ExecuteOptions {
            user_filter: Some(" Category!=Slow ".to_string()),
            ..Default::default()
        };
        let plan = BatchPlan::unbatched(&[CORE_TESTS.to_string()], &BTreeSet::new());

        fx.scheduler(runner.clone())
            .execute(&plan, &options, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(runner.invocations()[0].args, vec!["--filter", "Category!=Slow"]);
    }

    #[tokio::test]
    async fn test_failed_projects_uses_latest_entry() {
        let fx = Fixture::new();
        let options = ExecuteOptions {
            keep_going: true,
            ..Default::default()
        };
        let failing = fx.scheduler(Arc::new(FakeRunner::failing(&[CORE])));
        failing.execute(&both(), &options, &CancellationToken::new()).await.unwrap();
        assert_eq!(failing.failed_projects(TEST_VERB, &[], None).unwrap(), vec![CORE]);

        let passing = fx.scheduler(Arc::new(FakeRunner::default()));
        passing.execute(&both(), &options, &CancellationToken::new()).await.unwrap();
        assert!(passing.failed_projects(TEST_VERB, &[], None).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_projects_after_filtered_run() {
        let fx = Fixture::new();
        write(
            fx.temp.path(),
            "tests/Core.Tests/CalculatorTests.cs",
            "namespace Core.Tests;\n\npublic class CalculatorTests\n{\n    [Fact]\n    public void Adds() { }\n}\n",
        );
        let runner = Arc::new(FakeRunner::failing(&[CORE_TESTS]));
        let selector = TestSelector::new(
            fx.temp.path(),
            Arc::new(IgnoreRules::builtin()),
            Arc::new(crate::session::Session::new()),
        );
        let scheduler = fx.scheduler(runner.clone()).with_selector(selector);
        let options = ExecuteOptions {
            user_filter: Some("Category!=Slow".to_string()),
            changed_files: vec!["tests/Core.Tests/CalculatorTests.cs".to_string()],
            ..Default::default()
        };
        let plan = BatchPlan::unbatched(&[CORE_TESTS.to_string()], &BTreeSet::new());

        let report = scheduler.execute(&plan, &options, &CancellationToken::new()).await.unwrap();
        assert_eq!(report.failed, 1);
        let args = &runner.invocations()[0].args;
        assert!(args[1].contains("CalculatorTests") && args[1].contains("Category!=Slow"));

        assert_eq!(
            scheduler.failed_projects(TEST_VERB, &[], Some("Category!=Slow")).unwrap(),
            vec![CORE_TESTS]
        );
        assert!(scheduler.failed_projects(TEST_VERB, &[], None).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_projects_includes_build_only_jobs() {
        let fx = Fixture::new();
        let scheduler = fx.scheduler(Arc::new(FakeRunner::failing(&[CORE])));
        let options = ExecuteOptions::default();
        let build_only: BTreeSet<String> = [CORE.to_string()].into_iter().collect();
        let plan = scheduler.plan(&[CORE.to_string()], &build_only, &options);

        scheduler.execute(&plan, &options, &CancellationToken::new()).await.unwrap();
        assert_eq!(scheduler.failed_projects(TEST_VERB, &[], None).unwrap(), vec![CORE]);
    }

    #[tokio::test]
    async fn test_solution_job_gates_dependent_project() {
        const APP: &str = "src/App/App.csproj";
        let temp = TempDir::new().unwrap();
        let runner = Arc::new(FakeRunner {
            delay: Duration::from_millis(20),
            ..Default::default()
        });
        let (scheduler, cache) = scheduler_over(
            &temp,
            vec![
                Project::new(CORE),
                Project::new(CORE_TESTS).with_reference(CORE).with_test(true),
                Project::new(APP).with_reference(CORE),
            ],
            vec![Solution::new("Core.sln", vec![CORE.to_string(), CORE_TESTS.to_string()])],
            runner.clone(),
        );
        let options = ExecuteOptions {
            concurrency: 4,
            ..Default::default()
        };
        let targets = [CORE.to_string(), CORE_TESTS.to_string(), APP.to_string()];
        let plan = scheduler.plan(&targets, &BTreeSet::new(), &options);
        assert_eq!(plan.groups.len(), 1);
        assert_eq!(plan.individual, vec![APP]);

        let report = scheduler.execute(&plan, &options, &CancellationToken::new()).await.unwrap();
        assert_eq!(report.succeeded, 2);
        let log = runner.log();
        assert!(position(&log, "end:Core.sln") < position(&log, &format!("start:{}", APP)));

        let dirs = vec!["src/Core".to_string(), "tests/Core.Tests".to_string()];
        let content = content_hash(temp.path(), &dirs, &IgnoreRules::builtin()).unwrap();
        let key = CacheKey::new(content, args_hash(TEST_VERB, &[]), "Core.sln");
        assert!(cache.lookup(&key).unwrap().is_some_and(|e| e.success));

        let again = scheduler.execute(&plan, &options, &CancellationToken::new()).await.unwrap();
        assert_eq!(again.cached, 2);
        assert_eq!(runner.invocations().len(), 2);
    }

    #[tokio::test]
    async fn test_grouping_cycle_falls_back_to_projects() {
        const A: &str = "src/A/A.csproj";
        const B: &str = "src/B/B.csproj";
        const C: &str = "src/C/C.csproj";
        let temp = TempDir::new().unwrap();
        let runner = Arc::new(FakeRunner::default());
        let (scheduler, _cache) = scheduler_over(
            &temp,
            vec![
                Project::new(A).with_reference(B),
                Project::new(B).with_reference(C),
                Project::new(C),
            ],
            vec![Solution::new("AC.sln", vec![A.to_string(), C.to_string()])],
            runner.clone(),
        );
        let options = ExecuteOptions {
            concurrency: 3,
            ..Default::default()
        };
        let plan = scheduler.plan(&[A.to_string(), B.to_string(), C.to_string()], &BTreeSet::new(), &options);
        assert_eq!(plan.groups.len(), 1);

        let report = scheduler.execute(&plan, &options, &CancellationToken::new()).await.unwrap();
        assert_eq!(report.total, 3);
        assert!(report.is_success());
        let order: Vec<String> = runner.invocations().into_iter().map(|i| i.target).collect();
        assert_eq!(order, vec![C, B, A]);
    }

    #[tokio::test]
    async fn test_replay_treats_silent_hit_as_miss() {
        let fx = Fixture::new();
        let plan = BatchPlan::unbatched(&[CORE.to_string()], &BTreeSet::new());
        let quiet = Arc::new(FakeRunner {
            quiet: true,
            ..Default::default()
        });
        fx.scheduler(quiet)
            .execute(&plan, &ExecuteOptions::default(), &CancellationToken::new())
            .await
            .unwrap();

        let plain = Arc::new(FakeRunner::default());
        let report = fx
            .scheduler(plain.clone())
            .execute(&plan, &ExecuteOptions::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.results[0].status, JobStatus::Cached);
        assert!(plain.invocations().is_empty());

        let replay = ExecuteOptions {
            replay_output: true,
            ..Default::default()
        };
        let report = fx
            .scheduler(plain.clone())
            .execute(&plan, &replay, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.results[0].status, JobStatus::Success);
        assert_eq!(plain.invocations().len(), 1);

        let report = fx
            .scheduler(plain.clone())
            .execute(&plan, &replay, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.results[0].status, JobStatus::Cached);
        assert!(!report.results[0].output.is_empty());
    }

    #[tokio::test]
    async fn test_forced_run_executes_and_heals_cache() {
        let fx = Fixture::new();
        let plan = BatchPlan::unbatched(&[CORE.to_string()], &BTreeSet::new());
        write(fx.temp.path(), "src/Core/obj/project.assets.json", "{}");
        fx.scheduler(Arc::new(FakeRunner::failing(&[CORE])))
            .execute(&plan, &ExecuteOptions::default(), &CancellationToken::new())
            .await
            .unwrap();

        let forced = Arc::new(FakeRunner::default());
        let options = ExecuteOptions {
            force: true,
            ..Default::default()
        };
        let report = fx
            .scheduler(forced.clone())
            .execute(&plan, &options, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.results[0].status, JobStatus::Success);
        assert!(!forced.invocations()[0].args.iter().any(|a| a == NO_RESTORE));

        let after = Arc::new(FakeRunner::default());
        let report = fx
            .scheduler(after.clone())
            .execute(&plan, &ExecuteOptions::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.results[0].status, JobStatus::Cached);
        assert!(after.invocations().is_empty());
        assert!(fx
            .scheduler(after)
            .failed_projects(TEST_VERB, &[], None)
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_parallel_jobs_respect_every_dependency() {
        const UTIL: &str = "src/Util/Util.csproj";
        const APP: &str = "src/App/App.csproj";
        const APP_TESTS: &str = "tests/App.Tests/App.Tests.csproj";
        let temp = TempDir::new().unwrap();
        let runner = Arc::new(FakeRunner {
            delay: Duration::from_millis(30),
            ..Default::default()
        });
        let projects = vec![
            Project::new(CORE),
            Project::new(UTIL),
            Project::new(APP).with_reference(CORE).with_reference(UTIL),
            Project::new(APP_TESTS).with_reference(APP).with_test(true),
        ];
        let (scheduler, _cache) = scheduler_over(&temp, projects, Vec::new(), runner.clone());
        let options = ExecuteOptions {
            concurrency: 4,
            ..Default::default()
        };
        let targets: Vec<String> = [APP_TESTS, APP, UTIL, CORE].iter().map(|t| t.to_string()).collect();
        let plan = scheduler.plan(&targets, &BTreeSet::new(), &options);

        let report = scheduler.execute(&plan, &options, &CancellationToken::new()).await.unwrap();
        assert_eq!(report.succeeded, 4);

        let log = runner.log();
        for (dependent, dependency) in [(APP, CORE), (APP, UTIL), (APP_TESTS, APP)] {
            assert!(
                position(&log, &format!("end:{}", dependency)) < position(&log, &format!("start:{}", dependent)),
                "{} started before {} finished",
                dependent,
                dependency
            );
        }
        // Independent roots run side by side
        assert!(position(&log, &format!("start:{}", UTIL)) < position(&log, &format!("end:{}", CORE)));
        assert!(position(&log, &format!("start:{}", CORE)) < position(&log, &format!("end:{}", UTIL)));
    }

    #[tokio::test]
    async fn test_reporter_sees_all_completed_last() {
        let fx = Fixture::new();
        let reporter = Arc::new(CollectingReporter::default());
        fx.scheduler(Arc::new(FakeRunner::default()))
            .with_reporter(reporter.clone())
            .execute(&both(), &ExecuteOptions::default(), &CancellationToken::new())
            .await
            .unwrap();

        let events = reporter.events();
        assert!(matches!(
            events.last(),
            Some(JobEvent::AllCompleted { total: 2, succeeded: 2, .. })
        ));
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, JobEvent::Started { .. }))
                .count(),
            2
        );
    }

    #[test]
    fn test_execute_blocking() {
        let fx = Fixture::new();
        let report = fx
            .scheduler(Arc::new(FakeRunner::default()))
            .execute_blocking(&both(), &ExecuteOptions::default(), &CancellationToken::new())
            .unwrap();
        assert_eq!(report.succeeded, 2);
    }

    #[test]
    fn test_worker_count_clamped() {
        let options = ExecuteOptions {
            concurrency: 8,
            ..Default::default()
        };
        assert_eq!(options.worker_count(3), 3);
        assert_eq!(options.worker_count(0), 1);
        assert!(ExecuteOptions::default().worker_count(100) >= 1);
    }
}
