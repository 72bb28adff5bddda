//! Shared run pipeline for `build` and `test`

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use console::style;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use skipr_core::{BatchPolicy, ProjectGraph};
use skipr_tasks::{
    BatchPlan, CoverageStore, ExecuteOptions, Heuristic, JobEvent, JobReporter, JobStatus,
    ProcessRunner, RunReport, Scheduler, Session, TestSelector, TracingReporter, TEST_VERB,
};

use crate::cli::output;
use crate::cli::workspace::Workspace;
use crate::cli::{Cli, OutputFormat};

/// Exit code after an interrupt
const CANCELLED_EXIT: i32 = 130;

/// Options shared by commands that run the external tool
#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Compare against this reference instead of uncommitted changes
    #[arg(long)]
    pub since: Option<String>,

    /// Run every project, not only affected ones
    #[arg(long, conflicts_with = "since")]
    pub all: bool,

    /// Keep running independent jobs after a failure
    #[arg(long)]
    pub keep_going: bool,

    /// Ignore cached results
    #[arg(long)]
    pub force: bool,

    /// Number of parallel jobs (default: from config, 0 = CPU count)
    #[arg(short = 'j', long)]
    pub jobs: Option<usize>,

    /// Solution batching policy (auto, force, never)
    #[arg(long, value_parser = parse_policy)]
    pub batch: Option<BatchPolicy>,

    /// Show the job plan without running it
    #[arg(long)]
    pub dry_run: bool,

    /// Extra arguments passed to the tool (after `--`)
    #[arg(last = true)]
    pub tool_args: Vec<String>,
}

fn parse_policy(value: &str) -> Result<BatchPolicy, String> {
    BatchPolicy::parse(value).ok_or_else(|| format!("unknown batching policy '{}'", value))
}

/// Test-only knobs
#[derive(Debug, Default)]
pub struct TestOptions {
    pub filter: Option<String>,
    pub failed: bool,
    pub replay: bool,
}

/// Targets for one run: what to schedule and which of those only build
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Targets {
    pub targets: Vec<String>,
    pub build_only: BTreeSet<String>,
}

/// Split candidate projects into test targets and build-only targets.
/// Non-test projects covered by a test target are verified through it.
pub fn select_targets(graph: &ProjectGraph, candidates: &BTreeSet<String>, verb: &str) -> Targets {
    if verb != TEST_VERB {
        return Targets {
            targets: candidates.iter().cloned().collect(),
            build_only: BTreeSet::new(),
        };
    }
    let build_only = graph.untested_projects(candidates);
    let targets = candidates
        .iter()
        .filter(|p| build_only.contains(*p) || graph.get(p).is_some_and(|project| project.is_test))
        .cloned()
        .collect();
    Targets { targets, build_only }
}

/// Resolve targets, plan, execute and report
pub fn run(cli: &Cli, verb: &str, args: &RunArgs, test: &TestOptions) -> anyhow::Result<()> {
    let cwd = std::env::current_dir()?;
    let ws = Workspace::load(&cwd)?;
    let engine = &ws.config.engine;
    let cache = Arc::new(ws.open_cache()?);

    let changed = if args.all || test.failed { Vec::new() } else { ws.changed_files(args.since.as_deref())? };
    let candidates: BTreeSet<String> = if test.failed {
        let failed = Scheduler::new(
            &ws.root,
            ws.graph.clone(),
            ws.solutions.clone(),
            cache.clone(),
            Arc::new(ProcessRunner::new(&engine.tool, &ws.root)),
        )
        .failed_projects(verb, &args.tool_args, test.filter.as_deref())
        .context("Failed to read failed projects from the cache")?;
        failed.into_iter().filter(|p| ws.graph.get(p).is_some()).collect()
    } else if args.all {
        ws.graph.projects().map(|p| p.path.clone()).collect()
    } else {
        ws.graph.affected(&ws.graph.changed_projects(&changed))
    };

    let selected = select_targets(&ws.graph, &candidates, verb);
    if selected.targets.is_empty() {
        if !cli.quiet && cli.format == OutputFormat::Text {
            output::success(if test.failed { "No failed projects recorded" } else { "Nothing to do" });
        }
        return Ok(());
    }

    let reporter: Arc<dyn JobReporter> = if cli.quiet || cli.format == OutputFormat::Json {
        Arc::new(TracingReporter)
    } else {
        Arc::new(ConsoleReporter::new(cli.verbose))
    };

    let mut scheduler = Scheduler::new(
        &ws.root,
        ws.graph.clone(),
        ws.solutions.clone(),
        cache,
        Arc::new(ProcessRunner::new(&engine.tool, &ws.root)),
    )
    .with_rules(ws.rules.clone())
    .with_reporter(reporter)
    .with_progress_capacity(engine.progress_capacity);

    if verb == TEST_VERB {
        let mut selector = TestSelector::new(&ws.root, ws.rules.clone(), Arc::new(Session::new()))
            .with_heuristics(Heuristic::from_names(&ws.config.selection.heuristics));
        if ws.config.selection.coverage {
            selector = selector.with_coverage(CoverageStore::new(&ws.cache_dir()));
        }
        scheduler = scheduler.with_selector(selector);
    }

    let options = ExecuteOptions {
        verb: verb.to_string(),
        extra_args: args.tool_args.clone(),
        concurrency: args.jobs.unwrap_or(engine.concurrency),
        keep_going: args.keep_going || engine.keep_going,
        force: args.force,
        replay_output: test.replay,
        user_filter: test.filter.clone(),
        changed_files: changed,
        policy: args.batch.unwrap_or(engine.batching),
    };

    let plan = scheduler.plan(&selected.targets, &selected.build_only, &options);
    if args.dry_run {
        return print_plan(cli, &plan);
    }
    if !cli.quiet && cli.format == OutputFormat::Text {
        output::info(&format!(
            "{} for {} at {}",
            output::plural(plan.job_count(), "job"),
            output::plural(selected.targets.len(), "project"),
            ws.revision()
        ));
        println!();
    }

    let runtime = tokio::runtime::Runtime::new()?;
    let cancel = CancellationToken::new();
    let report = runtime.block_on(async {
        let interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received; cancelling");
                interrupt.cancel();
            }
        });
        scheduler.execute(&plan, &options, &cancel).await
    })?;
    drop(runtime);

    print_report(cli, &report, test.replay)?;

    match outcome(&report, cancel.is_cancelled()) {
        Outcome::Passed => Ok(()),
        Outcome::Failed(failed) => anyhow::bail!("{} failed", output::plural(failed, "job")),
        Outcome::Interrupted => {
            info!("run cancelled");
            std::process::exit(CANCELLED_EXIT);
        }
    }
}

/// How a finished run ends the process
#[derive(Debug, PartialEq, Eq)]
enum Outcome {
    Passed,
    Failed(usize),
    /// The user interrupted the run
    Interrupted,
}

/// Jobs cancelled because a sibling failed are part of a failed run, not an
/// interrupt.
fn outcome(report: &RunReport, interrupted: bool) -> Outcome {
    if interrupted {
        Outcome::Interrupted
    } else if report.failed > 0 {
        Outcome::Failed(report.failed)
    } else {
        Outcome::Passed
    }
}

fn print_plan(cli: &Cli, plan: &BatchPlan) -> anyhow::Result<()> {
    if cli.format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(plan)?);
        return Ok(());
    }

    println!("{}", output::header("Job plan"));
    println!();
    for group in &plan.groups {
        println!("  {} {}", style("solution").dim(), output::path_style().apply_to(&group.solution));
        for member in &group.members {
            println!("    {}", member);
        }
    }
    for project in &plan.individual {
        println!("  {} {}", style("project").dim(), output::path_style().apply_to(project));
    }
    for project in &plan.build_only {
        println!("  {} {}", style("build").dim(), output::path_style().apply_to(project));
    }
    println!();
    println!("{}", style("[DRY RUN - nothing was executed]").yellow().bold());
    Ok(())
}

fn print_report(cli: &Cli, report: &RunReport, replay: bool) -> anyhow::Result<()> {
    if cli.format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    if cli.quiet {
        return Ok(());
    }

    for result in &report.results {
        let show = replay || matches!(result.status, JobStatus::Failed(_));
        if !show || result.output.trim().is_empty() {
            continue;
        }
        println!();
        println!("{}", output::header(&format!("── {} ──", result.target)));
        println!("{}", result.output.trim_end());
    }

    let narrowed: Vec<_> = report
        .results
        .iter()
        .filter_map(|r| r.filter.as_ref().filter(|f| f.can_filter).map(|f| (&r.target, f)))
        .collect();
    if cli.verbose && !narrowed.is_empty() {
        println!();
        for (target, filter) in narrowed {
            println!("{}", output::key_value(target, &filter.reason));
        }
    }
    Ok(())
}

/// Console reporter with live status lines
struct ConsoleReporter {
    verbose: bool,
}

impl ConsoleReporter {
    fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl JobReporter for ConsoleReporter {
    fn report(&self, event: &JobEvent) {
        match event {
            JobEvent::Started { target, command } => {
                println!(
                    "  {} {} {}",
                    style("▸").dim(),
                    style(target).bold(),
                    if self.verbose {
                        style(format!("({})", command)).dim().to_string()
                    } else {
                        String::new()
                    }
                );
            }
            JobEvent::Completed {
                target,
                duration,
                cached,
            } => {
                println!(
                    "  {} {}{} {}",
                    style("✓").green(),
                    style(target).green(),
                    if *cached {
                        format!(" {}", style("(cached)").cyan())
                    } else {
                        String::new()
                    },
                    style(format!("{:.1}s", duration.as_secs_f64())).dim()
                );
            }
            JobEvent::Failed {
                target,
                duration,
                error,
            } => {
                println!(
                    "  {} {} {} {}",
                    style("✗").red(),
                    style(target).red(),
                    style(format!("{:.1}s", duration.as_secs_f64())).dim(),
                    style(error).red().dim()
                );
            }
            JobEvent::Skipped { target, reason } => {
                println!(
                    "  {} {} {}",
                    style("○").yellow(),
                    style(target).yellow(),
                    style(format!("({})", reason)).dim()
                );
            }
            JobEvent::Retrying { target, reason } => {
                println!(
                    "  {} {} {}",
                    style("↻").yellow(),
                    style(target).yellow(),
                    style(format!("({})", reason)).dim()
                );
            }
            JobEvent::AllCompleted {
                total,
                succeeded,
                failed,
                cached,
                skipped,
                duration,
            } => {
                println!();
                println!(
                    "  {} {}/{} succeeded, {} failed, {} cached, {} skipped ({:.1}s)",
                    if *failed == 0 {
                        style("✓").green().bold()
                    } else {
                        style("✗").red().bold()
                    },
                    succeeded,
                    total,
                    failed,
                    cached,
                    skipped,
                    duration.as_secs_f64()
                );
            }
        }
    }
}
