//! Jobs derived from a batch plan

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::time::Duration;

use serde::Serialize;

use skipr_core::ProjectGraph;

use crate::batching::BatchPlan;
use crate::output::TestSummary;
use crate::selection::FilterResult;

/// What a job invokes the tool on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobKind {
    /// One project under the run's verb
    Project,
    /// A solution covering several target projects
    Solution { members: Vec<String> },
    /// A project only built to check that it compiles
    BuildOnly,
}

/// One unit of scheduled work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    /// Project or solution path; also the cache key's project component
    pub target: String,
    pub kind: JobKind,
    /// Directories hashed for the cache key
    pub dirs: Vec<String>,
    /// Indices of same-run jobs this one waits for
    pub deps: Vec<usize>,
}

impl Job {
    /// Projects the job covers
    pub fn projects(&self) -> Vec<String> {
        match &self.kind {
            JobKind::Solution { members } => members.clone(),
            JobKind::Project | JobKind::BuildOnly => vec![self.target.clone()],
        }
    }
}

/// Turn a plan into jobs with dependency edges.
///
/// Job J waits on job K when a project in J references a project owned by
/// K. References leaving the plan are treated as already satisfied.
pub fn build_jobs(plan: &BatchPlan, graph: &ProjectGraph) -> Vec<Job> {
    let mut jobs: Vec<Job> = Vec::with_capacity(plan.job_count());

    for group in &plan.groups {
        let dirs: BTreeSet<String> = group
            .members
            .iter()
            .flat_map(|m| graph.relevant_dirs(m).iter().cloned())
            .collect();
        jobs.push(Job {
            target: group.solution.clone(),
            kind: JobKind::Solution {
                members: group.members.clone(),
            },
            dirs: dirs.into_iter().collect(),
            deps: Vec::new(),
        });
    }
    for (targets, kind) in [(&plan.individual, JobKind::Project), (&plan.build_only, JobKind::BuildOnly)] {
        for target in targets {
            jobs.push(Job {
                target: target.clone(),
                kind: kind.clone(),
                dirs: graph.relevant_dirs(target).to_vec(),
                deps: Vec::new(),
            });
        }
    }

    let mut owner: HashMap<String, usize> = HashMap::new();
    for (idx, job) in jobs.iter().enumerate() {
        for project in job.projects() {
            owner.insert(project, idx);
        }
    }

    for idx in 0..jobs.len() {
        let deps: BTreeSet<usize> = jobs[idx]
            .projects()
            .iter()
            .flat_map(|p| graph.dependencies(p).iter())
            .filter_map(|d| owner.get(d).copied())
            .filter(|&k| k != idx)
            .collect();
        jobs[idx].deps = deps.into_iter().collect();
    }
    jobs
}

/// A job that can never become eligible
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StuckJob {
    pub target: String,
    pub waiting_on: Vec<String>,
}

impl std::fmt::Display for StuckJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} waiting on {}", self.target, self.waiting_on.join(", "))
    }
}

/// Jobs left over once every releasable job has been released; empty when
/// the dependency edges are acyclic
pub fn find_stuck(jobs: &[Job]) -> Vec<StuckJob> {
    let mut pending: Vec<usize> = jobs.iter().map(|j| j.deps.len()).collect();
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); jobs.len()];
    for (idx, job) in jobs.iter().enumerate() {
        for &dep in &job.deps {
            dependents[dep].push(idx);
        }
    }

    let mut done = vec![false; jobs.len()];
    let mut queue: VecDeque<usize> = (0..jobs.len()).filter(|&i| pending[i] == 0).collect();
    while let Some(idx) = queue.pop_front() {
        done[idx] = true;
        for &d in &dependents[idx] {
            pending[d] -= 1;
            if pending[d] == 0 {
                queue.push_back(d);
            }
        }
    }

    jobs.iter()
        .enumerate()
        .filter(|(idx, _)| !done[*idx])
        .map(|(_, job)| StuckJob {
            target: job.target.clone(),
            waiting_on: job
                .deps
                .iter()
                .filter(|&&d| !done[d])
                .map(|&d| jobs[d].target.clone())
                .collect(),
        })
        .collect()
}

/// Final state of a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum JobStatus {
    /// Tool ran and succeeded
    Success,
    /// A successful cache entry matched
    Cached,
    Failed(String),
    /// Not run
    Skipped(String),
    /// Interrupted by cancellation
    Cancelled,
}

impl JobStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success | Self::Cached)
    }
}

/// Outcome of one job
#[derive(Debug, Clone, Serialize)]
pub struct JobResult {
    pub target: String,
    pub status: JobStatus,
    pub duration: Duration,
    /// Tool output, or the cached output on a hit
    pub output: String,
    pub summary: Option<TestSummary>,
    /// Test selection applied to the run, if any
    pub filter: Option<FilterResult>,
    /// Re-run once with restore forced on
    pub retried: bool,
}

impl JobResult {
    pub fn new(target: impl Into<String>, status: JobStatus) -> Self {
        Self {
            target: target.into(),
            status,
            duration: Duration::ZERO,
            output: String::new(),
            summary: None,
            filter: None,
            retried: false,
        }
    }
}
