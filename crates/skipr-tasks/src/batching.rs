//! Solution-level batching
//!
//! Targets that share a solution can be run through one solution-level
//! invocation so the external tool coordinates their shared restore and
//! output artifacts itself.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{debug, info, instrument};

use skipr_core::{BatchPolicy, Solution};

/// Targets routed through one solution invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SolutionGroup {
    pub solution: String,
    /// Member projects that are targets, sorted
    pub members: Vec<String>,
}

/// How the targets of a run are partitioned into jobs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchPlan {
    pub groups: Vec<SolutionGroup>,
    /// Targets run one project at a time
    pub individual: Vec<String>,
    /// Targets only built to verify they compile; never batched
    pub build_only: Vec<String>,
    /// One solution covers the entire target set
    pub whole_solution: bool,
}

impl BatchPlan {
    /// Plan without batching
    pub fn unbatched(targets: &[String], build_only: &BTreeSet<String>) -> Self {
        let mut plan = Self::default();
        for target in sorted_unique(targets) {
            if build_only.contains(&target) {
                plan.build_only.push(target);
            } else {
                plan.individual.push(target);
            }
        }
        plan
    }

    /// Number of jobs this plan produces
    pub fn job_count(&self) -> usize {
        self.groups.len() + self.individual.len() + self.build_only.len()
    }

    pub fn is_empty(&self) -> bool {
        self.job_count() == 0
    }
}

fn sorted_unique(items: &[String]) -> Vec<String> {
    items
        .iter()
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Partition targets into solution groups and individual jobs.
///
/// `auto` batches a solution only when every member is a target, `force`
/// when at least two members are, `never` not at all. A solution group
/// always holds at least two projects, and each project joins at most one
/// group.
#[instrument(skip_all, fields(targets = targets.len(), solutions = solutions.len(), %policy))]
pub fn plan_batches(
    targets: &[String],
    solutions: &[Solution],
    policy: BatchPolicy,
    build_only: &BTreeSet<String>,
) -> BatchPlan {
    let mut plan = BatchPlan::unbatched(targets, build_only);
    if policy == BatchPolicy::Never {
        return plan;
    }

    let candidates: BTreeSet<String> = plan.individual.iter().cloned().collect();
    if candidates.len() < 2 {
        return plan;
    }

    // Fast path: one solution is exactly the whole target set
    if plan.build_only.is_empty() {
        if let Some(solution) = solutions.iter().find(|s| {
            s.projects.iter().cloned().collect::<BTreeSet<_>>() == candidates
        }) {
            info!(solution = %solution.path, members = candidates.len(), "whole target set is one solution");
            plan.groups.push(SolutionGroup {
                solution: solution.path.clone(),
                members: candidates.into_iter().collect(),
            });
            plan.individual.clear();
            plan.whole_solution = true;
            return plan;
        }
    }

    let mut ranked: Vec<(&Solution, BTreeSet<String>)> = solutions
        .iter()
        .map(|s| {
            let hit: BTreeSet<String> = s
                .projects
                .iter()
                .filter(|p| candidates.contains(*p))
                .cloned()
                .collect();
            (s, hit)
        })
        .filter(|(_, hit)| hit.len() >= 2)
        .collect();
    ranked.sort_by(|a, b| b.1.len().cmp(&a.1.len()).then_with(|| a.0.path.cmp(&b.0.path)));

    let mut claimed: BTreeSet<String> = BTreeSet::new();
    for (solution, hit) in ranked {
        let qualifies = match policy {
            BatchPolicy::Auto => {
                hit.len() == solution.projects.len() && hit.is_disjoint(&claimed)
            }
            BatchPolicy::Force => hit.difference(&claimed).count() >= 2,
            BatchPolicy::Never => false,
        };
        if !qualifies {
            debug!(solution = %solution.path, "solution not batched");
            continue;
        }

        let members: Vec<String> = hit.difference(&claimed).cloned().collect();
        claimed.extend(members.iter().cloned());
        debug!(solution = %solution.path, members = members.len(), "solution batched");
        plan.groups.push(SolutionGroup {
            solution: solution.path.clone(),
            members,
        });
    }

    plan.individual.retain(|p| !claimed.contains(p));
    info!(
        groups = plan.groups.len(),
        individual = plan.individual.len(),
        build_only = plan.build_only.len(),
        "batch plan ready"
    );
    plan
}
