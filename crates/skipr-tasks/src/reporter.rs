//! Job progress reporting

use std::sync::Mutex;
use std::time::Duration;

/// Events emitted while a run progresses
#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    /// A job is starting
    Started {
        target: String,
        command: String,
    },
    /// A job finished successfully
    Completed {
        target: String,
        duration: Duration,
        cached: bool,
    },
    /// A job failed
    Failed {
        target: String,
        duration: Duration,
        error: String,
    },
    /// A job did not run
    Skipped {
        target: String,
        reason: String,
    },
    /// A job is retried with restore forced on
    Retrying {
        target: String,
        reason: String,
    },
    /// All jobs completed
    AllCompleted {
        total: usize,
        succeeded: usize,
        failed: usize,
        cached: usize,
        skipped: usize,
        duration: Duration,
    },
}

/// Trait for reporting job progress
pub trait JobReporter: Send + Sync {
    /// Handle a job event
    fn report(&self, event: &JobEvent);
}

/// Simple reporter that logs to tracing
#[derive(Debug, Default)]
pub struct TracingReporter;

impl JobReporter for TracingReporter {
    fn report(&self, event: &JobEvent) {
        match event {
            JobEvent::Started { target, command } => {
                tracing::info!(job = %target, "starting: {}", command);
            }
            JobEvent::Completed { target, duration, cached } => {
                if *cached {
                    tracing::info!(job = %target, "cached");
                } else {
                    tracing::info!(job = %target, "completed in {:.1}s", duration.as_secs_f64());
                }
            }
            JobEvent::Failed { target, duration, error } => {
                tracing::error!(job = %target, "failed after {:.1}s: {}", duration.as_secs_f64(), error);
            }
            JobEvent::Skipped { target, reason } => {
                tracing::info!(job = %target, "skipped: {}", reason);
            }
            JobEvent::Retrying { target, reason } => {
                tracing::warn!(job = %target, "retrying: {}", reason);
            }
            JobEvent::AllCompleted {
                total,
                succeeded,
                failed,
                cached,
                skipped,
                duration,
            } => {
                tracing::info!(
                    "run complete: {}/{} succeeded, {} failed, {} cached, {} skipped ({:.1}s)",
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

/// Reporter that collects events for later inspection (useful for testing)
#[derive(Debug, Default)]
pub struct CollectingReporter {
    events: Mutex<Vec<JobEvent>>,
}

impl CollectingReporter {
    /// Get all collected events
    pub fn events(&self) -> Vec<JobEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl JobReporter for CollectingReporter {
    fn report(&self, event: &JobEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
