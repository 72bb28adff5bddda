//! Test command - run affected tests

use clap::Args;

use skipr_tasks::TEST_VERB;

use super::run::{run, RunArgs, TestOptions};
use crate::cli::Cli;

/// Test affected projects
#[derive(Debug, Args)]
pub struct TestCommand {
    #[command(flatten)]
    pub run: RunArgs,

    /// Test filter expression, combined with any computed filter
    #[arg(long)]
    pub filter: Option<String>,

    /// Only rerun projects whose last run with these arguments failed
    #[arg(long, conflicts_with_all = ["since", "all"])]
    pub failed: bool,

    /// Print tool output for every job, cached ones included
    #[arg(long)]
    pub replay: bool,
}

impl TestCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        let options = TestOptions {
            filter: self.filter.clone(),
            failed: self.failed,
            replay: self.replay,
        };
        run(cli, TEST_VERB, &self.run, &options)
    }
}
