//! Build command - build affected projects

use clap::Args;

use skipr_tasks::BUILD_VERB;

use super::run::{run, RunArgs, TestOptions};
use crate::cli::Cli;

/// Build affected projects
#[derive(Debug, Args)]
pub struct BuildCommand {
    #[command(flatten)]
    pub run: RunArgs,
}

impl BuildCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        run(cli, BUILD_VERB, &self.run, &TestOptions::default())
    }
}
