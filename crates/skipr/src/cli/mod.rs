//! CLI definition and command handling

pub mod commands;
pub mod output;
pub mod workspace;

use clap::{Parser, Subcommand};

use commands::{AffectedCommand, BuildCommand, CacheCommand, CoverageCommand, TestCommand};

/// skipr - incremental build and test runner
#[derive(Debug, Parser)]
#[command(name = "skipr")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Working directory
    #[arg(short = 'C', long, global = true)]
    pub directory: Option<std::path::PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for CLI
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    #[default]
    Text,
    /// JSON output
    Json,
}

/// Available commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List projects affected by the current changes
    Affected(AffectedCommand),

    /// Build affected projects
    Build(BuildCommand),

    /// Test affected projects, narrowing runs where possible
    Test(TestCommand),

    /// Result cache management
    Cache(CacheCommand),

    /// Coverage map management
    Coverage(CoverageCommand),
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> anyhow::Result<()> {
        if let Some(dir) = &self.directory {
            std::env::set_current_dir(dir)?;
        }

        match self.command {
            Commands::Affected(ref cmd) => cmd.execute(&self),
            Commands::Build(ref cmd) => cmd.execute(&self),
            Commands::Test(ref cmd) => cmd.execute(&self),
            Commands::Cache(ref cmd) => cmd.execute(&self),
            Commands::Coverage(ref cmd) => cmd.execute(&self),
        }
    }
}
