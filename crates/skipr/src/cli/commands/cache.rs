//! Cache management command

use std::collections::BTreeMap;
use std::time::Duration;

use clap::{Args, Subcommand};
use console::style;

use skipr_tasks::hashing::run_args_hash;
use skipr_tasks::TEST_VERB;

use crate::cli::workspace::Workspace;
use crate::cli::{output, Cli, OutputFormat};

/// Result cache management
#[derive(Debug, Args)]
pub struct CacheCommand {
    #[command(subcommand)]
    pub action: CacheAction,
}

/// Cache subcommands
#[derive(Debug, Subcommand)]
pub enum CacheAction {
    /// Show cache statistics
    Status(CacheStatusCommand),
    /// Remove old cache entries
    Prune(CachePruneCommand),
    /// Clear all cached results
    Clean(CacheCleanCommand),
    /// List projects whose last recorded run failed
    Failed(CacheFailedCommand),
}

/// Show cache statistics
#[derive(Debug, Args)]
pub struct CacheStatusCommand;

/// Prune old cache entries
#[derive(Debug, Args)]
pub struct CachePruneCommand {
    /// Maximum age in days (default: 7)
    #[arg(long, default_value = "7")]
    pub max_age_days: u64,
}

/// Clear all cached results
#[derive(Debug, Args)]
pub struct CacheCleanCommand {
    /// Skip confirmation
    #[arg(short = 'y', long)]
    pub yes: bool,
}

/// List projects whose latest job failed in runs started with one argument set
#[derive(Debug, Args)]
pub struct CacheFailedCommand {
    /// Tool verb the runs used
    #[arg(long, default_value = TEST_VERB)]
    pub verb: String,

    /// Test filter expression the runs used
    #[arg(long)]
    pub filter: Option<String>,

    /// Extra tool arguments the runs used (after `--`)
    #[arg(last = true)]
    pub tool_args: Vec<String>,
}

impl CacheCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        let cwd = std::env::current_dir()?;
        let ws = Workspace::load(&cwd)?;
        match &self.action {
            CacheAction::Status(cmd) => cmd.execute(cli, &ws),
            CacheAction::Prune(cmd) => cmd.execute(cli, &ws),
            CacheAction::Clean(cmd) => cmd.execute(cli, &ws),
            CacheAction::Failed(cmd) => cmd.execute(cli, &ws),
        }
    }
}

impl CacheStatusCommand {
    fn execute(&self, cli: &Cli, ws: &Workspace) -> anyhow::Result<()> {
        let cache = ws.open_cache()?;
        let stats = cache.status()?;

        if cli.format == OutputFormat::Json {
            let result = serde_json::json!({
                "entries": stats.entries,
                "argument_sets": stats.argument_sets,
                "total_size": stats.total_size,
                "total_size_formatted": stats.formatted_size(),
                "cache_dir": cache.cache_dir().display().to_string(),
            });
            println!("{}", serde_json::to_string_pretty(&result)?);
        } else if !cli.quiet {
            println!("{}", output::header("Result Cache Status"));
            println!();
            println!("  Location:      {}", style(cache.cache_dir().display()).cyan());
            println!("  Entries:       {}", stats.entries);
            println!("  Argument sets: {}", stats.argument_sets);
            println!("  Size:          {}", style(stats.formatted_size()).yellow());
        }

        Ok(())
    }
}

impl CachePruneCommand {
    fn execute(&self, cli: &Cli, ws: &Workspace) -> anyhow::Result<()> {
        let cache = ws.open_cache()?;
        let max_age = Duration::from_secs(self.max_age_days * 24 * 60 * 60);

        if !cli.quiet && cli.format == OutputFormat::Text {
            output::info(&format!(
                "Pruning cache entries older than {} days...",
                self.max_age_days
            ));
        }

        let stats = cache.prune(max_age)?;

        if cli.format == OutputFormat::Json {
            let result = serde_json::json!({
                "total": stats.total,
                "removed": stats.removed,
                "kept": stats.kept,
            });
            println!("{}", serde_json::to_string_pretty(&result)?);
        } else if !cli.quiet {
            println!(
                "  {} Removed {} of {} entries ({} kept)",
                style("✓").green(),
                stats.removed,
                stats.total,
                stats.kept
            );
        }

        Ok(())
    }
}

impl CacheCleanCommand {
    fn execute(&self, cli: &Cli, ws: &Workspace) -> anyhow::Result<()> {
        let cache_dir = ws.cache_dir();
        if !cache_dir.exists() {
            if !cli.quiet {
                output::success("Cache directory does not exist.");
            }
            return Ok(());
        }

        if !self.yes {
            let confirmed = dialoguer::Confirm::new()
                .with_prompt(format!(
                    "Remove all cached results at {}?",
                    cache_dir.display()
                ))
                .default(false)
                .interact()?;

            if !confirmed {
                println!("{}", style("Aborted.").yellow());
                return Ok(());
            }
        }

        let removed = ws.open_cache()?.clear()?;

        if !cli.quiet {
            output::success(&format!(
                "Removed {} cached entries at {}",
                removed,
                style(cache_dir.display()).cyan()
            ));
        }

        Ok(())
    }
}

impl CacheFailedCommand {
    fn execute(&self, cli: &Cli, ws: &Workspace) -> anyhow::Result<()> {
        let cache = ws.open_cache()?;
        let run_args = run_args_hash(&self.verb, &self.tool_args, self.filter.as_deref());
        // Oldest first, so the latest entry per project wins
        let mut latest = BTreeMap::new();
        for (key, entry) in cache.run_entries(&run_args)? {
            latest.insert(key.project.clone(), (key, entry));
        }
        let failed: Vec<_> = latest.into_values().filter(|(_, entry)| !entry.success).collect();

        if cli.format == OutputFormat::Json {
            let entries: Vec<_> = failed
                .iter()
                .map(|(key, entry)| {
                    serde_json::json!({
                        "project": key.project,
                        "content_hash": key.content_hash,
                        "last_run": entry.last_run,
                        "command": entry.args_display,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&entries)?);
            return Ok(());
        }
        if cli.quiet {
            for (key, _) in &failed {
                println!("{}", key.project);
            }
            return Ok(());
        }

        if failed.is_empty() {
            output::success("No failed runs recorded");
            return Ok(());
        }
        for (key, entry) in &failed {
            println!(
                "  {} {} {}",
                style("✗").red(),
                output::path_style().apply_to(&key.project),
                style(entry.last_run.format("%Y-%m-%d %H:%M:%S").to_string()).dim()
            );
        }
        Ok(())
    }
}
