//! Affected command - show what a change touches

use clap::Args;
use console::style;

use crate::cli::output;
use crate::cli::workspace::Workspace;
use crate::cli::{Cli, OutputFormat};

/// List projects affected by the current changes
#[derive(Debug, Args)]
pub struct AffectedCommand {
    /// Compare against this reference instead of uncommitted changes
    #[arg(long)]
    pub since: Option<String>,

    /// Also list the changed files
    #[arg(long)]
    pub files: bool,
}

impl AffectedCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        let cwd = std::env::current_dir()?;
        let ws = Workspace::load(&cwd)?;

        let changed = ws.changed_files(self.since.as_deref())?;
        let direct = ws.graph.changed_projects(&changed);
        let affected = ws.graph.affected(&direct);

        if cli.format == OutputFormat::Json {
            let result = serde_json::json!({
                "revision": ws.revision(),
                "since": self.since,
                "changed_files": changed,
                "changed_projects": direct,
                "affected": affected,
            });
            println!("{}", serde_json::to_string_pretty(&result)?);
            return Ok(());
        }
        if cli.quiet {
            for project in &affected {
                println!("{}", project);
            }
            return Ok(());
        }

        println!("{}", output::header("Affected projects"));
        println!();
        println!("{}", output::key_value("Revision", &ws.revision()));
        if let Some(since) = &self.since {
            println!("{}", output::key_value("Since", since));
        }
        println!("{}", output::key_value("Changed files", &changed.len().to_string()));
        println!();

        if self.files {
            for file in &changed {
                println!("  {}", style(file).dim());
            }
            println!();
        }

        if affected.is_empty() {
            output::success("No projects affected");
            return Ok(());
        }
        for project in &affected {
            let marker = if direct.contains(project) { "changed" } else { "dependent" };
            let is_test = ws.graph.get(project).is_some_and(|p| p.is_test);
            println!(
                "  {} {}{}",
                output::path_style().apply_to(project),
                style(format!("({})", marker)).dim(),
                if is_test { style(" [test]").yellow().to_string() } else { String::new() }
            );
        }
        println!();
        output::info(&format!("{} affected", output::plural(affected.len(), "project")));
        Ok(())
    }
}
