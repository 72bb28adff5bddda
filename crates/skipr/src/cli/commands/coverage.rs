//! Coverage command - manage per-test coverage maps

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Subcommand};
use console::style;

use skipr_core::normalize_path;
use skipr_tasks::{CoverageMap, CoverageStore, TestCoverage};

use crate::cli::workspace::Workspace;
use crate::cli::{output, Cli, OutputFormat};

/// Coverage map management
#[derive(Debug, Args)]
pub struct CoverageCommand {
    #[command(subcommand)]
    pub action: CoverageAction,
}

/// Coverage subcommands
#[derive(Debug, Subcommand)]
pub enum CoverageAction {
    /// Import per-test coverage reports for a test project
    Import(CoverageImportCommand),
    /// Show the stored map for a test project
    Show(CoverageShowCommand),
}

/// Import per-test coverage reports
#[derive(Debug, Args)]
pub struct CoverageImportCommand {
    /// Test project path, relative to the repository root
    pub project: String,

    /// JSON array of `{ "test", "hit_files", "all_files" }` records
    pub report: PathBuf,
}

/// Show a stored coverage map
#[derive(Debug, Args)]
pub struct CoverageShowCommand {
    /// Test project path, relative to the repository root
    pub project: String,
}

impl CoverageCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        let cwd = std::env::current_dir()?;
        let ws = Workspace::load(&cwd)?;
        let store = CoverageStore::new(&ws.cache_dir());
        match &self.action {
            CoverageAction::Import(cmd) => cmd.execute(cli, &ws, &store),
            CoverageAction::Show(cmd) => cmd.execute(cli, &ws, &store),
        }
    }
}

/// Resolve a user-supplied path to a known test project
fn test_project(ws: &Workspace, project: &str) -> anyhow::Result<String> {
    let path = normalize_path(project);
    match ws.graph.get(&path) {
        Some(p) if p.is_test => Ok(path),
        Some(_) => anyhow::bail!("{} is not a test project", path),
        None => anyhow::bail!("Unknown project: {}", path),
    }
}

fn parse_reports(contents: &str) -> serde_json::Result<Vec<TestCoverage>> {
    serde_json::from_str(contents)
}

impl CoverageImportCommand {
    fn execute(&self, cli: &Cli, ws: &Workspace, store: &CoverageStore) -> anyhow::Result<()> {
        let project = test_project(ws, &self.project)?;
        let contents = std::fs::read_to_string(&self.report)
            .with_context(|| format!("Failed to read {}", self.report.display()))?;
        let reports = parse_reports(&contents)
            .with_context(|| format!("Invalid coverage report {}", self.report.display()))?;

        let map = CoverageMap::from_reports(&project, reports.into_iter().map(|t| (t.test, t.report)));
        let path = store.save(&map)?;

        if cli.format == OutputFormat::Json {
            let result = serde_json::json!({
                "project": project,
                "tests": map.test_count(),
                "files": map.file_count(),
                "path": path.display().to_string(),
            });
            println!("{}", serde_json::to_string_pretty(&result)?);
        } else if !cli.quiet {
            output::success(&format!(
                "Imported coverage for {}: {}, {}",
                output::path_style().apply_to(&project),
                output::plural(map.test_count(), "test"),
                output::plural(map.file_count(), "file")
            ));
        }
        Ok(())
    }
}

impl CoverageShowCommand {
    fn execute(&self, cli: &Cli, ws: &Workspace, store: &CoverageStore) -> anyhow::Result<()> {
        let project = test_project(ws, &self.project)?;
        let Some(map) = store.load(&project) else {
            output::warning(&format!("No coverage map for {}", project));
            return Ok(());
        };

        if cli.format == OutputFormat::Json {
            println!("{}", serde_json::to_string_pretty(&map)?);
            return Ok(());
        }
        println!("{}", output::header(&format!("Coverage for {}", project)));
        println!("{}", output::key_value("Tests", &map.test_count().to_string()));
        println!("{}", output::key_value("Files", &map.file_count().to_string()));
        if cli.verbose {
            println!();
            for (file, tests) in map.files() {
                println!("  {} {}", style(file).cyan(), style(format!("({} tests)", tests.len())).dim());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reports() {
        let json = r#"[
            {"test": "Core.Tests.CalculatorTests.Adds", "hit_files": ["src/Core/Calculator.cs"],
             "all_files": ["src/Core/Calculator.cs", "src/Core/Parser.cs"]}
        ]"#;
        let reports = parse_reports(json).unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].test, "Core.Tests.CalculatorTests.Adds");
        assert_eq!(reports[0].report.all_files.len(), 2);
    }

    #[test]
    fn test_parse_reports_rejects_object() {
        assert!(parse_reports(r#"{"test": "x"}"#).is_err());
    }
}
