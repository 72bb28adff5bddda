//! CLI commands

mod affected;
mod build;
mod cache;
mod coverage;
mod run;
mod test;

pub use affected::AffectedCommand;
pub use build::BuildCommand;
pub use cache::CacheCommand;
pub use coverage::CoverageCommand;
pub use test::TestCommand;
