//! Content and argument digests
//!
//! Both digests are SHA-256 truncated to 128 bits (32 hex characters).

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::Path;

use sha2::{Digest, Sha256};
use tracing::{debug, instrument, trace};
use walkdir::WalkDir;

use skipr_core::project::to_repo_path;
use skipr_core::IgnoreRules;

/// Length of a truncated digest in hex characters
pub const DIGEST_HEX_LEN: usize = 32;

fn finish(hasher: Sha256) -> String {
    let mut hex = format!("{:x}", hasher.finalize());
    hex.truncate(DIGEST_HEX_LEN);
    hex
}

/// Digest of an arbitrary string, used for file names
pub fn short_hash(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    finish(hasher)
}

/// Digest of the command verb plus its arguments.
///
/// Advisory flags (restore/build skipping) must not be passed here: they do
/// not change what a run verifies.
pub fn args_hash(verb: &str, args: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verb.as_bytes());
    for arg in args {
        hasher.update([0u8]);
        hasher.update(arg.as_bytes());
    }
    finish(hasher)
}

/// Argument hash identifying a whole run: the verb, the extra arguments and
/// the user's filter, before any per-job test selection. Equal to the job
/// hash of an unnarrowed invocation.
pub fn run_args_hash(verb: &str, extra_args: &[String], user_filter: Option<&str>) -> String {
    let mut args = extra_args.to_vec();
    if let Some(filter) = user_filter.map(str::trim).filter(|f| !f.is_empty()) {
        args.push("--filter".to_string());
        args.push(filter.to_string());
    }
    args_hash(verb, &args)
}

/// Every non-ignored file under the given repo-relative directories, as
/// sorted repo-relative paths
pub fn collect_files(root: &Path, dirs: &[String], rules: &IgnoreRules) -> BTreeSet<String> {
    let mut files = BTreeSet::new();

    for dir in dirs {
        let start = if dir.is_empty() {
            root.to_path_buf()
        } else {
            root.join(dir)
        };
        if !start.is_dir() {
            trace!(dir = %dir, "relevant dir missing, skipping");
            continue;
        }

        let walker = WalkDir::new(&start).into_iter().filter_entry(|entry| {
            let relative = to_repo_path(root, entry.path());
            relative.is_empty() || !rules.is_ignored(&relative, entry.file_type().is_dir())
        });

        for entry in walker.flatten() {
            if entry.file_type().is_file() {
                files.insert(to_repo_path(root, entry.path()));
            }
        }
    }

    files
}

/// Digest of `path || NUL || len(content) || content` for every collected
/// file, in sorted path order. The length is a little-endian `u64`.
#[instrument(skip_all, fields(dirs = dirs.len()))]
pub fn content_hash(root: &Path, dirs: &[String], rules: &IgnoreRules) -> io::Result<String> {
    let files = collect_files(root, dirs, rules);
    let mut hasher = Sha256::new();

    for file in &files {
        let content = fs::read(root.join(file))?;
        hasher.update(file.as_bytes());
        hasher.update([0u8]);
        hasher.update((content.len() as u64).to_le_bytes());
        hasher.update(&content);
    }

    let digest = finish(hasher);
    debug!(files = files.len(), digest = %digest, "content hash computed");
    Ok(digest)
}
