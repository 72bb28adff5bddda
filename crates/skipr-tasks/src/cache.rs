//! Content-addressed result cache
//!
//! Entries live under `<cache_dir>/<args_hash>/<project_hash>-<content_hash>.json`.
//! The store is opened once per run; every read and write goes through one
//! handle that serializes access across workers.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::hashing::{short_hash, DIGEST_HEX_LEN};

/// Compound cache key.
///
/// A hit is valid only for this exact triple; it says nothing about any
/// other project, dependencies included.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    /// Digest of the relevant source files
    pub content_hash: String,
    /// Digest of the verb plus arguments
    pub args_hash: String,
    /// Project or solution path
    pub project: String,
}

impl CacheKey {
    pub fn new(
        content_hash: impl Into<String>,
        args_hash: impl Into<String>,
        project: impl Into<String>,
    ) -> Self {
        Self {
            content_hash: content_hash.into(),
            args_hash: args_hash.into(),
            project: project.into(),
        }
    }

    fn file_name(&self) -> String {
        format!("{}-{}.json", short_hash(&self.project), self.content_hash)
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}|{}|{}", self.content_hash, self.args_hash, self.project)
    }
}

/// A recorded run. Overwritten wholesale on every mark.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub success: bool,
    /// Captured tool output
    pub output: String,
    pub last_run: DateTime<Utc>,
    /// Human-readable command line of the recorded run
    pub args_display: String,
    /// Argument hash of the run as the user started it (verb, extra args,
    /// user filter). Unlike the key's hash it excludes computed test filters
    /// and the build verb of build-only jobs.
    #[serde(default)]
    pub run_args: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    key: CacheKey,
    entry: CacheEntry,
}

/// Persistent cache store
#[derive(Debug)]
pub struct ContentCache {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl ContentCache {
    /// Open (creating if needed) the store. Failure here is fatal for a run.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| CacheError::Unavailable {
            path: dir.clone(),
            source,
        })?;
        // Prove the directory is readable before any job relies on it
        fs::read_dir(&dir).map_err(|source| CacheError::Unavailable {
            path: dir.clone(),
            source,
        })?;

        debug!(path = %dir.display(), "cache opened");
        Ok(Self {
            dir,
            lock: Mutex::new(()),
        })
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        // The guarded data is `()`, so a poisoned lock carries no broken state
        self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(&key.args_hash).join(key.file_name())
    }

    /// Pure read: the entry recorded for exactly this key, if any
    pub fn lookup(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        let _guard = self.guard();
        let path = self.entry_path(key);

        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(key = %key, "cache miss");
                return Ok(None);
            }
            Err(e) => return Err(CacheError::Io(e)),
        };

        match serde_json::from_str::<StoredEntry>(&contents) {
            Ok(stored) if stored.key == *key => {
                debug!(key = %key, success = stored.entry.success, "cache hit");
                Ok(Some(stored.entry))
            }
            Ok(_) => {
                debug!(key = %key, "cache slot holds a different key");
                Ok(None)
            }
            Err(e) => {
                // The next mark for this key rewrites the file
                warn!(path = %path.display(), error = %e, "corrupt cache entry treated as miss");
                Ok(None)
            }
        }
    }

    /// Unconditional upsert
    pub fn mark(&self, key: &CacheKey, entry: CacheEntry) -> Result<(), CacheError> {
        let _guard = self.guard();
        let path = self.entry_path(key);
        let parent = self.dir.join(&key.args_hash);
        fs::create_dir_all(&parent)?;

        let stored = StoredEntry {
            key: key.clone(),
            entry,
        };
        let json = serde_json::to_string_pretty(&stored)?;

        let tmp = parent.join(format!(".{}.tmp", key.file_name()));
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)?;

        debug!(key = %key, success = stored.entry.success, "cache entry written");
        Ok(())
    }

    /// Every entry recorded under an argument hash
    pub fn entries(&self, args_hash: &str) -> Result<Vec<(CacheKey, CacheEntry)>, CacheError> {
        let _guard = self.guard();
        let mut entries = self.read_entries(&self.dir.join(args_hash))?;
        sort_entries(&mut entries);
        Ok(entries)
    }

    /// Entries under an argument hash whose run failed
    pub fn get_failed(&self, args_hash: &str) -> Result<Vec<(CacheKey, CacheEntry)>, CacheError> {
        Ok(self
            .entries(args_hash)?
            .into_iter()
            .filter(|(_, entry)| !entry.success)
            .collect())
    }

    /// Every entry recorded by runs started with `run_args`, whatever
    /// arguments the individual jobs were keyed under
    pub fn run_entries(&self, run_args: &str) -> Result<Vec<(CacheKey, CacheEntry)>, CacheError> {
        let _guard = self.guard();
        let mut entries = Vec::new();
        for dir in self.entry_dirs()? {
            entries.extend(
                self.read_entries(&dir)?
                    .into_iter()
                    .filter(|(_, entry)| entry.run_args == run_args),
            );
        }
        sort_entries(&mut entries);
        Ok(entries)
    }

    fn read_entries(&self, dir: &Path) -> Result<Vec<(CacheKey, CacheEntry)>, CacheError> {
        let mut entries = Vec::new();
        let read = match fs::read_dir(dir) {
            Ok(read) => read,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(entries),
            Err(e) => return Err(CacheError::Io(e)),
        };

        for item in read {
            let path = item?.path();
            if path.extension().map_or(true, |e| e != "json") {
                continue;
            }
            let contents = fs::read_to_string(&path)?;
            match serde_json::from_str::<StoredEntry>(&contents) {
                Ok(stored) => entries.push((stored.key, stored.entry)),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping corrupt cache entry"),
            }
        }
        Ok(entries)
    }

    fn entry_dirs(&self) -> Result<Vec<PathBuf>, CacheError> {
        let mut dirs = Vec::new();
        for item in fs::read_dir(&self.dir)? {
            let path = item?.path();
            let is_args_dir = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.len() == DIGEST_HEX_LEN && n.chars().all(|c| c.is_ascii_hexdigit()));
            if path.is_dir() && is_args_dir {
                dirs.push(path);
            }
        }
        Ok(dirs)
    }

    /// Remove entries whose last run is older than `max_age`
    pub fn prune(&self, max_age: Duration) -> Result<PruneStats, CacheError> {
        info!(max_age_secs = max_age.as_secs(), "pruning cache");
        let _guard = self.guard();
        let mut stats = PruneStats::default();

        let cutoff = Utc::now() - chrono::Duration::from_std(max_age).unwrap_or_default();

        for dir in self.entry_dirs()? {
            for item in fs::read_dir(&dir)? {
                let path = item?.path();
                if !path.is_file() {
                    continue;
                }
                stats.total += 1;

                let expired = fs::read_to_string(&path)
                    .ok()
                    .and_then(|c| serde_json::from_str::<StoredEntry>(&c).ok())
                    .map_or(true, |stored| stored.entry.last_run < cutoff);

                if expired && fs::remove_file(&path).is_ok() {
                    stats.removed += 1;
                } else {
                    stats.kept += 1;
                }
            }

            // Drop argument directories left empty
            if fs::read_dir(&dir).map(|mut d| d.next().is_none()).unwrap_or(false) {
                let _ = fs::remove_dir(&dir);
            }
        }

        info!(total = stats.total, removed = stats.removed, kept = stats.kept, "cache prune complete");
        Ok(stats)
    }

    /// Get cache statistics
    pub fn status(&self) -> Result<CacheStats, CacheError> {
        let _guard = self.guard();
        let mut stats = CacheStats::default();

        for dir in self.entry_dirs()? {
            stats.argument_sets += 1;
            for file in fs::read_dir(&dir)?.flatten() {
                if let Ok(meta) = file.metadata() {
                    if meta.is_file() {
                        stats.entries += 1;
                        stats.total_size += meta.len();
                    }
                }
            }
        }

        Ok(stats)
    }

    /// Remove every entry; returns the number removed
    pub fn clear(&self) -> Result<usize, CacheError> {
        let _guard = self.guard();
        let mut removed = 0;
        for dir in self.entry_dirs()? {
            removed += fs::read_dir(&dir)?.flatten().count();
            fs::remove_dir_all(&dir)?;
        }
        info!(removed, "cache cleared");
        Ok(removed)
    }

    /// Get the cache directory
    pub fn cache_dir(&self) -> &Path {
        &self.dir
    }
}

/// By project, then oldest run first
fn sort_entries(entries: &mut [(CacheKey, CacheEntry)]) {
    entries.sort_by(|a, b| a.0.project.cmp(&b.0.project).then(a.1.last_run.cmp(&b.1.last_run)));
}

/// Statistics from a prune operation
#[derive(Debug, Default)]
pub struct PruneStats {
    /// Total entries found
    pub total: usize,
    /// Entries removed
    pub removed: usize,
    /// Entries kept
    pub kept: usize,
}

/// Cache statistics
#[derive(Debug, Default)]
pub struct CacheStats {
    /// Number of cache entries
    pub entries: usize,
    /// Distinct argument hashes
    pub argument_sets: usize,
    /// Total size in bytes
    pub total_size: u64,
}

impl CacheStats {
    /// Format total size in human-readable form
    pub fn formatted_size(&self) -> String {
        if self.total_size < 1024 {
            format!("{} B", self.total_size)
        } else if self.total_size < 1024 * 1024 {
            format!("{:.1} KB", self.total_size as f64 / 1024.0)
        } else if self.total_size < 1024 * 1024 * 1024 {
            format!("{:.1} MB", self.total_size as f64 / (1024.0 * 1024.0))
        } else {
            format!(
                "{:.1} GB",
                self.total_size as f64 / (1024.0 * 1024.0 * 1024.0)
            )
        }
    }
}

/// Cache errors
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The store could not be opened
    #[error("Cache store unavailable at {path}: {source}")]
    Unavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// IO error
    #[error("Cache IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("Cache serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
