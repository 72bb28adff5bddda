//! Per-run diagnostic session

use std::collections::HashSet;
use std::sync::Mutex;

/// Diagnostics already shown during one run.
///
/// Owned by the top-level invocation and shared with the components that
/// emit one-time notices; a new run starts with a fresh session.
#[derive(Debug, Default)]
pub struct Session {
    shown: Mutex<HashSet<String>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true the first time `key` is seen in this session
    pub fn first_time(&self, key: &str) -> bool {
        match self.shown.lock() {
            Ok(mut shown) => shown.insert(key.to_string()),
            // A poisoned set only costs a repeated notice
            Err(poisoned) => poisoned.into_inner().insert(key.to_string()),
        }
    }
}
