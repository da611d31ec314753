//! Core data types of the scan history
//!
//! - `ScanResult`: what a completed scan hands to the history
//! - `HistoryEntry`: one resolved entry, read back from the store
//! - `PurgeReport`: what a retention pass removed

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Attribute names of an entry node. Part of the persisted layout.
pub const ATTR_TIME: &str = "time";
pub const ATTR_CLEAN: &str = "clean";
pub const ATTR_OUTPUT: &str = "output";
pub const ATTR_PATH: &str = "path";
pub const ATTR_USER_ID: &str = "userId";

/// Result of a single file scan
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScanResult {
    /// File is clean
    pub clean: bool,
    /// Scanner output
    pub output: String,
    /// Path of the scanned resource
    #[serde(default)]
    pub path: Option<String>,
    /// User that triggered the scan
    #[serde(default)]
    pub user_id: Option<String>,
}

impl ScanResult {
    pub fn new(output: impl Into<String>, clean: bool) -> Self {
        Self {
            clean,
            output: output.into(),
            path: None,
            user_id: None,
        }
    }

    /// Builder method: set scanned path
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Builder method: set user id
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

impl std::fmt::Display for ScanResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Clean: {}\nOutput: {}", self.clean, self.output)
    }
}

/// A history entry as read from the store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryEntry {
    /// When the scan result was recorded
    pub time: DateTime<Utc>,
    /// Scanner output
    pub output: String,
    /// File was clean
    pub clean: bool,
    /// Path of the scanned resource
    pub path: String,
    /// Store path of the entry node
    pub node_path: String,
    /// User that triggered the scan
    pub user_id: String,
}

/// Outcome of a retention pass
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PurgeReport {
    /// Buckets strictly before this date were eligible
    pub cutoff: Option<NaiveDate>,
    /// Bucket subtrees that were deleted, in deletion order
    pub deleted: Vec<String>,
    /// Non-numeric nodes that were left alone
    pub skipped_foreign: usize,
}

impl std::fmt::Display for PurgeReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.cutoff {
            Some(cutoff) => write!(
                f,
                "Cutoff: {}, Deleted buckets: {}, Skipped foreign nodes: {}",
                cutoff,
                self.deleted.len(),
                self.skipped_foreign
            ),
            None => write!(f, "No history to purge"),
        }
    }
}
