//! Self check
//!
//! Result of `HistoryService::self_check`. A failed check is a value, not an
//! error, so it can be folded into a larger health report.

use serde::{Deserialize, Serialize};

/// Overall outcome of a check
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Critical,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Ok => write!(f, "ok"),
            HealthStatus::Critical => write!(f, "critical"),
        }
    }
}

/// Status plus the messages that led to it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub messages: Vec<String>,
}

impl HealthReport {
    pub fn new() -> Self {
        Self {
            status: HealthStatus::Ok,
            messages: Vec::new(),
        }
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
    }

    /// Record a failure; the report stays critical from here on
    pub fn critical(&mut self, message: impl Into<String>) {
        self.status = HealthStatus::Critical;
        self.messages.push(message.into());
    }

    pub fn is_ok(&self) -> bool {
        self.status == HealthStatus::Ok
    }
}

impl Default for HealthReport {
    fn default() -> Self {
        Self::new()
    }
}
