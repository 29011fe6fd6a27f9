//! Activity log: append-only account/job event trail.
//! Writes are best-effort: a failed append is logged, never fatal.

use chrono::{DateTime, Utc};
use memberflow_core::Result;
use serde::{Deserialize, Serialize};

pub mod actions {
    pub const ACCOUNT_CONNECTED: &str = "account_connected";
    pub const ACCOUNT_DISCONNECTED: &str = "account_disconnected";
    pub const JOB_CREATED: &str = "job_created";
    pub const JOB_STARTED: &str = "job_started";
    pub const JOB_PAUSED: &str = "job_paused";
    pub const JOB_RESUMED: &str = "job_resumed";
    pub const JOB_STOPPED: &str = "job_stopped";
    pub const JOB_COMPLETED: &str = "job_completed";
    pub const JOB_FAILED: &str = "job_failed";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityStatus {
    Success,
    Error,
    Info,
}

impl ActivityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityStatus::Success => "success",
            ActivityStatus::Error => "error",
            ActivityStatus::Info => "info",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "success" => ActivityStatus::Success,
            "error" => ActivityStatus::Error,
            _ => ActivityStatus::Info,
        }
    }
}

/// An entry to append.
#[derive(Debug, Clone, PartialEq)]
pub struct NewActivity {
    pub account_id: String,
    pub job_id: Option<String>,
    pub action: String,
    pub details: String,
    pub status: ActivityStatus,
}

impl NewActivity {
    pub fn new(account_id: &str, action: &str, details: impl Into<String>, status: ActivityStatus) -> Self {
        Self {
            account_id: account_id.to_string(),
            job_id: None,
            action: action.to_string(),
            details: details.into(),
            status,
        }
    }

    pub fn for_job(mut self, job_id: &str) -> Self {
        self.job_id = Some(job_id.to_string());
        self
    }
}

/// A stored entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub id: i64,
    pub account_id: String,
    pub job_id: Option<String>,
    pub action: String,
    pub details: String,
    pub status: ActivityStatus,
    pub created_at: DateTime<Utc>,
}

pub trait ActivityLog: Send + Sync {
    fn append(&self, entry: NewActivity) -> Result<()>;

    /// Newest first.
    fn recent(&self, account_id: &str, limit: usize) -> Result<Vec<ActivityEntry>>;
}

/// Append, logging instead of failing.
pub fn record(log: &dyn ActivityLog, entry: NewActivity) {
    let action = entry.action.clone();
    if let Err(e) = log.append(entry) {
        tracing::warn!("⚠️ Failed to record activity '{action}': {e}");
    }
}
