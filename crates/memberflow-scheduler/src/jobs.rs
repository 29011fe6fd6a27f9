//! Job definitions: the core data model for member addition work.

use chrono::{DateTime, Utc};
use memberflow_core::{MemberFlowError, Result};
use serde::{Deserialize, Serialize};

/// Job lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Paused => "paused",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "running" => Some(JobStatus::Running),
            "paused" => Some(JobStatus::Paused),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            "cancelled" => Some(JobStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled)
    }

    /// The lifecycle lattice. Terminal states go nowhere.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Cancelled)
                | (Running, Paused)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
                | (Paused, Running)
                | (Paused, Cancelled)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters for creating a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewJob {
    pub account_id: String,
    pub target_group_id: String,
    pub member_list: Vec<String>,
    /// Additions per minute.
    pub rate_limit: u32,
    /// Extra seconds of cool-down after every `rate_limit` items.
    pub batch_delay: u64,
}

/// A member addition job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub account_id: String,
    pub target_group_id: String,
    /// Work queue and checkpoint index space. Fixed at creation.
    pub member_list: Vec<String>,
    pub rate_limit: u32,
    pub batch_delay: u64,
    pub status: JobStatus,
    pub added_count: u32,
    pub failed_count: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(new: NewJob) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            account_id: new.account_id,
            target_group_id: new.target_group_id,
            member_list: new.member_list,
            rate_limit: new.rate_limit,
            batch_delay: new.batch_delay,
            status: JobStatus::Pending,
            added_count: 0,
            failed_count: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn total(&self) -> usize {
        self.member_list.len()
    }

    /// Index of the next unprocessed member.
    pub fn checkpoint(&self) -> usize {
        (self.added_count + self.failed_count) as usize
    }

    pub fn remaining(&self) -> usize {
        self.total().saturating_sub(self.checkpoint())
    }

    pub fn progress_percent(&self) -> u32 {
        if self.member_list.is_empty() {
            return 0;
        }
        ((self.checkpoint() as f64 / self.total() as f64) * 100.0).floor() as u32
    }

    /// Move to `to` if the lattice allows it, stamping start/finish times.
    pub fn apply_transition(&mut self, to: JobStatus, now: DateTime<Utc>) -> bool {
        if !self.status.can_transition_to(to) {
            return false;
        }
        if to == JobStatus::Running && self.started_at.is_none() {
            self.started_at = Some(now);
        }
        if to.is_terminal() {
            self.completed_at = Some(now);
        }
        self.status = to;
        true
    }

    /// Replace the counters, refusing to go backwards or past the list.
    pub fn record_progress(&mut self, added: u32, failed: u32) -> Result<()> {
        if added < self.added_count || failed < self.failed_count {
            return Err(MemberFlowError::Validation(format!(
                "progress for job {} went backwards ({}/{} → {added}/{failed})",
                self.id, self.added_count, self.failed_count
            )));
        }
        if (added + failed) as usize > self.total() {
            return Err(MemberFlowError::Validation(format!(
                "progress for job {} exceeds {} members",
                self.id,
                self.total()
            )));
        }
        self.added_count = added;
        self.failed_count = failed;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(n: usize) -> Job {
        Job::new(NewJob {
            account_id: "a1".into(),
            target_group_id: "-100".into(),
            member_list: (0..n).map(|i| format!("user{i}")).collect(),
            rate_limit: 4,
            batch_delay: 120,
        })
    }

    #[test]
    fn test_new_job_is_pending() {
        let j = job(3);
        assert_eq!(j.status, JobStatus::Pending);
        assert_eq!(j.checkpoint(), 0);
        assert_eq!(j.remaining(), 3);
        assert!(j.started_at.is_none());
    }

    #[test]
    fn test_lattice() {
        use JobStatus::*;
        assert!(Pending.can_transition_to(Running));
        assert!(Running.can_transition_to(Paused));
        assert!(Paused.can_transition_to(Running));
        assert!(Paused.can_transition_to(Cancelled));
        assert!(!Pending.can_transition_to(Paused));
        assert!(!Paused.can_transition_to(Completed));
        for terminal in [Completed, Failed, Cancelled] {
            for next in [Pending, Running, Paused, Completed, Failed, Cancelled] {
                assert!(!terminal.can_transition_to(next), "{terminal} -> {next}");
            }
        }
    }

    #[test]
    fn test_transition_timestamps() {
        let mut j = job(1);
        let t0 = Utc::now();
        assert!(j.apply_transition(JobStatus::Running, t0));
        assert_eq!(j.started_at, Some(t0));

        let t1 = t0 + chrono::Duration::seconds(5);
        assert!(j.apply_transition(JobStatus::Paused, t1));
        assert!(j.apply_transition(JobStatus::Running, t1));
        assert_eq!(j.started_at, Some(t0), "resume keeps the first start time");

        assert!(j.apply_transition(JobStatus::Completed, t1));
        assert_eq!(j.completed_at, Some(t1));
        assert!(!j.apply_transition(JobStatus::Running, t1));
        assert_eq!(j.status, JobStatus::Completed);
    }

    #[test]
    fn test_progress_invariants() {
        let mut j = job(3);
        j.record_progress(1, 1).unwrap();
        assert_eq!(j.checkpoint(), 2);
        assert_eq!(j.progress_percent(), 66);
        assert!(j.record_progress(0, 2).is_err());
        assert!(j.record_progress(2, 2).is_err());
        assert_eq!((j.added_count, j.failed_count), (1, 1));
    }

    #[test]
    fn test_status_round_trip_names() {
        for s in ["pending", "running", "paused", "completed", "failed", "cancelled"] {
            assert_eq!(JobStatus::parse(s).unwrap().as_str(), s);
        }
        assert_eq!(JobStatus::parse("done"), None);
    }
}
