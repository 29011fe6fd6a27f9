//! Job store seam and the in-process implementation.
//!
//! Status changes go through [`JobStore::transition`], a compare-and-set on
//! the current status: a pause, a stop and the processor's own final
//! transition can race, and exactly one of them wins.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use memberflow_core::{Account, AccountStore, MemberFlowError, Result};

use crate::activity::{ActivityEntry, ActivityLog, NewActivity};
use crate::jobs::{Job, JobStatus};

/// Retained activity entries in [`MemoryStore`].
const MAX_ACTIVITY: usize = 1000;

pub trait JobStore: Send + Sync {
    fn insert_job(&self, job: &Job) -> Result<()>;
    fn get_job(&self, id: &str) -> Result<Option<Job>>;
    /// Newest first, optionally restricted to one account.
    fn list_jobs(&self, account_id: Option<&str>) -> Result<Vec<Job>>;
    /// Persist the counters. Never moves them backwards.
    fn update_progress(&self, id: &str, added: u32, failed: u32) -> Result<()>;
    /// Move the job to `to` if its current status is one of `from`.
    /// Returns `Ok(false)` when the job was in some other status.
    fn transition(&self, id: &str, from: &[JobStatus], to: JobStatus) -> Result<bool>;
}

/// Everything in memory. Lost on restart.
#[derive(Default)]
pub struct MemoryStore {
    jobs: Mutex<HashMap<String, Job>>,
    accounts: Mutex<HashMap<String, Account>>,
    activity: Mutex<VecDeque<ActivityEntry>>,
    next_activity_id: Mutex<i64>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobStore for MemoryStore {
    fn insert_job(&self, job: &Job) -> Result<()> {
        let mut jobs = lock(&self.jobs);
        if jobs.contains_key(&job.id) {
            return Err(MemberFlowError::Database(format!("job {} already exists", job.id)));
        }
        jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    fn get_job(&self, id: &str) -> Result<Option<Job>> {
        Ok(lock(&self.jobs).get(id).cloned())
    }

    fn list_jobs(&self, account_id: Option<&str>) -> Result<Vec<Job>> {
        let mut jobs: Vec<Job> = lock(&self.jobs)
            .values()
            .filter(|j| account_id.is_none_or(|a| j.account_id == a))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs)
    }

    fn update_progress(&self, id: &str, added: u32, failed: u32) -> Result<()> {
        let mut jobs = lock(&self.jobs);
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| MemberFlowError::NotFound(format!("job {id}")))?;
        job.record_progress(added, failed)
    }

    fn transition(&self, id: &str, from: &[JobStatus], to: JobStatus) -> Result<bool> {
        let mut jobs = lock(&self.jobs);
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| MemberFlowError::NotFound(format!("job {id}")))?;
        if !from.contains(&job.status) {
            return Ok(false);
        }
        Ok(job.apply_transition(to, Utc::now()))
    }
}

impl AccountStore for MemoryStore {
    fn save_account(&self, account: &Account) -> Result<()> {
        lock(&self.accounts).insert(account.id.clone(), account.clone());
        Ok(())
    }

    fn get_account(&self, id: &str) -> Result<Option<Account>> {
        Ok(lock(&self.accounts).get(id).cloned())
    }

    fn deactivate_account(&self, id: &str) -> Result<()> {
        let mut accounts = lock(&self.accounts);
        let account = accounts
            .get_mut(id)
            .ok_or_else(|| MemberFlowError::NotFound(format!("account {id}")))?;
        account.is_active = false;
        account.session.clear();
        Ok(())
    }
}

impl ActivityLog for MemoryStore {
    fn append(&self, entry: NewActivity) -> Result<()> {
        let id = {
            let mut next = lock(&self.next_activity_id);
            *next += 1;
            *next
        };
        let mut log = lock(&self.activity);
        if log.len() >= MAX_ACTIVITY {
            log.pop_front();
        }
        log.push_back(ActivityEntry {
            id,
            account_id: entry.account_id,
            job_id: entry.job_id,
            action: entry.action,
            details: entry.details,
            status: entry.status,
            created_at: Utc::now(),
        });
        Ok(())
    }

    fn recent(&self, account_id: &str, limit: usize) -> Result<Vec<ActivityEntry>> {
        Ok(lock(&self.activity)
            .iter()
            .rev()
            .filter(|e| e.account_id == account_id)
            .take(limit)
            .cloned()
            .collect())
    }
}
