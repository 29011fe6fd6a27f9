//! Job Manager: the command interface over jobs.
//!
//! Commands validate against the job's current status through the store's
//! compare-and-set, so a rejected command leaves the job untouched. Running
//! jobs get one tokio task each; a resumed job's task waits for the previous
//! task of the same job before it starts processing.

use std::collections::HashMap;
use std::sync::Arc;

use memberflow_core::config::JobsConfig;
use memberflow_core::{Account, MemberFlowConfig, MemberFlowError, Result};
use memberflow_gateway::ClientRegistry;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::activity::{self, ActivityEntry, ActivityStatus, NewActivity, actions};
use crate::engine::{JobProcessor, Stores};
use crate::jobs::{Job, JobStatus, NewJob};

pub struct JobManager {
    stores: Stores,
    registry: Arc<ClientRegistry>,
    processor: Arc<JobProcessor>,
    limits: JobsConfig,
    workers: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl JobManager {
    pub fn new(stores: Stores, registry: Arc<ClientRegistry>, config: &MemberFlowConfig) -> Self {
        let processor = Arc::new(JobProcessor::new(stores.clone(), registry.clone(), config));
        Self {
            stores,
            registry,
            processor,
            limits: config.jobs.clone(),
            workers: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.registry
    }

    // ─── Accounts ─────────────────────────────────────────────

    pub fn register_account(&self, account: &Account) -> Result<()> {
        self.stores.accounts.save_account(account)?;
        tracing::info!("📱 Account {} registered ({})", account.id, account.label());
        self.log(NewActivity::new(
            &account.id,
            actions::ACCOUNT_CONNECTED,
            format!("Connected {}", account.label()),
            ActivityStatus::Success,
        ));
        Ok(())
    }

    /// Cancel the account's unfinished jobs, drop its client and mark it
    /// inactive. Returns the cancelled job ids.
    pub async fn disconnect_account(&self, account_id: &str) -> Result<Vec<String>> {
        if self.stores.accounts.get_account(account_id)?.is_none() {
            return Err(MemberFlowError::NotFound(format!("account {account_id}")));
        }

        let mut cancelled = Vec::new();
        for job in self.stores.jobs.list_jobs(Some(account_id))? {
            let from = [JobStatus::Pending, JobStatus::Running, JobStatus::Paused];
            if self.stores.jobs.transition(&job.id, &from, JobStatus::Cancelled)? {
                cancelled.push(job.id);
            }
        }

        self.registry.disconnect(account_id).await;
        self.stores.accounts.deactivate_account(account_id)?;

        tracing::info!("🔌 Account {account_id} disconnected, {} jobs cancelled", cancelled.len());
        self.log(NewActivity::new(
            account_id,
            actions::ACCOUNT_DISCONNECTED,
            format!("Disconnected, cancelled {} jobs", cancelled.len()),
            ActivityStatus::Info,
        ));
        Ok(cancelled)
    }

    // ─── Jobs ─────────────────────────────────────────────────

    pub fn create_job(&self, new: NewJob) -> Result<Job> {
        if new.member_list.is_empty() {
            return Err(MemberFlowError::Validation("member list is empty".into()));
        }
        if new.member_list.len() > self.limits.max_members {
            return Err(MemberFlowError::Validation(format!(
                "member list has {} entries, the limit is {}",
                new.member_list.len(),
                self.limits.max_members
            )));
        }
        if new.rate_limit == 0 {
            return Err(MemberFlowError::Validation("rate limit must be at least 1 per minute".into()));
        }
        if new.target_group_id.trim().is_empty() {
            return Err(MemberFlowError::Validation("target group is required".into()));
        }
        if self.stores.accounts.get_account(&new.account_id)?.is_none() {
            return Err(MemberFlowError::NotFound(format!("account {}", new.account_id)));
        }

        let job = Job::new(new);
        self.stores.jobs.insert_job(&job)?;
        tracing::info!(
            "📋 Job {} created: {} members → {} at {}/min",
            job.id,
            job.total(),
            job.target_group_id,
            job.rate_limit
        );
        self.log(
            NewActivity::new(
                &job.account_id,
                actions::JOB_CREATED,
                format!("Created job for {} members targeting {}", job.total(), job.target_group_id),
                ActivityStatus::Info,
            )
            .for_job(&job.id),
        );
        Ok(job)
    }

    pub async fn start_job(&self, id: &str) -> Result<Job> {
        let job = self.command(id, &[JobStatus::Pending], JobStatus::Running, "start")?;
        self.spawn(id).await;
        self.log(
            NewActivity::new(&job.account_id, actions::JOB_STARTED, "Job started", ActivityStatus::Info).for_job(id),
        );
        Ok(job)
    }

    /// Takes effect before the next member is processed.
    pub fn pause_job(&self, id: &str) -> Result<Job> {
        let job = self.command(id, &[JobStatus::Running], JobStatus::Paused, "pause")?;
        tracing::info!("⏸️ Job {id} pause requested at {}/{}", job.checkpoint(), job.total());
        self.log(
            NewActivity::new(&job.account_id, actions::JOB_PAUSED, "Job paused", ActivityStatus::Info).for_job(id),
        );
        Ok(job)
    }

    pub async fn resume_job(&self, id: &str) -> Result<Job> {
        let job = self.command(id, &[JobStatus::Paused], JobStatus::Running, "resume")?;
        self.spawn(id).await;
        tracing::info!("▶️ Job {id} resumed at {}/{}", job.checkpoint(), job.total());
        self.log(
            NewActivity::new(
                &job.account_id,
                actions::JOB_RESUMED,
                format!("Job resumed at {}/{}", job.checkpoint(), job.total()),
                ActivityStatus::Info,
            )
            .for_job(id),
        );
        Ok(job)
    }

    pub fn stop_job(&self, id: &str) -> Result<Job> {
        let job = self.command(
            id,
            &[JobStatus::Running, JobStatus::Paused],
            JobStatus::Cancelled,
            "stop",
        )?;
        tracing::info!("⏹️ Job {id} stopped");
        self.log(
            NewActivity::new(&job.account_id, actions::JOB_STOPPED, "Job stopped", ActivityStatus::Info).for_job(id),
        );
        Ok(job)
    }

    /// Give a job left `running` by an earlier process a worker again.
    pub async fn reattach_job(&self, id: &str) -> Result<Job> {
        let job = self.get_job(id)?;
        if job.status != JobStatus::Running {
            return Err(MemberFlowError::InvalidTransition {
                job_id: id.to_string(),
                from: job.status.to_string(),
                action: "reattach".into(),
            });
        }
        tracing::info!("🔁 Job {id} reattached at {}/{}", job.checkpoint(), job.total());
        self.spawn(id).await;
        Ok(job)
    }

    pub fn get_job(&self, id: &str) -> Result<Job> {
        self.stores
            .jobs
            .get_job(id)?
            .ok_or_else(|| MemberFlowError::NotFound(format!("job {id}")))
    }

    pub fn list_jobs(&self, account_id: Option<&str>) -> Result<Vec<Job>> {
        self.stores.jobs.list_jobs(account_id)
    }

    pub fn recent_activity(&self, account_id: &str, limit: usize) -> Result<Vec<ActivityEntry>> {
        self.stores.activity.recent(account_id, limit)
    }

    /// Wait until no worker of the job is left, then return its snapshot.
    pub async fn wait(&self, id: &str) -> Result<Job> {
        loop {
            let handle = self.workers.lock().await.remove(id);
            let Some(handle) = handle else { break };
            if let Err(e) = handle.await {
                tracing::warn!("⚠️ Worker for job {id} ended abnormally: {e}");
            }
        }
        self.get_job(id)
    }

    /// Apply `from → to` or report the status that blocked it.
    fn command(&self, id: &str, from: &[JobStatus], to: JobStatus, action: &str) -> Result<Job> {
        if self.stores.jobs.transition(id, from, to)? {
            return self.get_job(id);
        }
        let current = self.get_job(id)?;
        Err(MemberFlowError::InvalidTransition {
            job_id: id.to_string(),
            from: current.status.to_string(),
            action: action.to_string(),
        })
    }

    async fn spawn(&self, id: &str) {
        let mut workers = self.workers.lock().await;
        let previous = workers.remove(id);
        let processor = self.processor.clone();
        let job_id = id.to_string();

        let handle = tokio::spawn(async move {
            if let Some(previous) = previous {
                let _ = previous.await;
            }
            match processor.run(&job_id).await {
                Ok(outcome) => tracing::debug!("Worker for job {job_id} finished: {outcome:?}"),
                Err(e) => tracing::error!("💥 Worker for job {job_id} errored: {e}"),
            }
        });
        workers.insert(id.to_string(), handle);
    }

    fn log(&self, entry: NewActivity) {
        activity::record(self.stores.activity.as_ref(), entry);
    }
}
