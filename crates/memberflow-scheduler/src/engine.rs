//! Job Processor: the per-item loop behind every running job.
//!
//! One run walks the member list from the stored checkpoint: resolve the
//! identifier, invite the entity, persist the counters, pace. The job status
//! is re-read at the top of every item so pause and stop requests take effect
//! between items, never in the middle of one. The whole run is bounded by a
//! wall-clock ceiling.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use memberflow_core::config::EngineConfig;
use memberflow_core::{Account, AccountStore, MemberFlowConfig, MemberFlowError, Result};
use memberflow_gateway::{ClientRegistry, Entity, EntityResolver, InvitationExecutor, Outcome};

use crate::activity::{self, ActivityLog, ActivityStatus, NewActivity, actions};
use crate::jobs::{Job, JobStatus};
use crate::store::JobStore;

/// The stores the engine reads and writes.
#[derive(Clone)]
pub struct Stores {
    pub jobs: Arc<dyn JobStore>,
    pub accounts: Arc<dyn AccountStore>,
    pub activity: Arc<dyn ActivityLog>,
}

impl Stores {
    /// All three concerns served by one backing store.
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: JobStore + AccountStore + ActivityLog + 'static,
    {
        Self {
            jobs: store.clone(),
            accounts: store.clone(),
            activity: store,
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed { added: u32, failed: u32 },
    Failed(String),
    Paused,
    Cancelled,
}

impl RunOutcome {
    /// The outcome a job in a settled status stands for. `None` while it
    /// still has work to do.
    fn settled(job: &Job) -> Option<Self> {
        match job.status {
            JobStatus::Pending | JobStatus::Running => None,
            JobStatus::Paused => Some(RunOutcome::Paused),
            JobStatus::Cancelled => Some(RunOutcome::Cancelled),
            JobStatus::Completed => Some(RunOutcome::Completed {
                added: job.added_count,
                failed: job.failed_count,
            }),
            JobStatus::Failed => Some(RunOutcome::Failed("job already failed".into())),
        }
    }
}

/// Job-level failure reason. Ends the run as `failed`.
type Abort = String;

/// What happened to one member.
enum Item {
    Added,
    Failed,
    /// A pause, stop or disconnect landed during a backoff. The item is not counted.
    Interrupted(RunOutcome),
}

pub struct JobProcessor {
    stores: Stores,
    registry: Arc<ClientRegistry>,
    resolver: EntityResolver,
    executor: InvitationExecutor,
    engine: EngineConfig,
    /// One run of a job at a time.
    run_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl JobProcessor {
    pub fn new(stores: Stores, registry: Arc<ClientRegistry>, config: &MemberFlowConfig) -> Self {
        Self {
            stores,
            registry,
            resolver: EntityResolver::new(config.resolver.clone()),
            executor: InvitationExecutor::new(),
            engine: config.engine.clone(),
            run_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Process a `running` job until it completes, fails, or a pause or stop
    /// is observed. A job that is already settled reports its state.
    pub async fn run(&self, job_id: &str) -> Result<RunOutcome> {
        let lock = {
            let mut locks = self.run_locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.entry(job_id.to_string()).or_default().clone()
        };

        let outcome = {
            let _running = lock.lock().await;
            self.run_exclusive(job_id).await
        };

        let mut locks = self.run_locks.lock().unwrap_or_else(|e| e.into_inner());
        if Arc::strong_count(&lock) == 2 {
            locks.remove(job_id);
        }
        outcome
    }

    async fn run_exclusive(&self, job_id: &str) -> Result<RunOutcome> {
        let job = self
            .stores
            .jobs
            .get_job(job_id)?
            .ok_or_else(|| MemberFlowError::NotFound(format!("job {job_id}")))?;

        if job.status == JobStatus::Pending {
            return Err(MemberFlowError::InvalidTransition {
                job_id: job.id,
                from: JobStatus::Pending.to_string(),
                action: "run".into(),
            });
        }
        if let Some(outcome) = RunOutcome::settled(&job) {
            return Ok(outcome);
        }

        let ceiling = Duration::from_secs(self.engine.job_timeout_secs);
        let outcome = match tokio::time::timeout(ceiling, self.drive(&job)).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(reason)) => self.fail(&job, reason),
            Err(_) => self.fail(&job, format!("timed out after {}s", ceiling.as_secs())),
        };
        Ok(outcome)
    }

    async fn drive(&self, job: &Job) -> std::result::Result<RunOutcome, Abort> {
        let account = self
            .stores
            .accounts
            .get_account(&job.account_id)
            .map_err(|e| format!("account lookup failed: {e}"))?
            .filter(|a| a.is_active)
            .ok_or_else(|| format!("account {} is not connected", job.account_id))?;

        let group = {
            let client = self
                .registry
                .acquire(&account)
                .await
                .map_err(|e| format!("client unavailable: {e}"))?;
            client
                .resolve_group(&job.target_group_id)
                .await
                .map_err(|e| format!("target group {} unavailable: {e}", job.target_group_id))?
        };

        let total = job.total();
        let rate = job.rate_limit.max(1) as usize;
        let pace = Duration::from_secs_f64(60.0 / rate as f64);
        let mut added = job.added_count;
        let mut failed = job.failed_count;
        let mut index = job.checkpoint();

        tracing::info!(
            "▶️ Job {} running on {}: {index}/{total} done, target {}",
            job.id,
            account.label(),
            job.target_group_id
        );

        while index < total {
            let current = self
                .stores
                .jobs
                .get_job(&job.id)
                .map_err(|e| format!("status check failed: {e}"))?;
            match current {
                None => return Ok(RunOutcome::Cancelled),
                Some(current) => {
                    if let Some(outcome) = RunOutcome::settled(&current) {
                        tracing::info!("⏸️ Job {} {} at {index}/{total}", job.id, current.status);
                        return Ok(outcome);
                    }
                }
            }

            match self.process_item(job, &account, &group, &job.member_list[index]).await? {
                Item::Added => added += 1,
                Item::Failed => failed += 1,
                Item::Interrupted(outcome) => {
                    tracing::info!("⏸️ Job {} interrupted during backoff at {index}/{total}", job.id);
                    return Ok(outcome);
                }
            }

            if let Err(e) = self.stores.jobs.update_progress(&job.id, added, failed) {
                tracing::warn!("⚠️ Failed to save progress for job {}: {e}", job.id);
            }

            index += 1;
            if index < total {
                tokio::time::sleep(pace).await;
                if job.batch_delay > 0 && index % rate == 0 {
                    tracing::info!("💤 Job {}: batch of {rate} done, cooling down {}s", job.id, job.batch_delay);
                    tokio::time::sleep(Duration::from_secs(job.batch_delay)).await;
                }
            }
        }

        Ok(self.finish(job, added, failed))
    }

    async fn process_item(
        &self,
        job: &Job,
        account: &Account,
        group: &Entity,
        member: &str,
    ) -> std::result::Result<Item, Abort> {
        let (entity, wait) = {
            let client = self
                .registry
                .acquire(account)
                .await
                .map_err(|e| format!("client unavailable: {e}"))?;

            let Some(entity) = self.resolver.resolve(&*client, member).await else {
                return Ok(Item::Failed);
            };

            match self.executor.invite(&*client, group, &entity).await {
                Outcome::Added => {
                    tracing::debug!("➕ Added {member}");
                    return Ok(Item::Added);
                }
                Outcome::Failed(reason) => {
                    tracing::debug!("❌ {member} not added: {reason}");
                    return Ok(Item::Failed);
                }
                Outcome::RateLimited(wait) => (entity, wait),
            }
        };

        if wait > self.engine.max_flood_wait_secs {
            return Err(format!(
                "rate limited for {wait}s, above the {}s ceiling",
                self.engine.max_flood_wait_secs
            ));
        }

        let backoff = wait + self.engine.flood_margin_secs;
        tracing::warn!("⏳ Rate limited on {member}, retrying in {backoff}s");
        tokio::time::sleep(Duration::from_secs(backoff)).await;

        // The job or its account may have changed while we slept.
        match self.stores.jobs.get_job(&job.id) {
            Ok(None) => return Ok(Item::Interrupted(RunOutcome::Cancelled)),
            Ok(Some(current)) => {
                if let Some(outcome) = RunOutcome::settled(&current) {
                    return Ok(Item::Interrupted(outcome));
                }
            }
            Err(e) => return Err(format!("status check failed: {e}")),
        }
        let account = self
            .stores
            .accounts
            .get_account(&account.id)
            .map_err(|e| format!("account lookup failed: {e}"))?
            .filter(|a| a.is_active)
            .ok_or_else(|| format!("account {} is not connected", account.id))?;

        let client = self
            .registry
            .acquire(&account)
            .await
            .map_err(|e| format!("client unavailable: {e}"))?;
        match self.executor.invite(&*client, group, &entity).await {
            Outcome::Added => Ok(Item::Added),
            other => {
                tracing::debug!("❌ {member} not added after backoff: {other:?}");
                Ok(Item::Failed)
            }
        }
    }

    fn finish(&self, job: &Job, added: u32, failed: u32) -> RunOutcome {
        if added == 0 {
            return self.fail(job, format!("no members could be added ({failed} failed)"));
        }
        match self.stores.jobs.transition(&job.id, &[JobStatus::Running], JobStatus::Completed) {
            Ok(true) => {
                tracing::info!("✅ Job {} completed: {added} added, {failed} failed", job.id);
                activity::record(
                    self.stores.activity.as_ref(),
                    NewActivity::new(
                        &job.account_id,
                        actions::JOB_COMPLETED,
                        format!("Added {added} members, {failed} failed"),
                        ActivityStatus::Success,
                    )
                    .for_job(&job.id),
                );
                RunOutcome::Completed { added, failed }
            }
            Ok(false) => self.observed(&job.id),
            Err(e) => {
                tracing::warn!("⚠️ Failed to mark job {} completed: {e}", job.id);
                RunOutcome::Completed { added, failed }
            }
        }
    }

    fn fail(&self, job: &Job, reason: Abort) -> RunOutcome {
        match self.stores.jobs.transition(&job.id, &[JobStatus::Running], JobStatus::Failed) {
            Ok(true) => {
                tracing::error!("💥 Job {} failed: {reason}", job.id);
                activity::record(
                    self.stores.activity.as_ref(),
                    NewActivity::new(&job.account_id, actions::JOB_FAILED, reason.clone(), ActivityStatus::Error)
                        .for_job(&job.id),
                );
                RunOutcome::Failed(reason)
            }
            Ok(false) => self.observed(&job.id),
            Err(e) => {
                tracing::warn!("⚠️ Failed to mark job {} failed: {e}", job.id);
                RunOutcome::Failed(reason)
            }
        }
    }

    /// A pause or stop won the race against the final transition.
    fn observed(&self, job_id: &str) -> RunOutcome {
        match self.stores.jobs.get_job(job_id) {
            Ok(Some(job)) => RunOutcome::settled(&job).unwrap_or(RunOutcome::Paused),
            Ok(None) => RunOutcome::Cancelled,
            Err(e) => RunOutcome::Failed(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::NewJob;
    use crate::store::MemoryStore;
    use memberflow_gateway::testing::{ScriptedClient, ScriptedConnector};
    use memberflow_gateway::{ProviderError, UnrecoverableKind};
    use tokio::time::Instant;

    struct Harness {
        store: Arc<MemoryStore>,
        client: Arc<ScriptedClient>,
        processor: JobProcessor,
    }

    fn harness_with(config: MemberFlowConfig, connector: Option<Arc<ScriptedConnector>>) -> Harness {
        let store = Arc::new(MemoryStore::new());
        store.save_account(&Account::new("acc", "+15550100", "session")).unwrap();
        let client = Arc::new(ScriptedClient::new());
        let connector = connector.unwrap_or_else(|| Arc::new(ScriptedConnector::new(client.clone())));
        let registry = Arc::new(ClientRegistry::new(connector));
        let processor = JobProcessor::new(Stores::shared(store.clone()), registry, &config);
        Harness { store, client, processor }
    }

    fn harness() -> Harness {
        harness_with(MemberFlowConfig::default(), None)
    }

    /// Members `user0..`, resolvable by handle to ids `1000..`.
    fn members(client: &ScriptedClient, n: usize) -> Vec<String> {
        (0..n)
            .map(|i| {
                let handle = format!("user{i}");
                client.add_username(Entity::user(1000 + i as i64).with_username(&handle));
                handle
            })
            .collect()
    }

    fn running_job(store: &MemoryStore, member_list: Vec<String>, rate_limit: u32, batch_delay: u64) -> Job {
        let job = Job::new(NewJob {
            account_id: "acc".into(),
            target_group_id: "-1001".into(),
            member_list,
            rate_limit,
            batch_delay,
        });
        store.insert_job(&job).unwrap();
        assert!(store.transition(&job.id, &[JobStatus::Pending], JobStatus::Running).unwrap());
        job
    }

    #[tokio::test(start_paused = true)]
    async fn test_mixed_outcomes_complete() {
        let h = harness();
        let list = members(&h.client, 10);
        for id in 1007..1010 {
            h.client
                .fail_invites(id, ProviderError::Unrecoverable(UnrecoverableKind::PrivacyRestricted));
        }
        let job = running_job(&h.store, list, 60, 0);

        let outcome = h.processor.run(&job.id).await.unwrap();
        assert_eq!(outcome, RunOutcome::Completed { added: 7, failed: 3 });

        let stored = h.store.get_job(&job.id).unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
        assert_eq!((stored.added_count, stored.failed_count), (7, 3));
        assert!(stored.completed_at.is_some());
        assert_eq!(h.client.invited(), (1000..1007).collect::<Vec<_>>());
    }

    /// Flips the job to paused once the checkpoint reaches `pause_at`.
    struct PausingStore {
        inner: Arc<MemoryStore>,
        pause_at: usize,
    }

    impl JobStore for PausingStore {
        fn insert_job(&self, job: &Job) -> Result<()> {
            self.inner.insert_job(job)
        }
        fn get_job(&self, id: &str) -> Result<Option<Job>> {
            self.inner.get_job(id)
        }
        fn list_jobs(&self, account_id: Option<&str>) -> Result<Vec<Job>> {
            self.inner.list_jobs(account_id)
        }
        fn update_progress(&self, id: &str, added: u32, failed: u32) -> Result<()> {
            self.inner.update_progress(id, added, failed)?;
            if (added + failed) as usize == self.pause_at {
                self.inner.transition(id, &[JobStatus::Running], JobStatus::Paused)?;
            }
            Ok(())
        }
        fn transition(&self, id: &str, from: &[JobStatus], to: JobStatus) -> Result<bool> {
            self.inner.transition(id, from, to)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_then_resume_processes_each_member_once() {
        let store = Arc::new(MemoryStore::new());
        store.save_account(&Account::new("acc", "+15550100", "session")).unwrap();
        let client = Arc::new(ScriptedClient::new());
        let registry = Arc::new(ClientRegistry::new(Arc::new(ScriptedConnector::new(client.clone()))));
        let stores = Stores {
            jobs: Arc::new(PausingStore { inner: store.clone(), pause_at: 3 }),
            accounts: store.clone(),
            activity: store.clone(),
        };
        let processor = JobProcessor::new(stores, registry, &MemberFlowConfig::default());

        let job = running_job(&store, members(&client, 5), 60, 0);
        assert_eq!(processor.run(&job.id).await.unwrap(), RunOutcome::Paused);

        let paused = store.get_job(&job.id).unwrap().unwrap();
        assert_eq!(paused.status, JobStatus::Paused);
        assert_eq!(paused.checkpoint(), 3);
        assert_eq!(client.invited(), vec![1000, 1001, 1002]);

        assert!(store.transition(&job.id, &[JobStatus::Paused], JobStatus::Running).unwrap());
        let outcome = processor.run(&job.id).await.unwrap();
        assert_eq!(outcome, RunOutcome::Completed { added: 5, failed: 0 });
        assert_eq!(client.invited(), vec![1000, 1001, 1002, 1003, 1004]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_on_last_item_completes_on_resume() {
        let store = Arc::new(MemoryStore::new());
        store.save_account(&Account::new("acc", "+15550100", "session")).unwrap();
        let client = Arc::new(ScriptedClient::new());
        let registry = Arc::new(ClientRegistry::new(Arc::new(ScriptedConnector::new(client.clone()))));
        let stores = Stores {
            jobs: Arc::new(PausingStore { inner: store.clone(), pause_at: 3 }),
            accounts: store.clone(),
            activity: store.clone(),
        };
        let processor = JobProcessor::new(stores, registry, &MemberFlowConfig::default());

        let job = running_job(&store, members(&client, 3), 60, 0);
        assert_eq!(processor.run(&job.id).await.unwrap(), RunOutcome::Paused);

        let paused = store.get_job(&job.id).unwrap().unwrap();
        assert_eq!(paused.status, JobStatus::Paused);
        assert_eq!(paused.checkpoint(), 3);
        assert!(paused.completed_at.is_none());

        assert!(store.transition(&job.id, &[JobStatus::Paused], JobStatus::Running).unwrap());
        let outcome = processor.run(&job.id).await.unwrap();
        assert_eq!(outcome, RunOutcome::Completed { added: 3, failed: 0 });
        assert_eq!(store.get_job(&job.id).unwrap().unwrap().status, JobStatus::Completed);
        assert_eq!(client.invited(), vec![1000, 1001, 1002]);
    }

    /// Every progress write fails.
    struct BrokenProgressStore {
        inner: Arc<MemoryStore>,
    }

    impl JobStore for BrokenProgressStore {
        fn insert_job(&self, job: &Job) -> Result<()> {
            self.inner.insert_job(job)
        }
        fn get_job(&self, id: &str) -> Result<Option<Job>> {
            self.inner.get_job(id)
        }
        fn list_jobs(&self, account_id: Option<&str>) -> Result<Vec<Job>> {
            self.inner.list_jobs(account_id)
        }
        fn update_progress(&self, _id: &str, _added: u32, _failed: u32) -> Result<()> {
            Err(MemberFlowError::Database("Update progress: disk I/O error".into()))
        }
        fn transition(&self, id: &str, from: &[JobStatus], to: JobStatus) -> Result<bool> {
            self.inner.transition(id, from, to)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_write_failure_does_not_stop_job() {
        let store = Arc::new(MemoryStore::new());
        store.save_account(&Account::new("acc", "+15550100", "session")).unwrap();
        let client = Arc::new(ScriptedClient::new());
        let registry = Arc::new(ClientRegistry::new(Arc::new(ScriptedConnector::new(client.clone()))));
        let stores = Stores {
            jobs: Arc::new(BrokenProgressStore { inner: store.clone() }),
            accounts: store.clone(),
            activity: store.clone(),
        };
        let processor = JobProcessor::new(stores, registry, &MemberFlowConfig::default());

        let job = running_job(&store, members(&client, 3), 60, 0);
        let outcome = processor.run(&job.id).await.unwrap();
        assert_eq!(outcome, RunOutcome::Completed { added: 3, failed: 0 });
        assert_eq!(client.invited(), vec![1000, 1001, 1002]);
        assert_eq!(store.get_job(&job.id).unwrap().unwrap().status, JobStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_unresolvable_fails_job() {
        let h = harness();
        let list: Vec<String> = (0..5).map(|i| format!("@ghost{i}")).collect();
        let job = running_job(&h.store, list, 60, 0);

        let outcome = h.processor.run(&job.id).await.unwrap();
        assert!(matches!(outcome, RunOutcome::Failed(_)));

        let stored = h.store.get_job(&job.id).unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!((stored.added_count, stored.failed_count), (0, 5));
        assert!(h.client.invite_attempts().is_empty());

        let log = h.store.recent("acc", 5).unwrap();
        assert_eq!(log[0].action, actions::JOB_FAILED);
        assert_eq!(log[0].status, ActivityStatus::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_above_ceiling_aborts_without_waiting() {
        let h = harness();
        h.client.fail_all_invites(ProviderError::FloodWait { seconds: 1000 });
        let job = running_job(&h.store, members(&h.client, 3), 60, 0);

        let started = Instant::now();
        let outcome = h.processor.run(&job.id).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(1000));

        match outcome {
            RunOutcome::Failed(reason) => assert!(reason.contains("1000"), "{reason}"),
            other => panic!("expected failure, got {other:?}"),
        }
        let stored = h.store.get_job(&job.id).unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(stored.checkpoint(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_within_ceiling_retries_once() {
        let h = harness();
        let list = members(&h.client, 2);
        h.client.fail_invite_once(1000, ProviderError::FloodWait { seconds: 30 });
        let job = running_job(&h.store, list, 60, 0);

        let started = Instant::now();
        let outcome = h.processor.run(&job.id).await.unwrap();
        assert_eq!(outcome, RunOutcome::Completed { added: 2, failed: 0 });
        assert!(started.elapsed() >= Duration::from_secs(35));
        assert_eq!(h.client.invited(), vec![1000, 1001]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_rate_limit_counts_item_failed() {
        let h = harness();
        let list = members(&h.client, 2);
        h.client.fail_invite_once(1000, ProviderError::FloodWait { seconds: 10 });
        h.client.fail_invite_once(1000, ProviderError::FloodWait { seconds: 10 });
        let job = running_job(&h.store, list, 60, 0);

        let outcome = h.processor.run(&job.id).await.unwrap();
        assert_eq!(outcome, RunOutcome::Completed { added: 1, failed: 1 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_wall_clock_ceiling_fails_job() {
        let mut config = MemberFlowConfig::default();
        config.engine.job_timeout_secs = 150;
        let h = harness_with(config, None);
        // One item a minute: the ceiling hits after the third item.
        let job = running_job(&h.store, members(&h.client, 10), 1, 0);

        let outcome = h.processor.run(&job.id).await.unwrap();
        match outcome {
            RunOutcome::Failed(reason) => assert!(reason.contains("timed out"), "{reason}"),
            other => panic!("expected timeout, got {other:?}"),
        }
        let stored = h.store.get_job(&job.id).unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(stored.checkpoint(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wall_clock_ceiling_restarts_on_resume() {
        let mut config = MemberFlowConfig::default();
        config.engine.job_timeout_secs = 150;
        let store = Arc::new(MemoryStore::new());
        store.save_account(&Account::new("acc", "+15550100", "session")).unwrap();
        let client = Arc::new(ScriptedClient::new());
        let registry = Arc::new(ClientRegistry::new(Arc::new(ScriptedConnector::new(client.clone()))));
        let stores = Stores {
            jobs: Arc::new(PausingStore { inner: store.clone(), pause_at: 2 }),
            accounts: store.clone(),
            activity: store.clone(),
        };
        let processor = JobProcessor::new(stores, registry, &config);

        // One item a minute. The first run sees the pause 120s into its 150s budget.
        let job = running_job(&store, members(&client, 4), 1, 0);
        assert_eq!(processor.run(&job.id).await.unwrap(), RunOutcome::Paused);

        // The last two items take another 60s, more than the 30s left over.
        assert!(store.transition(&job.id, &[JobStatus::Paused], JobStatus::Running).unwrap());
        let outcome = processor.run(&job.id).await.unwrap();
        assert_eq!(outcome, RunOutcome::Completed { added: 4, failed: 0 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_pacing_and_batch_delay() {
        let h = harness();
        // rate 2 → 30s between items, plus 100s after every second item.
        let job = running_job(&h.store, members(&h.client, 5), 2, 100);

        let started = Instant::now();
        h.processor.run(&job.id).await.unwrap();
        let elapsed = started.elapsed();
        // 4 gaps of 30s and batch delays after items 2 and 4.
        assert!(elapsed >= Duration::from_secs(4 * 30 + 2 * 100), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(4 * 30 + 3 * 100), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_setup_failures() {
        let h = harness_with(MemberFlowConfig::default(), Some(Arc::new(ScriptedConnector::failing())));
        let job = running_job(&h.store, vec!["@someone".into()], 60, 0);
        let outcome = h.processor.run(&job.id).await.unwrap();
        assert!(matches!(outcome, RunOutcome::Failed(ref r) if r.contains("client unavailable")));

        let h = harness();
        h.client.fail_group(ProviderError::Transient("400: CHANNEL_INVALID".into()));
        let job = running_job(&h.store, vec!["@someone".into()], 60, 0);
        let outcome = h.processor.run(&job.id).await.unwrap();
        assert!(matches!(outcome, RunOutcome::Failed(ref r) if r.contains("target group")));

        let h = harness();
        h.store.deactivate_account("acc").unwrap();
        let job = running_job(&h.store, vec!["@someone".into()], 60, 0);
        let outcome = h.processor.run(&job.id).await.unwrap();
        assert!(matches!(outcome, RunOutcome::Failed(ref r) if r.contains("not connected")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_settled_and_pending_jobs() {
        let h = harness();
        let job = Job::new(NewJob {
            account_id: "acc".into(),
            target_group_id: "-1001".into(),
            member_list: vec!["@a".into()],
            rate_limit: 4,
            batch_delay: 0,
        });
        h.store.insert_job(&job).unwrap();
        assert!(matches!(
            h.processor.run(&job.id).await,
            Err(MemberFlowError::InvalidTransition { .. })
        ));

        h.store.transition(&job.id, &[JobStatus::Pending], JobStatus::Cancelled).unwrap();
        assert_eq!(h.processor.run(&job.id).await.unwrap(), RunOutcome::Cancelled);
        assert!(h.client.calls().is_empty());

        assert!(matches!(h.processor.run("missing").await, Err(MemberFlowError::NotFound(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_runs_do_not_double_process() {
        let h = harness();
        let job = running_job(&h.store, members(&h.client, 4), 60, 0);

        let (a, b) = futures::join!(h.processor.run(&job.id), h.processor.run(&job.id));
        assert!(matches!(a.unwrap(), RunOutcome::Completed { .. }));
        assert!(matches!(b.unwrap(), RunOutcome::Completed { .. }));
        assert_eq!(h.client.invited(), vec![1000, 1001, 1002, 1003]);
    }
}
