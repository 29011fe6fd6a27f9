//! SQLite-backed persistence for jobs, accounts, the activity log and the
//! channels each account administers.
//! Survives restarts: a paused job resumes from its stored checkpoint.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use memberflow_core::{Account, AccountStore, MemberFlowError, Result};
use memberflow_gateway::directory::AdminChannel;
use rusqlite::{Connection, OptionalExtension, params};

use crate::activity::{ActivityEntry, ActivityLog, ActivityStatus, NewActivity};
use crate::jobs::{Job, JobStatus};
use crate::store::JobStore;

const JOB_COLUMNS: &str = "id, account_id, target_group_id, member_list, rate_limit, batch_delay, \
     status, added_count, failed_count, created_at, started_at, completed_at";

fn db_err(context: &str) -> impl FnOnce(rusqlite::Error) -> MemberFlowError + '_ {
    move |e| MemberFlowError::Database(format!("{context}: {e}"))
}

fn parse_time(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// SQLite-backed store for all scheduler data.
pub struct SchedulerDb {
    conn: Mutex<Connection>,
}

impl SchedulerDb {
    /// Open or create the database, creating parent directories.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(db_err("DB open"))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;").ok();
        let db = Self { conn: Mutex::new(conn) };
        db.migrate()?;
        tracing::debug!("💾 Scheduler DB opened at {}", path.display());
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err("DB open"))?;
        let db = Self { conn: Mutex::new(conn) };
        db.migrate()?;
        Ok(db)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn migrate(&self) -> Result<()> {
        self.conn()
            .execute_batch(
                "
            CREATE TABLE IF NOT EXISTS accounts (
                id TEXT PRIMARY KEY,
                phone TEXT NOT NULL,
                username TEXT,
                session TEXT NOT NULL DEFAULT '',
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                account_id TEXT NOT NULL,
                target_group_id TEXT NOT NULL,
                member_list TEXT NOT NULL,            -- JSON array of identifiers
                rate_limit INTEGER NOT NULL DEFAULT 4,
                batch_delay INTEGER NOT NULL DEFAULT 120,
                status TEXT NOT NULL DEFAULT 'pending',
                added_count INTEGER NOT NULL DEFAULT 0,
                failed_count INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                started_at TEXT,
                completed_at TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_jobs_account ON jobs(account_id);

            CREATE TABLE IF NOT EXISTS activity_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                account_id TEXT NOT NULL,
                job_id TEXT,
                action TEXT NOT NULL,
                details TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL DEFAULT 'info',   -- success, error, info
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_activity_account ON activity_logs(account_id);

            CREATE TABLE IF NOT EXISTS channels (
                account_id TEXT NOT NULL,
                channel_id INTEGER NOT NULL,
                title TEXT NOT NULL,
                username TEXT,
                participants_count INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (account_id, channel_id)
            );
         ",
            )
            .map_err(db_err("Migration"))
    }

    /// Replace the stored admin channels of `account_id` with `channels`.
    pub fn save_channels(&self, account_id: &str, channels: &[AdminChannel]) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction().map_err(db_err("Save channels"))?;
        tx.execute("DELETE FROM channels WHERE account_id = ?1", params![account_id])
            .map_err(db_err("Save channels"))?;
        let now = Utc::now().to_rfc3339();
        for channel in channels {
            tx.execute(
                "INSERT OR REPLACE INTO channels \
                 (account_id, channel_id, title, username, participants_count, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    account_id,
                    channel.id,
                    channel.title,
                    channel.username,
                    channel.participants_count,
                    now,
                ],
            )
            .map_err(db_err("Save channels"))?;
        }
        tx.commit().map_err(db_err("Save channels"))?;
        tracing::debug!("💾 Stored {} channels for {account_id}", channels.len());
        Ok(())
    }

    /// Admin channels last stored for `account_id`, by title.
    pub fn channels(&self, account_id: &str) -> Result<Vec<AdminChannel>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT channel_id, title, username, participants_count FROM channels \
                 WHERE account_id = ?1 ORDER BY title, channel_id",
            )
            .map_err(db_err("List channels"))?;
        let rows = stmt
            .query_map(params![account_id], |row| {
                Ok(AdminChannel {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    username: row.get(2)?,
                    participants_count: row.get(3)?,
                })
            })
            .map_err(db_err("List channels"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("List channels"))
    }

    fn row_to_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<Job> {
        let member_list: String = row.get(3)?;
        let status: String = row.get(6)?;
        let created_at: String = row.get(9)?;
        let started_at: Option<String> = row.get(10)?;
        let completed_at: Option<String> = row.get(11)?;
        Ok(Job {
            id: row.get(0)?,
            account_id: row.get(1)?,
            target_group_id: row.get(2)?,
            member_list: serde_json::from_str(&member_list).unwrap_or_default(),
            rate_limit: row.get(4)?,
            batch_delay: row.get::<_, i64>(5)? as u64,
            status: JobStatus::parse(&status).unwrap_or(JobStatus::Failed),
            added_count: row.get(7)?,
            failed_count: row.get(8)?,
            created_at: parse_time(&created_at),
            started_at: started_at.as_deref().map(parse_time),
            completed_at: completed_at.as_deref().map(parse_time),
        })
    }

    fn load_job(conn: &Connection, id: &str) -> Result<Option<Job>> {
        conn.query_row(
            &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"),
            params![id],
            Self::row_to_job,
        )
        .optional()
        .map_err(db_err("Load job"))
    }
}

impl JobStore for SchedulerDb {
    fn insert_job(&self, job: &Job) -> Result<()> {
        let member_list = serde_json::to_string(&job.member_list)?;
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO jobs ({JOB_COLUMNS}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
                ),
                params![
                    job.id,
                    job.account_id,
                    job.target_group_id,
                    member_list,
                    job.rate_limit,
                    job.batch_delay as i64,
                    job.status.as_str(),
                    job.added_count,
                    job.failed_count,
                    job.created_at.to_rfc3339(),
                    job.started_at.map(|t| t.to_rfc3339()),
                    job.completed_at.map(|t| t.to_rfc3339()),
                ],
            )
            .map_err(db_err("Insert job"))?;
        Ok(())
    }

    fn get_job(&self, id: &str) -> Result<Option<Job>> {
        Self::load_job(&self.conn(), id)
    }

    fn list_jobs(&self, account_id: Option<&str>) -> Result<Vec<Job>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {JOB_COLUMNS} FROM jobs \
                 WHERE ?1 IS NULL OR account_id = ?1 \
                 ORDER BY created_at DESC"
            ))
            .map_err(db_err("List jobs"))?;
        let rows = stmt
            .query_map(params![account_id], Self::row_to_job)
            .map_err(db_err("List jobs"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("List jobs"))
    }

    fn update_progress(&self, id: &str, added: u32, failed: u32) -> Result<()> {
        let conn = self.conn();
        let mut job = Self::load_job(&conn, id)?
            .ok_or_else(|| MemberFlowError::NotFound(format!("job {id}")))?;
        job.record_progress(added, failed)?;
        conn.execute(
            "UPDATE jobs SET added_count = ?2, failed_count = ?3 WHERE id = ?1",
            params![id, added, failed],
        )
        .map_err(db_err("Update progress"))?;
        Ok(())
    }

    fn transition(&self, id: &str, from: &[JobStatus], to: JobStatus) -> Result<bool> {
        // The connection lock serializes the read and the write.
        let conn = self.conn();
        let mut job = Self::load_job(&conn, id)?
            .ok_or_else(|| MemberFlowError::NotFound(format!("job {id}")))?;
        if !from.contains(&job.status) || !job.apply_transition(to, Utc::now()) {
            return Ok(false);
        }
        conn.execute(
            "UPDATE jobs SET status = ?2, started_at = ?3, completed_at = ?4 WHERE id = ?1",
            params![
                id,
                job.status.as_str(),
                job.started_at.map(|t| t.to_rfc3339()),
                job.completed_at.map(|t| t.to_rfc3339()),
            ],
        )
        .map_err(db_err("Transition job"))?;
        Ok(true)
    }
}

impl AccountStore for SchedulerDb {
    fn save_account(&self, account: &Account) -> Result<()> {
        self.conn()
            .execute(
                "INSERT OR REPLACE INTO accounts (id, phone, username, session, is_active, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    account.id,
                    account.phone,
                    account.username,
                    account.session,
                    account.is_active as i32,
                    account.created_at.to_rfc3339(),
                ],
            )
            .map_err(db_err("Save account"))?;
        Ok(())
    }

    fn get_account(&self, id: &str) -> Result<Option<Account>> {
        self.conn()
            .query_row(
                "SELECT id, phone, username, session, is_active, created_at FROM accounts WHERE id = ?1",
                params![id],
                |row| {
                    let created_at: String = row.get(5)?;
                    Ok(Account {
                        id: row.get(0)?,
                        phone: row.get(1)?,
                        username: row.get(2)?,
                        session: row.get(3)?,
                        is_active: row.get::<_, i32>(4)? != 0,
                        created_at: parse_time(&created_at),
                    })
                },
            )
            .optional()
            .map_err(db_err("Load account"))
    }

    fn deactivate_account(&self, id: &str) -> Result<()> {
        let changed = self
            .conn()
            .execute(
                "UPDATE accounts SET is_active = 0, session = '' WHERE id = ?1",
                params![id],
            )
            .map_err(db_err("Deactivate account"))?;
        if changed == 0 {
            return Err(MemberFlowError::NotFound(format!("account {id}")));
        }
        Ok(())
    }
}

impl ActivityLog for SchedulerDb {
    fn append(&self, entry: NewActivity) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO activity_logs (account_id, job_id, action, details, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    entry.account_id,
                    entry.job_id,
                    entry.action,
                    entry.details,
                    entry.status.as_str(),
                    Utc::now().to_rfc3339(),
                ],
            )
            .map_err(db_err("Append activity"))?;
        Ok(())
    }

    fn recent(&self, account_id: &str, limit: usize) -> Result<Vec<ActivityEntry>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT id, account_id, job_id, action, details, status, created_at
                 FROM activity_logs WHERE account_id = ?1 ORDER BY id DESC LIMIT ?2",
            )
            .map_err(db_err("Recent activity"))?;
        let rows = stmt
            .query_map(params![account_id, limit as i64], |row| {
                let status: String = row.get(5)?;
                let created_at: String = row.get(6)?;
                Ok(ActivityEntry {
                    id: row.get(0)?,
                    account_id: row.get(1)?,
                    job_id: row.get(2)?,
                    action: row.get(3)?,
                    details: row.get(4)?,
                    status: ActivityStatus::parse(&status),
                    created_at: parse_time(&created_at),
                })
            })
            .map_err(db_err("Recent activity"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("Recent activity"))
    }
}
