//! # MemberFlow Scheduler
//!
//! The member addition job engine: a resumable, cancellable, rate-limited
//! batch processor driving invitations through the provider gateway.
//!
//! ## Architecture
//! ```text
//! JobManager (create / start / pause / resume / stop / get)
//!   └── spawn → JobProcessor::run(job_id)            one tokio task per job
//!         ├── reread status each item                 pause / cancel points
//!         ├── EntityResolver → InvitationExecutor     via ClientRegistry lease
//!         ├── JobStore::update_progress               checkpoint = added + failed
//!         └── pacing: 60 / rate_limit s, batch_delay every rate_limit items
//!
//! Stores: MemoryStore (in-process) | SchedulerDb (SQLite)
//!   jobs · accounts · activity_logs
//! ```

pub mod activity;
pub mod engine;
pub mod jobs;
pub mod manager;
pub mod members;
pub mod persistence;
pub mod store;

pub use activity::{ActivityEntry, ActivityLog, ActivityStatus, NewActivity};
pub use engine::{JobProcessor, RunOutcome, Stores};
pub use jobs::{Job, JobStatus, NewJob};
pub use manager::JobManager;
pub use members::parse_member_list;
pub use persistence::SchedulerDb;
pub use store::{JobStore, MemoryStore};
