//! # MemberFlow CLI
//!
//! Resumable, rate-limited member addition jobs.
//!
//! Usage:
//!   memberflow account add --id main --phone +15550100 --session <SESSION>
//!   memberflow job create --account main --target -1001234 --members members.txt
//!   memberflow job run <JOB_ID>          # Ctrl-C pauses, run again to resume
//!   memberflow job status <JOB_ID>

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use memberflow_core::{Account, AccountStore, MemberFlowConfig};
use memberflow_gateway::{BridgeConnector, ClientLease, ClientRegistry, EntityResolver, directory};
use memberflow_scheduler::{Job, JobManager, JobStatus, NewJob, SchedulerDb, Stores, parse_member_list};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "memberflow", version, about = "📨 MemberFlow: resumable member addition jobs")]
struct Cli {
    /// Config file (default: ~/.memberflow/config.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Register or disconnect provider accounts
    Account {
        #[command(subcommand)]
        action: AccountAction,
    },
    /// Create and drive member addition jobs
    Job {
        #[command(subcommand)]
        action: JobAction,
    },
    /// Recent activity of an account
    Logs {
        #[arg(long)]
        account: String,
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Print the account's contacts as a member list
    Contacts {
        #[arg(long)]
        account: String,
    },
    /// Check which identifiers of a member file resolve
    Validate {
        #[arg(long)]
        account: String,
        #[arg(long)]
        members: PathBuf,
    },
    /// Channels and groups the account administers
    Channels {
        #[arg(long)]
        account: String,
    },
}

#[derive(Subcommand)]
enum AccountAction {
    Add {
        #[arg(long)]
        id: String,
        #[arg(long)]
        phone: String,
        /// Session string issued by the bridge
        #[arg(long)]
        session: String,
        #[arg(long)]
        username: Option<String>,
    },
    /// Cancel the account's unfinished jobs and forget its session
    Disconnect { id: String },
}

#[derive(Subcommand)]
enum JobAction {
    Create {
        #[arg(long)]
        account: String,
        /// Target group or channel id
        #[arg(long)]
        target: String,
        /// File with one identifier per line
        #[arg(long)]
        members: PathBuf,
        /// Additions per minute
        #[arg(long)]
        rate_limit: Option<u32>,
        /// Seconds to rest after each batch of `rate_limit` members
        #[arg(long)]
        batch_delay: Option<u64>,
    },
    /// Start or resume a job and follow it until it stops
    Run { job_id: String },
    Pause { job_id: String },
    Stop { job_id: String },
    Status { job_id: String },
    List {
        #[arg(long)]
        account: Option<String>,
    },
}

struct App {
    config: MemberFlowConfig,
    db: Arc<SchedulerDb>,
    registry: Arc<ClientRegistry>,
    manager: Arc<JobManager>,
}

impl App {
    fn open(config: MemberFlowConfig) -> Result<Self> {
        let db_path = config.storage.resolved_db_path();
        let db = Arc::new(
            SchedulerDb::open(&db_path).with_context(|| format!("opening {}", db_path.display()))?,
        );
        let registry = Arc::new(ClientRegistry::new(Arc::new(BridgeConnector::new(
            config.gateway.clone(),
        ))));
        let manager = Arc::new(JobManager::new(Stores::shared(db.clone()), registry.clone(), &config));
        Ok(Self {
            config,
            db,
            registry,
            manager,
        })
    }

    fn active_account(&self, id: &str) -> Result<Account> {
        match self.db.get_account(id)? {
            Some(account) if account.is_active => Ok(account),
            Some(_) => anyhow::bail!("account {id} is disconnected"),
            None => anyhow::bail!("account {id} not found"),
        }
    }

    async fn client(&self, account_id: &str) -> Result<ClientLease> {
        let account = self.active_account(account_id)?;
        Ok(self.registry.acquire(&account).await?)
    }
}

fn read_members(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(parse_member_list(&text))
}

fn print_job(job: &Job) {
    println!("📋 Job {}", job.id);
    println!("   Account:  {}", job.account_id);
    println!("   Target:   {}", job.target_group_id);
    println!("   Status:   {}", job.status);
    println!(
        "   Progress: {}/{} ({}%), {} added, {} failed",
        job.checkpoint(),
        job.total(),
        job.progress_percent(),
        job.added_count,
        job.failed_count
    );
    println!("   Pace:     {}/min, {}s batch delay", job.rate_limit, job.batch_delay);
    if let Some(t) = job.started_at {
        println!("   Started:  {}", t.format("%Y-%m-%d %H:%M:%S"));
    }
    if let Some(t) = job.completed_at {
        println!("   Finished: {}", t.format("%Y-%m-%d %H:%M:%S"));
    }
}

async fn run_job(app: &App, job_id: &str) -> Result<()> {
    let job = app.manager.get_job(job_id)?;
    match job.status {
        JobStatus::Pending => app.manager.start_job(job_id).await?,
        JobStatus::Paused => app.manager.resume_job(job_id).await?,
        JobStatus::Running => app.manager.reattach_job(job_id).await?,
        _ => {
            println!("Job already finished.");
            print_job(&job);
            return Ok(());
        }
    };
    println!("▶️  Running job {job_id} at {}/{} (Ctrl-C pauses)", job.checkpoint(), job.total());

    let pauser = {
        let manager = app.manager.clone();
        let id = job_id.to_string();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                println!("\n⏸️  Pausing after the current member...");
                if let Err(e) = manager.pause_job(&id) {
                    tracing::warn!("Pause not applied: {e}");
                }
            }
        })
    };

    let job = app.manager.wait(job_id).await?;
    pauser.abort();
    print_job(&job);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "memberflow=debug,memberflow_scheduler=debug,memberflow_gateway=debug"
    } else {
        "memberflow=info,memberflow_scheduler=info,memberflow_gateway=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let config = match &cli.config {
        Some(path) => MemberFlowConfig::load_from(Path::new(&shellexpand::tilde(path).to_string()))?,
        None => MemberFlowConfig::load()?,
    };
    let app = App::open(config)?;

    match cli.command {
        Command::Account { action } => match action {
            AccountAction::Add {
                id,
                phone,
                session,
                username,
            } => {
                let mut account = Account::new(&id, &phone, &session);
                account.username = username.map(|u| u.trim_start_matches('@').to_string());
                app.manager.register_account(&account)?;
                println!("✅ Account {id} registered ({})", account.label());
            }
            AccountAction::Disconnect { id } => {
                let cancelled = app.manager.disconnect_account(&id).await?;
                println!("🔌 Account {id} disconnected, {} jobs cancelled", cancelled.len());
                for job_id in cancelled {
                    println!("   - {job_id}");
                }
            }
        },

        Command::Job { action } => match action {
            JobAction::Create {
                account,
                target,
                members,
                rate_limit,
                batch_delay,
            } => {
                let member_list = read_members(&members)?;
                let job = app.manager.create_job(NewJob {
                    account_id: account,
                    target_group_id: target,
                    member_list,
                    rate_limit: rate_limit.unwrap_or(app.config.jobs.default_rate_limit),
                    batch_delay: batch_delay.unwrap_or(app.config.jobs.default_batch_delay),
                })?;
                println!("✅ Job created");
                print_job(&job);
            }
            JobAction::Run { job_id } => run_job(&app, &job_id).await?,
            JobAction::Pause { job_id } => {
                app.manager.pause_job(&job_id)?;
                println!("⏸️  Pause requested; the worker stops before the next member.");
            }
            JobAction::Stop { job_id } => {
                app.manager.stop_job(&job_id)?;
                println!("⏹️  Job {job_id} stopped.");
            }
            JobAction::Status { job_id } => print_job(&app.manager.get_job(&job_id)?),
            JobAction::List { account } => {
                let jobs = app.manager.list_jobs(account.as_deref())?;
                if jobs.is_empty() {
                    println!("No jobs.");
                }
                for job in jobs {
                    println!(
                        "{}  {:<9}  {:>6}/{:<6}  {}  {}",
                        job.id,
                        job.status.as_str(),
                        job.checkpoint(),
                        job.total(),
                        job.target_group_id,
                        job.created_at.format("%Y-%m-%d %H:%M")
                    );
                }
            }
        },

        Command::Logs { account, limit } => {
            for entry in app.manager.recent_activity(&account, limit)? {
                println!(
                    "{}  {:<7}  {:<20}  {}",
                    entry.created_at.format("%Y-%m-%d %H:%M:%S"),
                    entry.status.as_str(),
                    entry.action,
                    entry.details
                );
            }
        }

        Command::Contacts { account } => {
            let client = app.client(&account).await?;
            let ceiling = Duration::from_secs(app.config.engine.contact_flood_wait_secs);
            let contacts = directory::accessible_contacts(&*client, ceiling).await?;
            tracing::info!("📇 {} contacts", contacts.len());
            for contact in contacts {
                println!("{contact}");
            }
        }

        Command::Validate { account, members } => {
            let identifiers = read_members(&members)?;
            let client = app.client(&account).await?;
            let resolver = EntityResolver::new(app.config.resolver.clone());
            let report = directory::validate_identifiers(&resolver, &*client, &identifiers).await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            println!(
                "✅ {}/{} accessible ({}%)",
                report.accessible.len(),
                report.total,
                report.success_rate()
            );
        }

        Command::Channels { account } => {
            let client = app.client(&account).await?;
            let channels = directory::admin_channels(&*client, app.config.resolver.dialog_limit).await?;
            app.db.save_channels(&account, &channels)?;
            if channels.is_empty() {
                println!("No administered channels.");
            }
            for channel in channels {
                println!(
                    "{}  {}  {}  {} members",
                    channel.id,
                    channel.title,
                    channel.username.as_deref().map(|u| format!("@{u}")).unwrap_or_default(),
                    channel.participants_count
                );
            }
        }
    }

    Ok(())
}
