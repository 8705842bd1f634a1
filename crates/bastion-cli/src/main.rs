use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use bastion_core::config::BastionConfig;
use bastion_core::JobId;
use bastion_restrictions::{store, EffectiveRestrictions, RestrictionState};
use bastion_scheduler::{MaintenanceScheduler, ScheduleRequest, SchedulerError, WindowActivator};
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use tracing::info;

/// Schedule maintenance windows and inspect the restrictions they govern.
#[derive(Parser)]
#[command(name = "bastion", version)]
struct Cli {
    /// Config file. Falls back to $BASTION_CONFIG, then ~/.bastion/bastion.toml.
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a maintenance window with its restrictions.
    Schedule {
        #[arg(long)]
        description: String,
        #[arg(long = "type", default_value = "maintenance")]
        job_type: String,
        /// RFC 3339 instant, or `YYYY-MM-DD HH:MM[:SS]` read as UTC.
        #[arg(long)]
        start_at: String,
        #[arg(long)]
        finish_at: String,
        /// Address exempt from the window. Repeatable.
        #[arg(long = "whitelist-ip")]
        whitelist_ip: Vec<String>,
    },
    /// List restrictions. Defaults to the effective (enabled) set.
    Restrictions {
        #[arg(long, default_value = "enabled")]
        state: RestrictionState,
    },
    /// Show one job and the restrictions linked to it.
    Job { id: String },
    /// Run the window activator until interrupted.
    Run,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bastion_scheduler=info,bastion_restrictions=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // config: --config > BASTION_CONFIG env > ~/.bastion/bastion.toml
    let config_path = cli.config.or_else(|| std::env::var("BASTION_CONFIG").ok());
    let config = BastionConfig::load(config_path.as_deref()).context("loading configuration")?;

    let db_path = &config.database.path;
    ensure_parent_dir(db_path);
    info!(path = %db_path, "opening SQLite database");
    let conn = bastion_scheduler::db::open(db_path, config.database.busy_timeout_ms)?;
    bastion_scheduler::db::init_db(&conn)?;

    let db = Arc::new(Mutex::new(conn));
    let cache = Arc::new(EffectiveRestrictions::new(config.cache.ttl_secs));

    match cli.command {
        Command::Schedule {
            description,
            job_type,
            start_at,
            finish_at,
            whitelist_ip,
        } => {
            let scheduler =
                MaintenanceScheduler::new(Arc::clone(&db), cache, &config.scheduler)?;
            let request = ScheduleRequest {
                description,
                job_type,
                start_at,
                finish_at,
                whitelist_ip,
            };
            match scheduler.schedule(&request) {
                Ok(job) => print_json(&job)?,
                Err(e @ (SchedulerError::InvalidType { .. } | SchedulerError::Validation(_))) => {
                    eprintln!("{}", serde_json::to_string_pretty(&e.client_payload())?);
                    std::process::exit(2);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Command::Restrictions { state } => {
            let conn = lock(&db);
            match state {
                RestrictionState::Enabled => print_json(&*cache.get_or_load(&conn)?)?,
                RestrictionState::Disabled => {
                    print_json(&store::list_by_state(&conn, RestrictionState::Disabled)?)?
                }
            }
        }
        Command::Job { id } => {
            let scheduler =
                MaintenanceScheduler::new(Arc::clone(&db), cache, &config.scheduler)?;
            match scheduler.job_details(&JobId::from(id.as_str()))? {
                Some(details) => print_json(&details)?,
                None => anyhow::bail!("job not found: {id}"),
            }
        }
        Command::Run => {
            let interval = Duration::from_secs(config.scheduler.activation_interval_secs.max(1));
            let activator = WindowActivator::new(Arc::clone(&db), cache, interval);
            let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
            let task = tokio::spawn(activator.run(shutdown_rx));

            tokio::signal::ctrl_c().await?;
            info!("interrupt received");
            let _ = shutdown_tx.send(true);
            task.await?;
        }
    }

    Ok(())
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn lock(db: &Mutex<Connection>) -> std::sync::MutexGuard<'_, Connection> {
    db.lock().unwrap_or_else(|e| e.into_inner())
}

fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}
