//! nanoclaw - job management CLI.

use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use nanoclaw::{
    app::build_scheduler,
    config::Config,
    scheduler::{JobDefinition, JobPayload, Trigger, parse_timestamp},
    workspace::Workspace,
};

#[derive(Parser, Debug)]
#[command(name = "nanoclaw")]
#[command(about = "Personal automation agent: scheduled jobs and heartbeat")]
#[command(version)]
struct Cli {
    /// Configuration file path (default: ~/.nanoclaw/config.toml)
    #[arg(short, long, global = true, env = "NANOCLAW_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage scheduled jobs
    #[command(subcommand)]
    Cron(CronCommand),

    /// Inspect the heartbeat checklist
    #[command(subcommand)]
    Heartbeat(HeartbeatCommand),
}

#[derive(Subcommand, Debug)]
enum CronCommand {
    /// Add a recurring job
    Add {
        #[command(flatten)]
        job: JobArgs,

        /// Cron expression, e.g. "0 9 * * *"
        #[arg(long, conflicts_with = "every", required_unless_present = "every")]
        cron: Option<String>,

        /// IANA timezone for the cron expression
        #[arg(long, requires = "cron")]
        tz: Option<String>,

        /// Interval in seconds
        #[arg(long)]
        every: Option<u64>,
    },

    /// Add a one-shot job
    At {
        #[command(flatten)]
        job: JobArgs,

        /// When to run, e.g. 2026-02-12T10:30:00 (UTC) or RFC 3339
        #[arg(long)]
        at: String,

        /// Keep the job after it runs instead of deleting it
        #[arg(long)]
        keep: bool,
    },

    /// List jobs
    List {
        /// Include disabled jobs
        #[arg(long)]
        all: bool,
    },

    /// Remove a job
    Remove { id: String },

    /// Enable or disable a job
    Enable {
        id: String,

        #[arg(long)]
        disable: bool,
    },
}

#[derive(Args, Debug)]
struct JobArgs {
    /// Job name
    #[arg(long)]
    name: String,

    /// Instruction to run when the job fires
    #[arg(long)]
    message: String,

    /// Explicit job id (generated when omitted)
    #[arg(long)]
    id: Option<String>,

    /// Report the result to this channel
    #[arg(long, requires = "to")]
    channel: Option<String>,

    /// Chat within the channel
    #[arg(long, requires = "channel")]
    to: Option<String>,
}

impl JobArgs {
    fn into_job(self, trigger: Trigger) -> JobDefinition {
        let mut payload = JobPayload::message(self.message);
        if let (Some(channel), Some(to)) = (self.channel, self.to) {
            payload = payload.deliver_to(channel, to);
        }
        let job = JobDefinition::new(self.name, trigger, payload);
        match self.id {
            Some(id) => job.with_id(id),
            None => job,
        }
    }
}

#[derive(Subcommand, Debug)]
enum HeartbeatCommand {
    /// Print the current checklist
    Show,
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("nanoclaw=info"));
    let json = std::env::var("NANOCLAW_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;

    match cli.command {
        Command::Cron(cmd) => run_cron(&config, cmd).await,
        Command::Heartbeat(HeartbeatCommand::Show) => {
            let workspace = Workspace::new(&config.workspace.root);
            match workspace.heartbeat_checklist().await? {
                Some(content) if !content.trim().is_empty() => print!("{}", content),
                _ => println!("No heartbeat checklist at {}", workspace.root().join("HEARTBEAT.md").display()),
            }
            Ok(())
        }
    }
}

async fn run_cron(config: &Config, cmd: CronCommand) -> anyhow::Result<()> {
    let scheduler = build_scheduler(config);

    match cmd {
        CronCommand::Add {
            job,
            cron,
            tz,
            every,
        } => {
            let trigger = match (cron, every) {
                (Some(expr), None) => Trigger::cron(expr, tz),
                (None, Some(secs)) => Trigger::every(secs),
                _ => bail!("give exactly one of --cron or --every"),
            };
            let job = scheduler.add_job(job.into_job(trigger)).await?;
            println!("Added job '{}' ({}), {}", job.name, job.id, job.trigger.describe());
        }
        CronCommand::At { job, at, keep } => {
            let at = parse_timestamp(&at)?;
            let job = job.into_job(Trigger::at(at)).with_delete_after_run(!keep);
            let job = scheduler.add_job(job).await?;
            println!("Added job '{}' ({}), {}", job.name, job.id, job.trigger.describe());
        }
        CronCommand::List { all } => {
            let jobs = scheduler.list_jobs(all).await?;
            if jobs.is_empty() {
                println!("No scheduled jobs.");
                return Ok(());
            }
            println!(
                "{:<10} {:<24} {:<28} {:<22} {}",
                "ID", "NAME", "SCHEDULE", "NEXT RUN", "STATUS"
            );
            for job in jobs {
                let next = job
                    .next_run
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "-".to_string());
                let status = if job.enabled {
                    job.last_status
                        .map(|s| s.to_string())
                        .unwrap_or_else(|| "pending".to_string())
                } else {
                    "disabled".to_string()
                };
                println!(
                    "{:<10} {:<24} {:<28} {:<22} {}",
                    job.id,
                    job.name,
                    job.trigger.describe(),
                    next,
                    status
                );
            }
        }
        CronCommand::Remove { id } => {
            scheduler.remove_job(&id).await?;
            println!("Removed job {}", id);
        }
        CronCommand::Enable { id, disable } => {
            let job = scheduler.set_enabled(&id, !disable).await?;
            println!(
                "Job {} {}",
                job.id,
                if job.enabled { "enabled" } else { "disabled" }
            );
        }
    }
    Ok(())
}
