use anyhow::{Result, bail};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{Level, info, warn};
use tracing_subscriber::EnvFilter;

use seat_rush::{
    CONFIG_ENV, Clock, Credentials, HttpBackend, RetryScheduler, RunConfig, RunOutcome,
    SystemClock, is_active_today, load_config, resolve_config_path,
};

#[derive(Parser)]
#[command(name = "seat-rush")]
#[command(about = "Time-gated concurrent seat reservation")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct RunArgs {
    /// Path to the account configuration (JSON)
    #[arg(short = 'u', long, env = CONFIG_ENV)]
    config: Option<PathBuf>,
    /// Unattended mode: take credentials from $USERNAMES / $PASSWORDS
    #[arg(short, long, default_value_t = false)]
    action: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Wait for the gates, log in, and retry reservations until done
    Reserve {
        #[command(flatten)]
        args: RunArgs,
    },
    /// Log in now and run a single reservation round
    Debug {
        #[command(flatten)]
        args: RunArgs,
    },
    /// Validate the configuration and show today's tasks
    Check {
        #[arg(short = 'u', long, env = CONFIG_ENV)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("seat_rush=info".parse()?))
        .with_max_level(Level::INFO)
        .init();

    let cli = Cli::parse();

    let outcome = match cli.command {
        Commands::Reserve { args } => {
            let scheduler = build_scheduler(&args)?;
            scheduler.run().await
        }
        Commands::Debug { args } => {
            let scheduler = build_scheduler(&args)?;
            scheduler.debug().await
        }
        Commands::Check { config } => {
            let path = resolve_config_path(config)?;
            let cfg = load_config(&path)?;
            print_summary(&cfg);
            return Ok(());
        }
    };

    println!("Run finished: {}", outcome);
    if outcome == RunOutcome::NoSessions {
        bail!("No account could log in");
    }

    Ok(())
}

fn build_scheduler(args: &RunArgs) -> Result<RetryScheduler<HttpBackend>> {
    let path = resolve_config_path(args.config.clone())?;
    info!("Loading configuration from {}", path.display());
    let cfg = load_config(&path)?;

    let backend = Arc::new(HttpBackend::new(
        cfg.backend.clone(),
        cfg.schedule.login_timeout,
        cfg.schedule.submit_timeout,
    ));
    let clock = Arc::new(SystemClock::new(cfg.schedule.timezone));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping");
            trigger.cancel();
        }
    });

    let mut scheduler = RetryScheduler::new(cfg.schedule, cfg.accounts, backend, clock)
        .with_cancellation(cancel);

    if args.action {
        scheduler = scheduler.with_credentials(Credentials::from_env()?);
    }

    Ok(scheduler)
}

fn print_summary(cfg: &RunConfig) {
    let clock = SystemClock::new(cfg.schedule.timezone);
    let today = clock.weekday();

    println!(
        "Login {}  Reserve {}  End {}  ({})",
        cfg.schedule.login_time,
        cfg.schedule.reserve_time,
        cfg.schedule.end_time,
        cfg.schedule.timezone
    );
    println!("Today is {:?}", today);
    println!();
    println!(
        "{:<16} {:<14} {:<8} {:<8} {:<6}",
        "ACCOUNT", "TIME", "ROOM", "SEAT", "TODAY"
    );
    println!("{}", "-".repeat(56));

    for account in &cfg.accounts {
        if account.tasks.is_empty() {
            println!("{:<16} (no tasks)", account.id);
        }
        for task in &account.tasks {
            let active = if is_active_today(task, today) { "yes" } else { "no" };
            println!(
                "{:<16} {:<14} {:<8} {:<8} {:<6}",
                account.id, task.time_label, task.room_id, task.seat_id, active
            );
        }
    }
}
