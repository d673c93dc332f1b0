//! postline-send - Background daemon for scheduled publishing
//!
//! Polls the draft store, publishes due drafts, and periodically runs the
//! content-generation sweep for active agents.

use clap::Parser;
use libpostline::{Config, Database, Dispatcher, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "postline-send")]
#[command(version)]
#[command(about = "Background daemon for scheduled publishing")]
#[command(long_about = "\
postline-send - Background daemon for scheduled publishing

DESCRIPTION:
    postline-send is a long-running daemon with two sweeps:

    - publish sweep: finds drafts whose scheduled time has passed and
      publishes each through its platform adapter with bounded retry
      (default: every hour)
    - generation sweep: asks the content generator for new drafts for every
      active agent and schedules them five minutes out
      (default: twice a day)

USAGE:
    # Run in foreground (logs to stderr)
    postline-send

    # Custom sweep cadence
    postline-send --publish-interval 15m --generation-interval 6h

    # Enable verbose logging
    postline-send --verbose

SIGNALS:
    SIGTERM, SIGINT - Graceful shutdown (finishes the current draft)

CONFIGURATION:
    Configuration file: ~/.config/postline/config.toml
    Database location: ~/.local/share/postline/postline.db

EXIT CODES:
    0 - Clean shutdown
    1 - Runtime error
    2 - Configuration error
")]
struct Cli {
    /// How often to run the publish sweep (e.g. 1h, 30m, 90s)
    #[arg(long, value_name = "DURATION", default_value = "1h")]
    publish_interval: humantime::Duration,

    /// How often to run the generation sweep
    #[arg(long, value_name = "DURATION", default_value = "12h")]
    generation_interval: humantime::Duration,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,

    /// Run one publish sweep and one generation sweep, then exit
    #[arg(long, hide = true)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    libpostline::logging::init_from_env(cli.verbose);

    let config = Config::load()?;
    let db = Database::new(&config.database.path).await?;
    let dispatcher = Dispatcher::from_config(db, &config)?;

    info!("postline-send daemon starting");

    let shutdown = Arc::new(AtomicBool::new(false));
    setup_signal_handlers(shutdown.clone())?;

    let publish_interval: Duration = cli.publish_interval.into();
    let generation_interval: Duration = cli.generation_interval.into();
    info!(
        publish_interval = %cli.publish_interval,
        generation_interval = %cli.generation_interval,
        "sweep cadence"
    );

    if cli.once {
        run_publish_sweep(&dispatcher).await;
        run_generation_sweep(&dispatcher).await;
        info!("postline-send: ran both sweeps once, exiting");
    } else {
        run_daemon_loop(&dispatcher, publish_interval, generation_interval, shutdown).await;
    }

    info!("postline-send daemon stopped");
    Ok(())
}

/// Set up signal handlers for graceful shutdown
fn setup_signal_handlers(shutdown: Arc<AtomicBool>) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM]).map_err(|e| {
        libpostline::PostlineError::InvalidInput(format!("Signal setup failed: {}", e))
    })?;

    let shutdown_clone = shutdown.clone();
    std::thread::spawn(move || {
        for sig in signals.forever() {
            match sig {
                SIGTERM | SIGINT => {
                    info!("Received shutdown signal, stopping gracefully...");
                    shutdown_clone.store(true, Ordering::Relaxed);
                    break;
                }
                _ => {}
            }
        }
    });

    Ok(())
}

/// Main daemon loop: both sweeps on their own cadence, shutdown checked
/// every second.
async fn run_daemon_loop(
    dispatcher: &Dispatcher,
    publish_interval: Duration,
    generation_interval: Duration,
    shutdown: Arc<AtomicBool>,
) {
    let mut since_publish = publish_interval; // fire immediately on startup
    let mut since_generation = generation_interval;

    loop {
        if shutdown.load(Ordering::Relaxed) {
            info!("Shutdown requested, stopping daemon loop");
            break;
        }

        if since_publish >= publish_interval {
            run_publish_sweep(dispatcher).await;
            since_publish = Duration::ZERO;
        }
        if since_generation >= generation_interval {
            run_generation_sweep(dispatcher).await;
            since_generation = Duration::ZERO;
        }

        sleep(Duration::from_secs(1)).await;
        since_publish += Duration::from_secs(1);
        since_generation += Duration::from_secs(1);
    }
}

/// One publish sweep; errors are logged, never fatal.
async fn run_publish_sweep(dispatcher: &Dispatcher) {
    let now = chrono::Utc::now().timestamp();
    match dispatcher.run_sweep(now).await {
        Ok(stats) if stats.attempted > 0 => {
            info!(
                attempted = stats.attempted,
                published = stats.published,
                failed = stats.failed,
                "publish sweep done"
            );
        }
        Ok(_) => {}
        Err(e) => error!("publish sweep failed: {}", e),
    }
}

/// One generation sweep; errors are logged, never fatal.
async fn run_generation_sweep(dispatcher: &Dispatcher) {
    let now = chrono::Utc::now().timestamp();
    match dispatcher.run_generation(now).await {
        Ok(created) if created > 0 => info!(created, "generation sweep done"),
        Ok(_) => {}
        Err(e) => error!("generation sweep failed: {}", e),
    }
}
