use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

use earbud_anc::config::EarSide;
use earbud_anc::sim::SimulatedPair;
use earbud_anc::{Config, Daemon, Event, Notification};

/// ancd - earbud ANC control daemon
#[derive(Parser)]
#[command(name = "ancd", version, about)]
struct Cli {
    /// Config file (defaults to the per-user config location)
    #[arg(short, long, env = "ANCD_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the daemon with a line console on stdin (default)
    Run,
    /// Run a quiet-mode negotiation between two simulated earbuds
    Simulate {
        /// How long silence lasts, in milliseconds
        #[arg(long, default_value = "1000")]
        quiet_ms: u64,
    },
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,earbud_anc=info",
        1 => "info,earbud_anc=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load(cli.config.as_deref())?;
    tracing::debug!(?config, "loaded configuration");

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            tracing::info!(side = %config.side, modes = config.num_modes, "starting ANC daemon");
            Daemon::new(config).run().await?;
        }
        Command::Simulate { quiet_ms } => simulate(&config, Duration::from_millis(quiet_ms))?,
        Command::Config => println!("{}", serde_json::to_string_pretty(&config)?),
    }

    Ok(())
}

/// Bring up a pair, let both detect silence, then clear it on one side
fn simulate(config: &Config, quiet: Duration) -> anyhow::Result<()> {
    let mut pair = SimulatedPair::simulated(config);
    let mut left = pair.manager(EarSide::Left).subscribe();
    let mut right = pair.manager(EarSide::Right).subscribe();

    pair.bring_up();
    println!("t={:?} both earbuds enabled", pair.now());

    pair.dispatch_both(Event::QuietModeDetected);
    pair.run_for(quiet);
    drain("left", &mut left)?;
    drain("right", &mut right)?;

    pair.dispatch(EarSide::Right, Event::QuietModeCleared)?;
    pair.run_for(config.timing.quiet_mode_delay * 2);
    drain("left", &mut left)?;
    drain("right", &mut right)?;

    for side in [EarSide::Left, EarSide::Right] {
        let qm = pair.manager(side).quiet_mode();
        println!("{side}: local={:?} remote={:?}", qm.local(), qm.remote());
    }
    Ok(())
}

fn drain(label: &str, rx: &mut broadcast::Receiver<Notification>) -> anyhow::Result<()> {
    while let Ok(notification) = rx.try_recv() {
        // gain polling is noise here
        if matches!(notification, Notification::FeedForwardGain { .. }) {
            continue;
        }
        println!("{label}: {}", serde_json::to_string(&notification)?);
    }
    Ok(())
}
