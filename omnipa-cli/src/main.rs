use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;
mod notifier;
mod session;

use commands::{ConfigCommand, PendingCommand, ShoppingCommand, SyncCommand};
use config::Config;
use session::Session;

#[derive(Parser)]
#[command(name = "omnipa")]
#[command(version)]
#[command(about = "Shopping lists that keep working offline", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(flatten)]
    Shopping(ShoppingCommand),

    /// Inspect or discard queued changes
    Pending {
        #[command(subcommand)]
        command: PendingCommand,
    },

    /// Manage configuration
    Config(ConfigCommand),

    /// Sync queued changes with the server
    Sync(SyncCommand),
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "omnipa=warn,omnipa_core=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = Config::load(cli.config)?;

    match &cli.command {
        // Config commands never touch the network
        Some(Commands::Config(cmd)) => cmd.run(&config),
        Some(command) => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(execute_command(command, &config))
        }
        None => {
            println!("Use --help to see available commands");
            Ok(())
        }
    }
}

async fn execute_command(
    command: &Commands,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let session = Session::start(config).await;

    // Coming back online replays the queue before anything else runs.
    // The notifier reports the outcome on stderr.
    if config.sync.auto_sync && !matches!(command, Commands::Sync(_)) {
        if let Some(report) = session.catch_up().await {
            tracing::info!(
                synced = report.synced,
                failed = report.failed,
                dead_lettered = report.dead_lettered,
                "Replayed queued changes"
            );
        }
    }

    match command {
        Commands::Shopping(cmd) => cmd.run(&session.sync).await?,
        Commands::Pending { command } => command.run(&session.sync)?,
        Commands::Sync(cmd) => cmd.run(config, &session).await?,
        Commands::Config(cmd) => cmd.run(config)?,
    }

    Ok(())
}
