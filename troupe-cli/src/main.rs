//! Troupe CLI - run the team daemon and its agent processes

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use troupe_core::config::TroupeConfig;
use troupe_core::identity::AgentIdentity;
use troupe_supervisor::TeamDaemon;

const EXIT_GRACE: Duration = Duration::from_millis(500);

#[derive(Parser)]
#[command(name = "troupe")]
#[command(about = "Supervisor for a team of agent processes", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to ./troupe.toml and TROUPE_CONFIG_PATH)
    #[arg(long, global = true, env = "TROUPE_CONFIG_PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the team daemon until interrupted
    Daemon,
    /// Run a single agent (internal, spawned by the daemon)
    Agent {
        /// Identity to run as
        #[arg(long)]
        identity: AgentIdentity,
    },
    /// Print the effective configuration as JSON
    Config,
    /// Version information
    Version,
}

fn init_tracing(agent_mode: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    if agent_mode {
        // Stdout carries the queue channel; the daemon re-logs our stderr.
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .without_time()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn load_config(path: Option<&Path>) -> Result<TroupeConfig> {
    TroupeConfig::load_from(path).context("Failed to load configuration")
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(matches!(cli.command, Commands::Agent { .. }));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(run(cli));
    // An agent's stdin read cannot be cancelled; don't wait on it at exit.
    runtime.shutdown_timeout(EXIT_GRACE);
    result
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Daemon => {
            let config = load_config(config_path)?;
            info!(
                "troupe {} starting daemon for {:?}",
                env!("CARGO_PKG_VERSION"),
                config.daemon.identities
            );
            let mut daemon = TeamDaemon::from_config(&config, config_path)?;
            daemon.run().await?;
        }
        Commands::Agent { identity } => {
            let config = load_config(config_path)?;
            troupe_supervisor::run_agent(identity, &config.agent).await?;
        }
        Commands::Config => {
            let config = load_config(config_path)?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Commands::Version => {
            println!("troupe {}", env!("CARGO_PKG_VERSION"));
            println!("troupe-core {}", troupe_core::VERSION);
        }
    }

    Ok(())
}
