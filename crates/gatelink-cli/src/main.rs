//! gatelink: reach TCP services through a connection gateway.
//!
//! Opens WebSocket tunnels to a gateway and relays raw TCP bytes through
//! them: forward a local port to a remote target, or probe whether a
//! target is reachable.

mod commands;
mod config;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

/// gatelink: TCP tunnels through a connection gateway
#[derive(Parser)]
#[command(name = "gatelink", version, about = "TCP tunnels through a connection gateway")]
struct Cli {
    /// Gateway WebSocket URL (skips gateway selection)
    #[arg(short, long, global = true)]
    gateway: Option<String>,

    /// Account API base URL used to choose a gateway
    #[arg(long = "api", global = true)]
    api: Option<String>,

    /// Auth token presented to the gateway
    #[arg(long, global = true, env = "GATELINK_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Config file path
    #[arg(long = "config", global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Forward a local TCP port to HOST:PORT through the gateway
    Forward {
        /// Local address to listen on
        #[arg(short, long, default_value = "127.0.0.1:0")]
        listen: String,
        /// Remote target as HOST:PORT
        target: String,
    },

    /// Open one tunnel to HOST:PORT and report whether it succeeds
    Probe {
        /// Remote target as HOST:PORT
        target: String,
    },

    /// Print the effective configuration
    Config {
        /// Write the effective configuration back to the config file
        #[arg(long)]
        save: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing.
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("gatelink=debug,gatelink_cli=debug,gatelink_client=debug,gatelink_core=debug")
            .with_target(true)
            .init();
    } else {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("gatelink=warn,gatelink_cli=warn,gatelink_client=warn"));
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        eprintln!("gatelink: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // Load config file, then let flags override it.
    let config_path = cli.config.clone().unwrap_or_else(config::default_path);
    let mut cfg = config::Config::load(&config_path)?;
    cfg.apply_overrides(cli.gateway, cli.api, cli.token);

    match cli.command {
        Command::Forward { listen, target } => {
            let registry = commands::build_registry(&cfg)?;
            commands::forward::run(registry, &listen, &target).await
        }
        Command::Probe { target } => {
            let registry = commands::build_registry(&cfg)?;
            commands::probe::run(&registry, &target).await
        }
        Command::Config { save } => {
            if save {
                cfg.save(&config_path)?;
                println!("saved {}", config_path.display());
            }
            print!("{}", toml::to_string_pretty(&cfg.redacted())?);
            Ok(())
        }
    }
}
