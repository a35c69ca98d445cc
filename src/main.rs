use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use portico::auth::UserStore;
use portico::Config;
use std::path::PathBuf;

/// Static file server with user registration, login and session cookies.
#[derive(Parser, Debug)]
#[command(name = "portico", version, about)]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the site and the auth API (default)
    Serve {
        /// Bind address (overrides config and PORTICO_HOST)
        #[arg(long)]
        host: Option<String>,

        /// Port (overrides config and PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Drop malformed records from the users file and exit
    Compact,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;

    match cli.command.unwrap_or(Command::Serve {
        host: None,
        port: None,
    }) {
        Command::Serve { host, port } => {
            if let Some(host) = host {
                config.gateway.host = host;
            }
            if let Some(port) = port {
                config.gateway.port = port;
            }
            portico::gateway::run_gateway(config).await
        }
        Command::Compact => {
            let path = &config.auth.users_file;
            let store = UserStore::open(path)?;
            let report = store
                .compact()
                .with_context(|| format!("Failed to compact {}", path.display()))?;
            println!(
                "{}: kept {} record(s), dropped {} malformed line(s)",
                path.display(),
                report.kept,
                report.dropped
            );
            Ok(())
        }
    }
}
