use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use wiremesh_cli::commands;
use wiremesh_cli::config;
use wiremesh_cli::error::CliError;
use wiremesh_core::RenderOptions;

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // stdout carries command output
    #[cfg(distribute)]
    {
        fmt().json().with_writer(std::io::stderr).with_env_filter(filter).init();
    }

    #[cfg(not(distribute))]
    {
        fmt().pretty().with_writer(std::io::stderr).with_env_filter(filter).init();
    }
}

#[derive(Debug, Parser)]
#[command(name = "wiremesh")]
#[command(version = env!("GIT_VERSION"))]
#[command(about = "Validate a WireGuard mesh and generate per-peer configs")]
struct Args {
    /// Path to the network snapshot (TOML, or JSON with a .json extension)
    #[arg(short, long, env = "WIREMESH_NETWORK", global = true)]
    network: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Render the wg-quick config for a peer
    Conf {
        peer_id: String,

        /// Only emit keys `wg setconf` accepts
        #[arg(long)]
        stripped: bool,

        /// Write <peer-name>.conf into this directory instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the next free address in the subnet
    NextAddress,

    /// Print the canonical id of the connection between two peers, or with a
    /// single connection id, the two peers it joins
    ConnectionId { a: String, b: Option<String> },

    /// Check a JSON field payload, printing {"status":..,"msg":..}
    Validate {
        field: String,
        payload: String,

        /// The peer being edited, so its own address is not reported as taken
        #[arg(long)]
        peer: Option<String>,
    },

    /// Verify address and connection integrity of the snapshot
    Check,
}

async fn load_network(path: Option<&PathBuf>) -> Result<wiremesh_types::Network, CliError> {
    let path = path.ok_or(CliError::MissingNetwork)?;
    Ok(config::load(path).await?)
}

async fn run(args: Args) -> Result<(), CliError> {
    match args.command {
        Command::Conf { peer_id, stripped, output } => {
            let network = load_network(args.network.as_ref()).await?;
            let options = RenderOptions {
                stripped,
                banner: Some(format!("generated by wiremesh {}", env!("GIT_VERSION"))),
            };
            let config = commands::render_config(&network, &peer_id, &options)?;
            match output {
                Some(dir) => {
                    let path = commands::write_config(&dir, &config).await?;
                    println!("{}", path.display());
                }
                None => print!("{}", config.contents),
            }
        }
        Command::NextAddress => {
            let network = load_network(args.network.as_ref()).await?;
            println!("{}", commands::next_address(&network)?);
        }
        Command::ConnectionId { a, b: Some(b) } => {
            println!("{}", commands::connection_id(&a, &b)?);
        }
        Command::ConnectionId { a, b: None } => {
            let (first, second) = commands::split_connection_id(&a)?;
            println!("{first}\n{second}");
        }
        Command::Validate { field, payload, peer } => {
            let network = match args.network.as_ref() {
                Some(path) => Some(config::load(path).await?),
                None => None,
            };
            let result =
                commands::validate_payload(network.as_ref(), peer.as_deref(), &field, &payload)?;
            println!("{}", serde_json::to_string(&result)?);
        }
        Command::Check => {
            let network = load_network(args.network.as_ref()).await?;
            commands::check(&network)?;
            println!("ok");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_tracing();
    let args = Args::parse();

    info!(version = env!("GIT_VERSION"), "starting wiremesh");

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "command failed");
            eprintln!("error: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}
