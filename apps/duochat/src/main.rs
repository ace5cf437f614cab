//! duochat - encrypted two-party chat over a direct TCP connection
//!
//! Run without a subcommand for the interactive menu.

mod commands;
mod config;
mod console;
mod session;

use std::net::IpAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use shared_protocol::{DecryptFailurePolicy, Framing};

use crate::config::{ChatConfig, Overrides};
use crate::console::{MenuChoice, StdinLines};

const VERBOSE_FILTER: &str =
    "warn,duochat=debug,net_transport=debug,crypto_session=debug,shared_protocol=debug";

#[derive(Parser)]
#[command(name = "duochat")]
#[command(version)]
#[command(about = "Encrypted two-party chat over a direct TCP connection")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Port to host on or connect to [default: 9000]
    #[arg(short, long, global = true)]
    port: Option<u16>,

    /// Seconds to wait for a peer [default: 30]
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// JSON configuration file (falls back to $DUOCHAT_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Message framing: read-boundary or length-prefixed; both peers must match
    #[arg(long, global = true)]
    framing: Option<Framing>,

    /// What to do with a message that fails to decrypt: skip or terminate
    #[arg(long, global = true)]
    on_decrypt_error: Option<DecryptFailurePolicy>,

    /// Debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Wait for a peer to connect, then chat
    Host,

    /// Connect to a waiting peer, then chat
    Connect {
        /// IP address of the host
        address: IpAddr,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    let overrides = Overrides {
        port: cli.port,
        connect_timeout_secs: cli.timeout,
        framing: cli.framing,
        decrypt_failure_policy: cli.on_decrypt_error,
    };
    let config = ChatConfig::load(cli.config.as_deref())
        .context("Failed to load configuration")?
        .apply(&overrides);
    config.validate()?;
    info!("Starting duochat: {:?}", config);

    let mut input = StdinLines::spawn().context("Failed to start the input reader")?;

    match cli.command {
        Some(Command::Host) => commands::host(&config, &mut input).await,
        Some(Command::Connect { address }) => commands::connect(address, &config, &mut input).await,
        None => menu(&config, &mut input).await,
    }
}

fn init_tracing(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::try_new(VERBOSE_FILTER)?
    } else {
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("warn"))?
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();

    Ok(())
}

/// Host / connect / quit loop; a failed attempt returns here
///
/// Ctrl+C at a prompt leaves the menu like `q` does.
async fn menu(config: &ChatConfig, input: &mut StdinLines) -> Result<()> {
    let local_ip = match local_ip_address::local_ip() {
        Ok(ip) => ip.to_string(),
        Err(e) => {
            warn!("Could not determine local IP: {}", e);
            "unknown".to_string()
        }
    };

    loop {
        console::print_banner(&local_ip);
        let choice = input.prompt("Choose action: (h)ost, (c)onnect, (q)uit: ");
        let Some(line) = commands::until_interrupted(choice).await.transpose()?.flatten() else {
            break;
        };

        let attempt = match MenuChoice::parse(&line) {
            Some(MenuChoice::Host) => commands::host(config, input).await,
            Some(MenuChoice::Connect) => {
                let address = input.prompt("Host IP: ");
                let Some(line) = commands::until_interrupted(address).await.transpose()?.flatten()
                else {
                    break;
                };
                match line.trim().parse::<IpAddr>() {
                    Ok(address) => commands::connect(address, config, input).await,
                    Err(_) => {
                        println!("Invalid IP address: {}", line.trim());
                        continue;
                    }
                }
            }
            Some(MenuChoice::Quit) => break,
            None => {
                println!("Invalid choice. Enter 'h', 'c' or 'q'.");
                continue;
            }
        };

        if let Err(e) = attempt {
            error!("{:#}", e);
            println!("Error: {:#}", e);
        }
    }

    println!("Goodbye!");
    Ok(())
}
