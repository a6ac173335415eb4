//! outlookbridge - protocol handler entry point
//!
//! Launched by the OS with an `outlookbridge://` URL as an argument, or by
//! hand with `--dev` and `OUTLOOKBRIDGE_URL` set. An application shell that
//! receives open-url events instead embeds [`Lifecycle`] and feeds them
//! through `Lifecycle::event_sender`.

use clap::Parser;
use outlookbridge::{BridgeConfig, Collaborators, Lifecycle, Platform, RunOutcome};
use std::path::PathBuf;
use std::process;

/// Open reviewable Outlook drafts from outlookbridge:// links
#[derive(Parser, Debug)]
#[command(name = "outlookbridge")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: ~/.config/outlookbridge/config.yaml)
    #[arg(short, long, env = "OUTLOOKBRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Development mode: skip registration and read the link from OUTLOOKBRIDGE_URL
    #[arg(long)]
    dev: bool,

    /// Launch arguments; the first outlookbridge:// URL among them is opened
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    if let Err(e) = outlookbridge::logging::init() {
        eprintln!("Failed to initialize logging: {}", e);
    }
    outlookbridge::logging::install_panic_hook();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!(kind = e.kind(), "Fatal: {}", e);
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> outlookbridge::Result<()> {
    let mut config = match cli.config {
        Some(ref path) => BridgeConfig::load(path)?,
        None => BridgeConfig::load_default()?,
    };
    if cli.dev {
        config.dev_mode = true;
    }

    let platform = Platform::current();
    tracing::debug!(platform = %platform, "Detected platform");

    let collaborators = Collaborators::native(platform, &config);
    let mut lifecycle = Lifecycle::new(config, collaborators)?;

    // Whole argv, as the OS passed it; the forwarding target scans it the same way
    let argv: Vec<String> = std::iter::once(std::env::args().next().unwrap_or_default())
        .chain(cli.args)
        .collect();

    match lifecycle.run(argv).await? {
        RunOutcome::Forwarded => tracing::debug!("Handed off to running instance"),
        RunOutcome::Served { handled } => tracing::debug!(handled, "Primary instance finished"),
    }
    Ok(())
}
