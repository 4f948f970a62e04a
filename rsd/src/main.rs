//! `rsd` -- the `ReadySetDone` command-line client.
//!
//! Sends task operations to `rsdd` (or edits the task files directly with
//! `--backend local`) and prints the refreshed list.
//!
//! ```bash
//! rsd add "water the plants" --pin
//! rsd done 1
//! rsd description 2 --set "## Steps"
//! rsd --metadata
//! ```

use clap::Parser;

use rsd::commands::Command;
use rsd::config::{CliArgs, ClientConfig};

#[tokio::main]
async fn main() {
    let cli = CliArgs::parse();

    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    init_logging(&config);

    let command = cli.command.unwrap_or(Command::List);
    let mut stdout = std::io::stdout().lock();
    if let Err(e) = rsd::app::execute(&config, &command, &mut stdout).await {
        tracing::error!(error = %e, "command failed");
        eprintln!("rsd: {e}");
        std::process::exit(1);
    }
}

/// Logs to stderr so stdout carries only rendered output.
///
/// `RUST_LOG` overrides the configured level.
fn init_logging(config: &ClientConfig) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_ansi(config.color)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
