//! reelcast - find the best torrent source for a title and stream it
//!
//! # Usage
//!
//! ```bash
//! reelcast sources tt0133093
//! reelcast play 1396 --type show -s 1 -e 1 --player external
//! reelcast devices --json
//! ```

mod cli;
mod commands;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use reelcast::config::Config;

use crate::cli::{Cli, Command, ExitCode, Output};

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.quiet);
    run_cli(cli).await.into()
}

/// Logs go to stderr so stdout stays machine-readable
fn init_tracing(quiet: bool) {
    let default = if quiet { "reelcast=warn" } else { "reelcast=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Run CLI command and return exit code
async fn run_cli(cli: Cli) -> ExitCode {
    let output = Output::new(&cli);
    let config = match &cli.config {
        Some(path) => match Config::load_from(path) {
            Ok(config) => config,
            Err(e) => {
                return output.error(
                    format!("Failed to load config {}: {}", path.display(), e),
                    ExitCode::InvalidArgs,
                )
            }
        },
        None => Config::load(),
    };
    let device = cli.device.as_deref();

    match cli.command {
        Command::Sources(cmd) => commands::sources_cmd(cmd, &config, &output).await,
        Command::Play(cmd) => commands::play_cmd(cmd, device, &config, &output).await,
        Command::Subtitles(cmd) => commands::subtitles_cmd(cmd, &config, &output).await,
        Command::Devices(cmd) => commands::devices_cmd(cmd, &config, &output).await,
    }
}
