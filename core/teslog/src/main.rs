//! teslog: turns a stream of vehicle telemetry snapshots into a log of
//! driving, charging, conditioning and parked sessions.
//!
//! ## Subcommands
//!
//! - `parse`: Read snapshot files, stdin or a followed file and print one
//!   report line per finished session
//! - `sessions`: Inspect or clear the SQLite session store

mod archive;
mod config;
mod db;
mod geocode;
mod input;
mod logging;
mod parse;
mod sessions;

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "teslog")]
#[command(about = "Session log builder for vehicle telemetry snapshots")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Also write logs to this file
    #[arg(long, value_name = "PATH", global = true)]
    log_file: Option<PathBuf>,

    /// Config file (default ~/.teslog/config.toml)
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build sessions from snapshot lines
    Parse(parse::ParseArgs),

    /// Inspect or clear stored sessions
    Sessions(sessions::SessionsArgs),
}

fn main() {
    let cli = Cli::parse();
    let logging_guard = match logging::init(cli.verbose, cli.log_file.as_deref()) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("teslog: {}", err);
            std::process::exit(1);
        }
    };

    let config = match config::load_config(cli.config.clone()) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(error = %err, "Ignoring config file, using defaults");
            config::TeslogConfig::default()
        }
    };

    let result = match &cli.command {
        Commands::Parse(args) => parse::run(args, &config),
        Commands::Sessions(args) => sessions::run(args, &config),
    };
    if let Err(err) = result {
        tracing::error!(error = %err, "teslog failed");
        drop(logging_guard);
        std::process::exit(1);
    }
}
