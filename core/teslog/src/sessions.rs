//! `teslog sessions`: inspect or clear the durable session store.

use std::path::PathBuf;

use clap::{ArgGroup, Args};
use tracing::info;

use crate::config::TeslogConfig;
use crate::db::Db;

#[derive(Args, Debug, Default)]
#[command(group(ArgGroup::new("action").required(true).args(["latest", "list", "erase"])))]
pub struct SessionsArgs {
    /// SQLite store to use instead of the configured one
    #[arg(long, value_name = "PATH")]
    pub store: Option<PathBuf>,

    /// Restrict to one vehicle id
    #[arg(long, value_name = "ID")]
    pub vehicle: Option<String>,

    /// Print the most recent session as JSON
    #[arg(long)]
    pub latest: bool,

    /// Print the N most recent sessions as a JSON array
    #[arg(long, value_name = "N")]
    pub list: Option<usize>,

    /// Delete stored sessions
    #[arg(long)]
    pub erase: bool,
}

pub fn run(args: &SessionsArgs, config: &TeslogConfig) -> Result<(), String> {
    let path = match &args.store {
        Some(path) => path.clone(),
        None => config.store_path()?,
    };
    let db = Db::new(path)?;
    let vehicle = args.vehicle.as_deref();

    if args.erase {
        let removed = db.erase_sessions(vehicle)?;
        info!(removed, path = %db.path().display(), "Erased stored sessions");
        return Ok(());
    }

    if let Some(limit) = args.list {
        let sessions = db.list_sessions(vehicle, limit)?;
        println!("{}", to_json(&sessions)?);
        return Ok(());
    }

    let latest = match vehicle {
        Some(vehicle) => db.latest_session(vehicle)?,
        None => db.list_sessions(None, 1)?.into_iter().next(),
    };
    match latest {
        Some(session) => println!("{}", to_json(&session)?),
        None => info!(path = %db.path().display(), "No stored sessions"),
    }
    Ok(())
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|err| format!("Failed to encode sessions: {}", err))
}
