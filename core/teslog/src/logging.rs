//! Logging setup: stderr always, plus an optional non-blocking log file.
//!
//! Reports go to stdout, so diagnostics must never share it.

use std::env;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const DEBUG_ENV: &str = "TESLOG_DEBUG_LOG";

/// Installs the global subscriber. The returned guard flushes the log file
/// on drop and must be held until the program exits.
pub fn init(verbosity: u8, log_file: Option<&Path>) -> Result<Option<WorkerGuard>, String> {
    let filter = filter_for(verbosity, debug_forced());

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|dir| !dir.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| format!("Log file path has no file name: {}", path.display()))?;
            fs_err::create_dir_all(dir)
                .map_err(|err| format!("Failed to create log directory: {}", err))?;
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .map_err(|err| format!("Failed to install logger: {}", err))?;

    Ok(guard)
}

fn debug_forced() -> bool {
    env::var(DEBUG_ENV)
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false)
}

/// `-v` flags win, then the debug env switch, then `RUST_LOG`, then `info`.
fn filter_for(verbosity: u8, debug_forced: bool) -> EnvFilter {
    match verbosity {
        0 if debug_forced => EnvFilter::new("debug"),
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    }
}
