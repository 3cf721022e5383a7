//! Tracing subscriber setup.

use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

fn env_filter(verbose: bool) -> EnvFilter {
    let default = if verbose { "debug" } else { "info" };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Human-readable output for one-shot commands.
pub fn init_console(verbose: bool) {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(verbose))
        .with_target(false)
        .init();
}

/// JSON lines to stdout, appended to `log_file` as well.
pub fn init_json(verbose: bool, log_file: &Path) -> std::io::Result<()> {
    if let Some(parent) = log_file.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)?;

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(env_filter(verbose))
        .with_writer(std::io::stdout.and(Mutex::new(file)))
        .init();
    Ok(())
}
