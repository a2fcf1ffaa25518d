//! Tracing setup. Logs go to a file because the terminal is the render target.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};

pub fn init(log_file: &Path) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .with_context(|| format!("open log file {}", log_file.display()))?;
    let filter = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = fmt::layer().with_ansi(false).with_writer(Mutex::new(file));
    let _ = tracing_subscriber::registry().with(filter).with(fmt_layer).try_init();

    tracing::info!(target: "telemetry", log_file = %log_file.display(), "telemetry initialized");
    Ok(())
}
