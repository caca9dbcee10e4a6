//! Log sinks
//!
//! The main stream goes to stdout. Events from the handshake agent go to
//! their own append-only file, so the operator can follow the credential
//! bootstrap separately from the provisioning run.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use anyhow::Context;
use tracing::Metadata;
use tracing_subscriber::filter::{LevelFilter, filter_fn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{Layer, fmt};

/// Target prefix of everything the handshake agent logs
pub const HANDSHAKE_TARGET: &str = "bastion_core::handshake";

/// Parse a `--log-level` value
pub fn parse_level(level: &str) -> anyhow::Result<LevelFilter> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(LevelFilter::TRACE),
        "debug" => Ok(LevelFilter::DEBUG),
        "info" => Ok(LevelFilter::INFO),
        "warn" => Ok(LevelFilter::WARN),
        "error" => Ok(LevelFilter::ERROR),
        _ => anyhow::bail!(
            "log level '{}' is not valid. Valid levels: trace, debug, info, warn, error",
            level
        ),
    }
}

fn is_handshake(metadata: &Metadata<'_>) -> bool {
    metadata.target().starts_with(HANDSHAKE_TARGET)
}

/// Install the global subscriber
///
/// If the handshake log cannot be opened, handshake events stay on stdout
/// and a warning says so.
pub fn init(level: LevelFilter, handshake_log: &Path) -> anyhow::Result<()> {
    let file = if let Some(parent) = handshake_log.parent() {
        std::fs::create_dir_all(parent).and_then(|_| open_append(handshake_log))
    } else {
        open_append(handshake_log)
    };

    let (file_layer, file_error) = match file {
        Ok(file) => (
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .with_filter(filter_fn(is_handshake)),
            ),
            None,
        ),
        Err(e) => (None, Some(e)),
    };

    let split = file_layer.is_some();
    let stdout_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_filter(filter_fn(move |metadata| !(split && is_handshake(metadata))));

    tracing_subscriber::registry()
        .with(level)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to set tracing subscriber")?;

    if let Some(e) = file_error {
        tracing::warn!(
            "Cannot open handshake log {} ({}); handshake events go to stdout",
            handshake_log.display(),
            e
        );
    }
    Ok(())
}

fn open_append(path: &Path) -> std::io::Result<std::fs::File> {
    OpenOptions::new().create(true).append(true).open(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_parse_case_insensitively() {
        assert_eq!(parse_level("INFO").unwrap(), LevelFilter::INFO);
        assert_eq!(parse_level("trace").unwrap(), LevelFilter::TRACE);
        assert!(parse_level("verbose").is_err());
    }
}
