//! # Observability
//!
//! Centralized tracing setup for the authbridge workspace.
//!
//! Crates in this workspace only ever call `tracing` macros. The binary calls
//! [`init`] or [`init_with_config`] once at startup, which installs:
//!
//! - an `EnvFilter` (`RUST_LOG` wins over the configured default level)
//! - a JSONL file layer (`~/.authbridge/logs/authbridge.jsonl` by default)
//! - an optional compact stderr layer for foreground use
//!
//! ## Usage
//!
//! ```rust,ignore
//! observability::init_with_config(observability::LogConfig {
//!     service_name: "authbridge".into(),
//!     default_level: "debug".into(),
//!     also_stderr: true,
//!     ..Default::default()
//! });
//! tracing::info!("ready");
//! ```

mod json_layer;
mod writer;

pub use json_layer::{JsonLayer, LogLine};
pub use writer::{default_log_path, LogFileWriter, WriterFactory};

use std::io;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service, written into every JSONL line.
    pub service_name: String,

    /// Default filter directive (e.g. "info", "auth_sync_engine=debug").
    /// Overridden by `RUST_LOG`.
    pub default_level: String,

    /// Custom JSONL file path. Defaults to [`default_log_path`].
    pub log_path: Option<PathBuf>,

    /// Write JSONL lines to a file at all.
    pub file_output: bool,

    /// Also emit compact human-readable lines to stderr.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            file_output: true,
            also_stderr: false,
        }
    }
}

/// Initialize with defaults for the given service name.
pub fn init(service_name: &str) {
    init_with_config(LogConfig {
        service_name: service_name.into(),
        ..Default::default()
    });
}

/// Initialize the global subscriber.
///
/// If the log file cannot be opened the file layer is skipped and stderr
/// output is forced on, so logging never takes the process down. Calling
/// this twice is a no-op.
pub fn init_with_config(config: LogConfig) {
    let log_path = if config.file_output {
        config.log_path.clone().or_else(default_log_path)
    } else {
        None
    };

    let (file_writer, open_error) = match log_path.as_deref().map(LogFileWriter::new) {
        Some(Ok(writer)) => (Some(writer), None),
        Some(Err(err)) => (None, Some(err)),
        None => (None, None),
    };

    let json_layer = file_writer.map(|writer| {
        JsonLayer::new(config.service_name.clone(), WriterFactory::new(writer))
            .with_filter(env_filter(&config.default_level))
    });

    let stderr_layer = (config.also_stderr || json_layer.is_none()).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .compact()
            .with_writer(io::stderr)
            .with_filter(env_filter(&config.default_level))
    });

    let installed = tracing_subscriber::registry()
        .with(json_layer)
        .with(stderr_layer)
        .try_init()
        .is_ok();

    if !installed {
        return;
    }

    match (log_path, open_error) {
        (Some(path), Some(err)) => tracing::warn!(
            log_path = %path.display(),
            error = %err,
            "log file unavailable, logging to stderr only"
        ),
        (Some(path), None) => tracing::debug!(
            service = %config.service_name,
            log_path = %path.display(),
            "observability initialized"
        ),
        _ => {}
    }
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

pub use tracing::{debug, error, info, instrument, trace, warn, Level};
