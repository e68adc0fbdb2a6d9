//! Logging initialization.
//!
//! Thin wrapper over the observability crate so the binary has one call to
//! make at startup.

use observability::LogConfig;
use std::path::PathBuf;

/// Initialize logging for the `authbridge` service.
///
/// JSONL goes to `log_path` (or the observability default); compact lines
/// also go to stderr. `RUST_LOG` overrides `level`.
pub fn init_logging(level: &str, log_path: Option<PathBuf>) {
    observability::init_with_config(LogConfig {
        service_name: "authbridge".into(),
        default_level: level.into(),
        log_path,
        also_stderr: true,
        ..Default::default()
    });
}
