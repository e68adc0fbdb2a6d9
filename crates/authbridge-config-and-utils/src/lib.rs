//! Configuration, paths, errors, and logging setup shared by authbridge crates.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    Config, RetrySettings, ServerConfig, BACKEND_ADMIN_TOKEN_ENV, DEFAULT_EXCHANGE_PATH,
    DEFAULT_LOG_LEVEL, DEFAULT_SETTLE_DELAY_MS,
};
pub use error::{CoreError, CoreResult};
pub use logging::init_logging;
pub use paths::Paths;
