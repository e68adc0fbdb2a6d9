//! authbridge - token exchange server and client tooling.

mod commands;
mod output;

use authbridge_config_and_utils::{init_logging, Config, Paths};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

/// authbridge - bridge an IdP session to a DataBackend session.
#[derive(Parser)]
#[command(name = "authbridge")]
#[command(about = "Token exchange server and client for IdP to DataBackend session sync")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text", global = true)]
    format: output::OutputFormat,

    /// Log level (trace, debug, info, warn, error); defaults to the config value
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Base directory for config and logs (default: ~/.authbridge)
    #[arg(long, global = true, env = "AUTHBRIDGE_HOME")]
    base_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the token exchange endpoint
    Serve {
        /// Override the configured bind address
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Exchange an IdP session for a DataBackend token
    RequestToken {
        /// Token exchange endpoint URL (default: from config)
        #[arg(short, long)]
        endpoint: Option<String>,
        /// IdP access token, sent as `Authorization: Bearer`
        #[arg(long, conflicts_with = "cookie")]
        bearer: Option<String>,
        /// Raw `Cookie` header value carrying the IdP session
        #[arg(long)]
        cookie: Option<String>,
    },

    /// Show the effective configuration
    Config {
        /// Fail if the configuration is invalid
        #[arg(long)]
        validate: bool,
    },
}

fn load(base_dir: Option<PathBuf>) -> anyhow::Result<(Paths, Config)> {
    let paths = match base_dir {
        Some(dir) => Paths::with_base_dir(dir),
        None => Paths::new()?,
    };
    let config = Config::load(&paths)?;
    Ok((paths, config))
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let (paths, config) = match load(cli.base_dir) {
        Ok(loaded) => loaded,
        Err(e) => {
            output::print_error(&e.to_string(), &cli.format);
            std::process::exit(1);
        }
    };

    let level = cli.log_level.as_deref().unwrap_or(&config.log_level);
    init_logging(level, Some(paths.log_file()));
    debug!(config_file = %paths.config_file().display(), "Configuration loaded");

    let result = match cli.command {
        Commands::Serve { bind } => commands::serve_endpoint(&config, bind.as_deref()).await,
        Commands::RequestToken {
            endpoint,
            bearer,
            cookie,
        } => commands::request_token(&config, endpoint.as_deref(), bearer, cookie, &cli.format).await,
        Commands::Config { validate } => commands::show_config(&config, validate, &cli.format),
    };

    if let Err(e) = result {
        output::print_error(&format!("{:#}", e), &cli.format);
        std::process::exit(1);
    }
}
