//! Command implementations.

use crate::output::{self, OutputFormat};
use anyhow::{Context, Result};
use auth_sync_engine::{RetryConfig, SyncConfig};
use authbridge_config_and_utils::{Config, RetrySettings};
use serde_json::json;
use std::time::Duration;
use token_exchange_client::{ExchangeCredentials, TokenExchangeClient};
use token_exchange_server::{router, serve, ExchangeState};
use tracing::info;
use url::Url;

/// Sync engine settings derived from the shared configuration.
pub fn sync_config(config: &Config) -> SyncConfig {
    SyncConfig {
        settle_delay: Duration::from_millis(config.settle_delay_ms),
        retry: config.retry.as_ref().map(retry_config),
    }
}

fn retry_config(settings: &RetrySettings) -> RetryConfig {
    RetryConfig {
        max_retries: settings.max_retries,
        initial_delay_ms: settings.initial_delay_ms,
        max_delay_ms: settings.max_delay_ms,
    }
}

/// Run the token exchange endpoint until Ctrl-C.
pub async fn serve_endpoint(config: &Config, bind: Option<&str>) -> Result<()> {
    config.validate()?;
    let state = ExchangeState::from_config(config)?;
    let app = router(state, &config.server.exchange_path)?;

    let addr = bind.unwrap_or(&config.server.bind_addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    info!(
        exchange_path = %config.server.exchange_path,
        idp_url = %config.server.idp_url,
        backend_url = %config.server.backend_url,
        "Starting token exchange server"
    );

    serve(listener, app, async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl-C, shutting down");
    })
    .await?;
    Ok(())
}

/// Call the token exchange endpoint once and print the result.
pub async fn request_token(
    config: &Config,
    endpoint: Option<&str>,
    bearer: Option<String>,
    cookie: Option<String>,
    format: &OutputFormat,
) -> Result<()> {
    let endpoint = match endpoint {
        Some(raw) => Url::parse(raw).with_context(|| format!("invalid endpoint {}", raw))?,
        None => config.token_endpoint_url()?,
    };
    let credentials = match (bearer, cookie) {
        (Some(token), _) => ExchangeCredentials::Bearer(token),
        (None, Some(cookie)) => ExchangeCredentials::Cookie(cookie),
        (None, None) => ExchangeCredentials::Ambient,
    };

    let client = TokenExchangeClient::new(
        endpoint,
        Duration::from_secs(config.request_timeout_secs),
    )?;

    match client.request_token(&credentials).await {
        Ok(token) => {
            let token = token.into_inner();
            output::print(&json!({"token": token}), &token, format);
            Ok(())
        }
        Err(e) => Err(anyhow::Error::new(e).context("token exchange failed")),
    }
}

/// Show the effective configuration. The admin token is never printed.
pub fn show_config(config: &Config, validate: bool, format: &OutputFormat) -> Result<()> {
    if validate {
        config.validate()?;
    }
    let sync = sync_config(config);

    match format {
        OutputFormat::Json => {
            let mut value = serde_json::to_value(config)?;
            value["admin_token_set"] = json!(config.backend_admin_token.is_some());
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        OutputFormat::Text => {
            println!("Client");
            output::print_row("Token endpoint", &config.token_endpoint_url);
            output::print_row("Request timeout", &format!("{}s", config.request_timeout_secs));
            output::print_row("Settle delay", &format!("{:?}", sync.settle_delay));
            let retry = match &sync.retry {
                Some(r) => format!(
                    "{} retries, {}-{}ms",
                    r.max_retries, r.initial_delay_ms, r.max_delay_ms
                ),
                None => "disabled".to_string(),
            };
            output::print_row("Retry", &retry);
            println!("Server");
            output::print_row("Bind address", &config.server.bind_addr);
            output::print_row("Exchange path", &config.server.exchange_path);
            output::print_row("IdP URL", &config.server.idp_url);
            output::print_row("IdP session cookie", &config.server.idp_session_cookie);
            output::print_row("DataBackend URL", &config.server.backend_url);
            output::print_row(
                "Admin token",
                if config.backend_admin_token.is_some() {
                    "set"
                } else {
                    "not set"
                },
            );
        }
    }
    Ok(())
}
