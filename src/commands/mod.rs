//! Command handlers for fngate
//!
//! Each submodule backs one CLI subcommand.

use crate::config::Config;
use crate::error::{GatewayError, Result};

/// `fngate serve`
pub mod serve {
    use super::*;
    use crate::http::{router, AppState};
    use crate::metrics::init_metrics_exporter;

    /// Bind the configured address and serve until Ctrl-C
    ///
    /// # Arguments
    ///
    /// * `config` - Validated configuration (consumed)
    ///
    /// # Errors
    ///
    /// Returns error if the functions client cannot be built or the address
    /// cannot be bound
    pub async fn run_server(config: Config) -> Result<()> {
        let metrics_listen = config
            .metrics
            .listen
            .as_deref()
            .and_then(|addr| addr.parse().ok());
        init_metrics_exporter(metrics_listen);

        let state = AppState::from_config(&config)?;
        let app = router(state);

        let listener = tokio::net::TcpListener::bind(&config.server.bind)
            .await
            .map_err(|e| {
                GatewayError::Config(format!("Failed to bind {}: {}", config.server.bind, e))
            })?;

        tracing::info!(
            bind = %config.server.bind,
            endpoint = %config.server.endpoint_path,
            timeout_ms = config.transport.request_timeout_ms,
            session_ttl_s = config.sessions.ttl_seconds,
            "Gateway listening"
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Gateway stopped");
        Ok(())
    }

    async fn shutdown_signal() {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
        tracing::info!("Shutdown signal received");
    }
}

/// `fngate pkce`
pub mod pkce {
    use super::*;
    use crate::auth::pkce::{from_verifier, generate};

    /// Render a verifier/challenge pair, generated unless `verifier` is given
    pub fn render(verifier: Option<&str>, json: bool) -> Result<String> {
        let pair = match verifier {
            Some(v) => from_verifier(v)?,
            None => generate(),
        };

        if json {
            return Ok(serde_json::to_string_pretty(&pair)?);
        }
        Ok(format!(
            "code_verifier:         {}\ncode_challenge:        {}\ncode_challenge_method: {}",
            pair.verifier, pair.challenge, pair.method
        ))
    }

    pub fn print_pkce(verifier: Option<&str>, json: bool) -> Result<()> {
        println!("{}", render(verifier, json)?);
        Ok(())
    }

}

/// `fngate config`
pub mod show_config {
    use super::*;

    /// Effective configuration as YAML. Secrets are never serialized.
    pub fn render(config: &Config) -> Result<String> {
        Ok(serde_yaml::to_string(config)?)
    }

    pub fn print_config(config: &Config) -> Result<()> {
        print!("{}", render(config)?);
        Ok(())
    }

}
