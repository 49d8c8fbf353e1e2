//! Command-line interface definition for fngate
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands to run the gateway, inspect its configuration and
//! generate PKCE pairs.

use clap::{Parser, Subcommand};

/// fngate - JSON-RPC tool gateway for a remote functions platform
///
/// Serves `initialize`, `tools/list` and `tools/call` over HTTP with
/// resumable sessions and bounded per-request waits.
#[derive(Parser, Debug, Clone)]
#[command(name = "fngate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml", env = "FNGATE_CONFIG")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for fngate
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the HTTP gateway
    Serve {
        /// Override the listen address (e.g. 127.0.0.1:8787)
        #[arg(short, long)]
        bind: Option<String>,

        /// Override the per-request reply deadline in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Override the idle session time-to-live in seconds
        #[arg(long)]
        session_ttl: Option<u64>,
    },

    /// Print a PKCE S256 verifier/challenge pair
    Pkce {
        /// Derive the challenge for this verifier instead of generating one
        #[arg(long)]
        verifier: Option<String>,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration as YAML
    Config,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// CLI-level overrides carried by `serve`, if that is the command.
    pub fn serve_overrides(&self) -> (Option<&str>, Option<u64>, Option<u64>) {
        match &self.command {
            Commands::Serve {
                bind,
                timeout_ms,
                session_ttl,
            } => (bind.as_deref(), *timeout_ms, *session_ttl),
            _ => (None, None, None),
        }
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("config/config.yaml".to_string()),
            verbose: false,
            json_logs: false,
            command: Commands::Serve {
                bind: None,
                timeout_ms: None,
                session_ttl: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_default() {
        let cli = Cli::default();
        assert_eq!(cli.config, Some("config/config.yaml".to_string()));
        assert!(!cli.verbose);
        assert!(matches!(cli.command, Commands::Serve { .. }));
    }

    #[test]
    fn test_cli_parse_serve_with_overrides() {
        let cli = Cli::try_parse_from([
            "fngate",
            "serve",
            "--bind",
            "127.0.0.1:9999",
            "--timeout-ms",
            "5000",
            "--session-ttl",
            "60",
        ])
        .unwrap();
        assert_eq!(
            cli.serve_overrides(),
            (Some("127.0.0.1:9999"), Some(5000), Some(60))
        );
    }

    #[test]
    fn test_cli_parse_pkce_with_verifier() {
        let cli = Cli::try_parse_from(["fngate", "pkce", "--verifier", "abc", "--json"]).unwrap();
        if let Commands::Pkce { verifier, json } = cli.command {
            assert_eq!(verifier, Some("abc".to_string()));
            assert!(json);
        } else {
            panic!("Expected Pkce command");
        }
    }

    #[test]
    fn test_cli_parse_config_command() {
        let cli = Cli::try_parse_from(["fngate", "--config", "custom.yaml", "config"]).unwrap();
        assert_eq!(cli.config, Some("custom.yaml".to_string()));
        assert!(matches!(cli.command, Commands::Config));
        assert_eq!(cli.serve_overrides(), (None, None, None));
    }

    #[test]
    fn test_cli_json_logs_is_global() {
        let cli = Cli::try_parse_from(["fngate", "serve", "--json-logs"]).unwrap();
        assert!(cli.json_logs);
    }

    #[test]
    fn test_cli_requires_command() {
        assert!(Cli::try_parse_from(["fngate"]).is_err());
    }
}
