//! CLI command definitions for the `fns` binary.

pub mod invoke;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use fns_types::config::FnsConfig;
use secrecy::SecretString;

/// Serve durable step functions to an fns orchestrator.
#[derive(Parser)]
#[command(name = "fns", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to config.toml (defaults to ~/.fns/config.toml).
    #[arg(long, global = true, env = "FNS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Skip signature verification and mirror function logs to stderr.
    #[arg(long, global = true, env = "FNS_DEV")]
    pub dev: bool,

    /// Shared secret for verifying event signatures.
    #[arg(long, global = true, env = "FNS_SIGNING_KEY", hide_env_values = true)]
    pub signing_key: Option<String>,

    /// Emit logs as newline-delimited JSON.
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Export spans via OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP endpoint the orchestrator calls.
    Serve {
        /// Interface to bind (overrides [server].host).
        #[arg(long)]
        host: Option<String>,

        /// Port to bind (overrides [server].port).
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Print the function config document served on `GET /`.
    Functions,

    /// Run one event JSON file (or `-` for stdin) in dev mode and print the response.
    Invoke {
        /// Event file path.
        event: PathBuf,
    },

    /// Generate shell completions.
    Completions {
        /// Target shell.
        shell: Shell,
    },
}

/// Load the config file and apply command-line and environment overrides.
pub async fn load(cli: &Cli) -> FnsConfig {
    let path = cli
        .config
        .clone()
        .unwrap_or_else(fns_infra::config::default_config_path);
    let config = fns_infra::config::load_config(&path).await;
    apply_overrides(config, cli.dev, cli.signing_key.as_deref())
}

fn apply_overrides(mut config: FnsConfig, dev: bool, signing_key: Option<&str>) -> FnsConfig {
    if dev {
        config.dev = true;
    }
    if let Some(key) = signing_key.filter(|k| !k.is_empty()) {
        config.signing_key = Some(SecretString::from(key.to_string()));
    }
    config
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;
    use secrecy::ExposeSecret;

    use super::*;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_serve_flags_parse() {
        let cli = Cli::parse_from(["fns", "serve", "--port", "4000", "--dev"]);
        assert!(cli.dev);
        match cli.command {
            Commands::Serve { host, port } => {
                assert_eq!(host, None);
                assert_eq!(port, Some(4000));
            }
            _ => panic!("expected serve"),
        }
    }

    #[test]
    fn test_overrides_win_over_file() {
        let config = apply_overrides(FnsConfig::default(), true, Some("whsec_cli"));
        assert!(config.dev);
        assert_eq!(config.signing_key.unwrap().expose_secret(), "whsec_cli");
    }

    #[test]
    fn test_empty_key_override_is_ignored() {
        let config = apply_overrides(FnsConfig::default(), false, Some(""));
        assert!(!config.dev);
        assert!(config.signing_key.is_none());
    }
}
