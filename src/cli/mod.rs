//! CLI argument parsing
//!
//! Defines command-line interface using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Declarative resource handles for Kuadrant end-to-end testing
#[derive(Parser, Debug)]
#[command(name = "kuadrant-harness")]
#[command(version = "0.1.0")]
#[command(about = "Manage Gateway API resources the way the test suite does")]
#[command(long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Settings file (defaults to the standard locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the GatewayClass gateways are created with
    GatewayClass,

    /// Manage gateways
    Gateway(GatewayArgs),

    /// Manage configuration
    Config(ConfigArgs),

    /// Show environment variable help
    Env,
}

/// Arguments for gateway command
#[derive(Parser, Debug)]
pub struct GatewayArgs {
    #[command(subcommand)]
    pub action: GatewayAction,
}

#[derive(Subcommand, Debug)]
pub enum GatewayAction {
    /// Create a gateway
    Create {
        /// Gateway name
        name: String,

        /// Listener hostname, may start with `*.`
        #[arg(long, default_value = "*.example.com")]
        hostname: String,

        /// Terminate TLS with this secret instead of listening on plain HTTP
        #[arg(long)]
        tls_secret: Option<String>,

        /// Labels as key=value
        #[arg(short, long, value_parser = parse_label)]
        label: Vec<(String, String)>,

        /// Wait until the gateway is programmed
        #[arg(short, long)]
        wait: bool,
    },

    /// Delete a gateway and the resources created for it
    Delete {
        /// Gateway name
        name: String,
    },

    /// Wait until a gateway is programmed
    Wait {
        /// Gateway name
        name: String,

        /// Timeout in seconds (defaults to settings)
        #[arg(short, long)]
        timeout: Option<u64>,
    },

    /// Show gateway conditions, addresses and listeners
    Status {
        /// Gateway name
        name: String,
    },

    /// Show the certificate a gateway serves for a hostname
    Tls {
        /// Gateway name
        name: String,

        /// Hostname to resolve
        hostname: String,
    },
}

/// Arguments for config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show effective settings
    Show {
        /// Output format (yaml, json)
        #[arg(short, long, default_value = "yaml")]
        format: String,

        /// Show environment overrides instead
        #[arg(short, long)]
        env: bool,
    },

    /// Write an example settings file
    Init {
        /// Output path
        #[arg(short, long, default_value = crate::config::file::DEFAULT_CONFIG_PATH)]
        output: String,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

fn parse_label(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .filter(|(key, _)| !key.is_empty())
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .ok_or_else(|| format!("invalid label '{s}', expected key=value"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_create_args() {
        let args = Args::parse_from([
            "kuadrant-harness",
            "gateway",
            "create",
            "my-gw",
            "--hostname",
            "*.apps.example.com",
            "--tls-secret",
            "my-gw-tls",
            "-l",
            "app=test",
            "--wait",
        ]);
        match args.command {
            Command::Gateway(GatewayArgs {
                action:
                    GatewayAction::Create {
                        name,
                        hostname,
                        tls_secret,
                        label,
                        wait,
                    },
            }) => {
                assert_eq!(name, "my-gw");
                assert_eq!(hostname, "*.apps.example.com");
                assert_eq!(tls_secret.as_deref(), Some("my-gw-tls"));
                assert_eq!(label, vec![("app".to_string(), "test".to_string())]);
                assert!(wait);
            }
            other => panic!("Expected gateway create, got {other:?}"),
        }
    }

    #[test]
    fn test_global_flags() {
        let args = Args::parse_from([
            "kuadrant-harness",
            "gateway-class",
            "--verbose",
            "--config",
            "/tmp/settings.yaml",
        ]);
        assert!(matches!(args.command, Command::GatewayClass));
        assert!(args.verbose);
        assert_eq!(args.config, Some(PathBuf::from("/tmp/settings.yaml")));
    }

    #[test]
    fn test_invalid_label() {
        let result =
            Args::try_parse_from(["kuadrant-harness", "gateway", "create", "gw", "-l", "novalue"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_label() {
        assert_eq!(
            parse_label("tier=edge=1").unwrap(),
            ("tier".to_string(), "edge=1".to_string())
        );
        assert!(parse_label("=value").is_err());
    }
}
