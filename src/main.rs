//! Kuadrant Harness - declarative resource handles for Gateway API testing
//!
//! Drives the same resource handles the end-to-end suite uses: gateways
//! with their GatewayClass, listeners, readiness and TLS certificates.
//!
//! ## Usage
//!
//! ```bash
//! # Which GatewayClass would a gateway get
//! kuadrant-harness gateway-class
//!
//! # Create a TLS gateway and wait for it
//! kuadrant-harness gateway create my-gw --hostname '*.apps.example.com' --tls-secret my-gw-tls --wait
//!
//! # Inspect it
//! kuadrant-harness gateway status my-gw
//! kuadrant-harness gateway tls my-gw api.apps.example.com
//!
//! # Write example settings
//! kuadrant-harness config init
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

mod cli;
mod config;
mod k8s;
mod utils;

use cli::Args;
use config::env::{print_env_help, EnvConfig};
use config::{file, Settings};
use k8s::{describe_conditions, GatewayClassResolver, GatewayHandle, ListenerSpec};
use utils::logger::{init_logger, level_from};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let env = EnvConfig::load();
    let verbose = args.verbose || env.verbose.unwrap_or(false);
    let level = level_from(verbose, env.log_level.as_deref()).map_err(anyhow::Error::msg)?;
    init_logger(level);

    match args.command {
        cli::Command::GatewayClass => {
            show_gateway_class(args.config.as_deref()).await?;
        }
        cli::Command::Gateway(gateway_args) => {
            manage_gateway(gateway_args, args.config.as_deref()).await?;
        }
        cli::Command::Config(config_args) => {
            manage_config(config_args, args.config.as_deref())?;
        }
        cli::Command::Env => {
            print_env_help();
        }
    }

    Ok(())
}

async fn show_gateway_class(config: Option<&Path>) -> Result<()> {
    let settings = Settings::resolve(config)?;
    let contexts = settings.contexts().await?;
    let resolver = GatewayClassResolver::new();

    let class = resolver.resolve(&contexts.cluster).await?;
    println!("{class}");
    for context in &contexts.additional_clusters {
        let class = resolver.resolve(context).await?;
        println!("{class} ({})", context.cluster_id());
    }
    Ok(())
}

async fn manage_gateway(args: cli::GatewayArgs, config: Option<&Path>) -> Result<()> {
    let settings = Settings::resolve(config)?;
    let contexts = settings.contexts().await?;
    let context = &contexts.cluster;

    let open = |gateway: GatewayHandle| settings.configure_gateway(gateway);

    match args.action {
        cli::GatewayAction::Create {
            name,
            hostname,
            tls_secret,
            label,
            wait,
        } => {
            let resolver = GatewayClassResolver::new();
            let labels: BTreeMap<String, String> = label.into_iter().collect();
            let mut gateway = open(
                GatewayHandle::create_instance(context, &resolver, &name, labels).await?,
            );

            let listener = match tls_secret {
                Some(secret) => ListenerSpec::https("api", hostname, secret),
                None => ListenerSpec::http("api", hostname),
            };
            gateway.handle_mut().document_mut().spec.listeners.push(listener);

            gateway.commit().await?;
            println!("✓ Gateway {} created", gateway.key());

            if wait {
                gateway.wait_for_ready(settings.ready_timeout()).await?;
                println!("✓ Gateway {} is programmed", gateway.key());
            }
        }

        cli::GatewayAction::Delete { name } => {
            let resolver = GatewayClassResolver::new();
            let gateway = GatewayHandle::locate(context, &resolver, &name).await?;
            gateway.delete(true).await?;
            println!("✓ Gateway {} deleted", gateway.key());
        }

        cli::GatewayAction::Wait { name, timeout } => {
            let timeout = timeout
                .map(Duration::from_secs)
                .unwrap_or_else(|| settings.ready_timeout());
            let mut gateway = open(GatewayHandle::fetch(context, &name).await?);

            info!("Waiting up to {:?} for {}", timeout, gateway.key());
            gateway.wait_for_ready(timeout).await?;
            println!("✓ Gateway {} is programmed", gateway.key());
        }

        cli::GatewayAction::Status { name } => {
            let mut gateway = GatewayHandle::fetch(context, &name).await?;
            let document = gateway.handle().document();

            println!("Gateway:     {}", gateway.key());
            println!("Class:       {}", document.spec.gateway_class_name);
            println!("Ready:       {}", gateway.is_ready());
            println!("Conditions:  {}", describe_conditions(document.conditions()));
            println!("Listeners:");
            for listener in &document.spec.listeners {
                println!(
                    "  {:12} {:6} {:5} {}",
                    listener.name,
                    listener.protocol,
                    listener.port,
                    listener.hostname.as_deref().unwrap_or("*")
                );
            }
            match gateway.external_ip().await? {
                Some(address) => println!("Address:     {address}"),
                None => println!("Address:     <pending>"),
            }
        }

        cli::GatewayAction::Tls { name, hostname } => {
            let gateway = GatewayHandle::fetch(context, &name).await?;
            match gateway.tls_cert(&hostname).await? {
                Some(certificate) => {
                    println!("{}", certificate.certificate);
                    if let Some(chain) = certificate.chain {
                        println!("{chain}");
                    }
                }
                None => {
                    anyhow::bail!("No TLS listener of {} serves {}", gateway.key(), hostname);
                }
            }
        }
    }

    Ok(())
}

fn manage_config(args: cli::ConfigArgs, config: Option<&Path>) -> Result<()> {
    match args.action {
        cli::ConfigAction::Init { output, force } => {
            let path = file::expand_path(&output);
            if path.exists() && !force {
                anyhow::bail!(
                    "Configuration file already exists: {}. Use --force to overwrite.",
                    path.display()
                );
            }

            file::example()
                .save(&path)
                .with_context(|| format!("Failed to write example settings to {output}"))?;
            println!("✓ Configuration file created: {}", path.display());
            println!("\nEdit the file to point it at your clusters.");
        }

        cli::ConfigAction::Show { format, env } => {
            if env {
                let env = EnvConfig::load();
                if env.has_any() {
                    env.print_summary();
                } else {
                    println!("No KUADRANT_HARNESS_* overrides are set");
                }
            } else {
                let mut settings = Settings::resolve(config)?;
                let clusters = std::iter::once(&mut settings.cluster)
                    .chain(&mut settings.control_plane.additional_clusters);
                for cluster in clusters.filter(|c| c.token.is_some()) {
                    cluster.token = Some("<redacted>".to_string());
                }
                let output = if format == "json" {
                    serde_json::to_string_pretty(&settings)?
                } else {
                    serde_yaml::to_string(&settings)?
                };
                println!("{output}");
            }
        }
    }

    Ok(())
}
