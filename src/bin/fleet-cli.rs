use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::json;

use fleet_transport::config::load_config;
use fleet_transport::observability::{init_logging, init_metrics};
use fleet_transport::{Gateway, Request, ServiceId};

#[derive(Parser)]
#[command(name = "fleet-cli")]
#[command(about = "Inspect and exercise a fleet transport configuration", long_about = None)]
struct Cli {
    /// Client configuration file (TOML)
    #[arg(short, long, default_value = "fleet.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Report whether a service has a usable configuration
    Check { service: String },
    /// List a service's candidates and their health
    Candidates { service: String },
    /// Issue a GET through the gateway and print the response
    Get { service: String, path: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    if let Err(e) = init_logging(&config.observability) {
        eprintln!("Logging already initialised: {}", e);
    }
    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let gateway = Gateway::builder(config).build();

    match cli.command {
        Commands::Check { service } => {
            let valid = gateway.has_valid_configuration(&ServiceId::new(&service));
            println!("{}: {}", service, if valid { "valid" } else { "missing" });
            if !valid {
                std::process::exit(1);
            }
        }
        Commands::Candidates { service } => {
            let candidates: Vec<_> = gateway
                .candidates(&ServiceId::new(&service))
                .iter()
                .map(|c| {
                    json!({
                        "address": c.to_string(),
                        "healthy": c.is_healthy(),
                        "active_requests": c.active_requests(),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&json!({ "service": service, "candidates": candidates }))?);
        }
        Commands::Get { service, path } => {
            let limit = gateway.config().transport.max_buffered_body_bytes;
            let response = gateway.execute(Request::get(service, path), None).await?;
            println!("{} {}", response.status().as_u16(), response.reason());
            for (name, value) in response.headers().iter() {
                println!("{}: {}", name, value);
            }
            println!();
            let body = response.into_bytes(limit).await?;
            println!("{}", String::from_utf8_lossy(&body));
        }
    }

    Ok(())
}
