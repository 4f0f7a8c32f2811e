//! fleet-dns binary entry point.

use clap::Parser;
use fleet_dns::{
    telemetry, Config, DnsServer, InventoryClient, ResolveError, StaticInventory, UdpNameService,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Caching DNS server that answers from cloud fleet inventory.
#[derive(Parser, Debug)]
#[command(name = "fleet-dns")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML).
    #[arg(short, long, default_value = "fleet-dns.toml")]
    config: PathBuf,
}

/// Build the inventory backend named by the configuration.
fn build_inventory(config: &Config) -> Result<Arc<dyn InventoryClient>, ResolveError> {
    match &config.inventory.seed_file {
        Some(path) => Ok(Arc::new(StaticInventory::from_file(path)?)),
        None => Err(ResolveError::Config(
            "no inventory backend configured: set [inventory] seed_file".to_string(),
        )),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load configuration
    let config: Config = config::Config::builder()
        .add_source(config::File::from(args.config.clone()))
        .add_source(
            config::Environment::with_prefix("FLEET_DNS")
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()?;

    // Initialize telemetry
    telemetry::init(&config.telemetry).map_err(|e| e as Box<dyn std::error::Error>)?;

    info!(
        config_file = %args.config.display(),
        listen_addr = %config.dns.listen_addr,
        upstream = %config.dns.upstream,
        "Starting fleet-dns"
    );

    let upstream = Arc::new(UdpNameService::new(
        config.dns.upstream,
        Duration::from_secs(config.dns.upstream_timeout_secs),
    ));
    let inventory = build_inventory(&config)?;

    // Setup graceful shutdown
    let shutdown = CancellationToken::new();
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
        }
        info!("Shutdown signal received");
        signal_shutdown.cancel();
    });

    // Run DNS server
    let server = DnsServer::new(config.dns, upstream, inventory);
    let result = server.run(shutdown).await;

    if let Err(e) = result {
        error!("DNS server error: {}", e);
        return Err(e.into());
    }

    info!("fleet-dns shutdown complete");
    Ok(())
}
