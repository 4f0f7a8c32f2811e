//! DNS server setup and lifecycle management.

use hickory_server::authority::{AuthorityObject, Catalog};
use hickory_server::ServerFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, UdpSocket};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::authority::FleetAuthority;
use crate::config::DnsConfig;
use crate::error::ResolveError;
use crate::inventory::InventoryClient;
use crate::metrics;
use crate::resolver::{InventoryResolver, NameService};

/// Interval for emitting cache metrics.
const METRICS_INTERVAL: Duration = Duration::from_secs(10);

/// TCP request timeout handed to hickory.
const TCP_TIMEOUT: Duration = Duration::from_secs(30);

/// Periodically emit cache metrics.
async fn metrics_loop(resolver: InventoryResolver, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(METRICS_INTERVAL);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let entries = resolver.cached_entries();
                metrics::record_cache_size(entries);
                debug!(entries, "emitted cache metrics");
            }
            _ = shutdown.cancelled() => {
                debug!("metrics loop shutting down");
                return;
            }
        }
    }
}

/// DNS server answering from upstream DNS with fleet-inventory fallback.
pub struct DnsServer {
    config: DnsConfig,
    resolver: InventoryResolver,
}

impl DnsServer {
    /// Create a new DNS server over the given upstream and inventory backend.
    pub fn new(
        config: DnsConfig,
        upstream: Arc<dyn NameService>,
        inventory: Arc<dyn InventoryClient>,
    ) -> Self {
        let resolver = InventoryResolver::new(&config, upstream, inventory);
        Self { config, resolver }
    }

    /// Get a handle to the resolver serving this server.
    pub fn resolver(&self) -> &InventoryResolver {
        &self.resolver
    }

    /// Run the DNS server until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), ResolveError> {
        info!(
            listen_addr = %self.config.listen_addr,
            upstream = %self.config.upstream,
            ttl = self.config.ttl,
            autorefresh = self.config.autorefresh,
            "Starting fleet-dns server"
        );

        // Create authority and catalog
        let authority = FleetAuthority::new(self.resolver.clone());

        let mut catalog = Catalog::new();
        let authority: Arc<dyn AuthorityObject> = Arc::new(authority);
        catalog.upsert(authority.origin().clone(), vec![authority]);

        // Create server
        let mut server = ServerFuture::new(catalog);

        // Bind UDP
        let udp_socket = UdpSocket::bind(self.config.listen_addr).await?;
        info!(addr = %self.config.listen_addr, "DNS UDP listening");
        server.register_socket(udp_socket);

        // Bind TCP
        let tcp_listener = TcpListener::bind(self.config.listen_addr).await?;
        info!(addr = %self.config.listen_addr, "DNS TCP listening");
        server.register_listener(tcp_listener, TCP_TIMEOUT);

        info!("DNS server ready to serve queries");

        // Start metrics loop
        let metrics_resolver = self.resolver.clone();
        let metrics_shutdown = shutdown.clone();
        let metrics_handle = tokio::spawn(async move {
            metrics_loop(metrics_resolver, metrics_shutdown).await;
        });

        metrics::record_cache_size(self.resolver.cached_entries());

        // Run server until shutdown
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("DNS server shutdown requested");
            }
            result = server.block_until_done() => {
                if let Err(e) = result {
                    error!("DNS server error: {}", e);
                }
            }
        }

        // Wait for metrics loop to stop
        let _ = metrics_handle.await;

        info!("DNS server stopped");
        Ok(())
    }
}
