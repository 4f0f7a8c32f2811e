//! Configuration types for fleet-dns.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// DNS server and resolution configuration.
    pub dns: DnsConfig,

    /// Inventory backend configuration.
    #[serde(default)]
    pub inventory: InventoryConfig,

    /// Telemetry configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// DNS server and resolution configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsConfig {
    /// Address for the DNS server to listen on (UDP and TCP).
    pub listen_addr: SocketAddr,

    /// Upstream DNS server for plain lookups, tried before inventory.
    pub upstream: SocketAddr,

    /// Per-transaction timeout for upstream lookups, in seconds.
    #[serde(default = "default_upstream_timeout_secs")]
    pub upstream_timeout_secs: u64,

    /// TTL in seconds for cached answers and the records built from inventory.
    #[serde(default = "default_ttl")]
    pub ttl: u32,

    /// Repopulate cache entries at expiry instead of discarding them.
    #[serde(default)]
    pub autorefresh: bool,

    /// Attribute matched against the query name on forward (A) lookups.
    /// `tag:<name>` selects a tag, a bare name selects a property.
    #[serde(default = "default_forward")]
    pub forward: String,

    /// Attribute matched against the derived address on reverse (PTR) lookups,
    /// and read back as the A record value on forward lookups.
    #[serde(default = "default_reverse")]
    pub reverse: String,

    /// Extra attributes emitted as `"<attr> = <value>"` TXT records in the
    /// additional section alongside each answer.
    #[serde(default)]
    pub extra: Vec<String>,
}

/// Inventory backend configuration.
///
/// The AWS credential options are recognized and handed to backend
/// constructors; the bundled static backend only needs `seed_file`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InventoryConfig {
    /// AWS region for a cloud-backed inventory.
    #[serde(default)]
    pub aws_region: Option<String>,

    /// AWS access key id.
    #[serde(default)]
    pub aws_access_key_id: Option<String>,

    /// AWS secret access key.
    #[serde(default)]
    pub aws_secret_access_key: Option<String>,

    /// TOML seed file for the bundled static inventory backend.
    #[serde(default)]
    pub seed_file: Option<PathBuf>,
}

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level filter (e.g., "info", "fleet_dns=debug,warn").
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Prometheus metrics exporter address.
    #[serde(default)]
    pub prometheus_addr: Option<SocketAddr>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            prometheus_addr: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_upstream_timeout_secs() -> u64 {
    5
}

fn default_ttl() -> u32 {
    3600
}

// The forward and reverse filters default independently. (An earlier revision
// of this server overwrote the forward filter when the reverse option was
// absent.)
fn default_forward() -> String {
    "tag:Name".to_string()
}

fn default_reverse() -> String {
    "private_ip_address".to_string()
}
