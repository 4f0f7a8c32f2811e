//! Fleet DNS - a caching DNS server that answers from cloud fleet inventory.
//!
//! This crate provides a DNS server that first tries an ordinary lookup
//! against an upstream server and, when that comes back empty, answers from a
//! fleet inventory backend instead: forward (A) queries match an instance
//! attribute such as the `Name` tag, reverse (PTR) queries match an address
//! attribute such as the private IP. Every answer is cached with a TTL.
//!
//! ## Features
//!
//! - Upstream-first resolution with inventory fallback on name errors
//! - A and PTR answers built from configurable instance attributes
//! - Extra attributes surfaced as TXT records in the additional section
//! - TTL cache with single-flight population and optional autorefresh
//! - Graceful shutdown support
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                          fleet-dns                             │
//! │                                                                │
//! │  UDP/TCP :53 ──▶ ┌──────────────────┐                          │
//! │                  │  Hickory DNS     │                          │
//! │                  │  Server          │                          │
//! │                  └────────┬─────────┘                          │
//! │                           ▼                                    │
//! │                  ┌──────────────────┐    ┌──────────────────┐  │
//! │                  │  TTL Cache       │───▶│ Upstream DNS     │  │
//! │                  │  (per query)     │    │ (plain lookup)   │  │
//! │                  └────────┬─────────┘    └──────────────────┘  │
//! │                           │ not found                          │
//! │                           ▼                                    │
//! │                  ┌──────────────────┐                          │
//! │                  │ Fleet inventory  │                          │
//! │                  │ (tags/properties)│                          │
//! │                  └──────────────────┘                          │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## DNS Resolution
//!
//! ```text
//! web-1  A?
//!   → upstream lookup → NXDOMAIN
//!   → list instances where tag Name = "web-1"
//!   → A records from each instance's private_ip_address
//!
//! 5.0.0.10.in-addr.arpa  PTR?
//!   → upstream lookup → NXDOMAIN
//!   → list instances where private_ip_address = "10.0.0.5"
//!   → PTR records from each instance's Name tag
//! ```
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use fleet_dns::{DnsConfig, DnsServer, StaticInventory, UdpNameService};
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = DnsConfig {
//!         listen_addr: "[::]:5353".parse().unwrap(),
//!         upstream: "10.0.0.2:53".parse().unwrap(),
//!         upstream_timeout_secs: 5,
//!         ttl: 300,
//!         autorefresh: false,
//!         forward: "tag:Name".to_string(),
//!         reverse: "private_ip_address".to_string(),
//!         extra: vec![],
//!     };
//!
//!     let upstream = Arc::new(UdpNameService::new(config.upstream, Duration::from_secs(5)));
//!     let inventory = Arc::new(StaticInventory::from_file("instances.toml").unwrap());
//!
//!     let shutdown = CancellationToken::new();
//!     let server = DnsServer::new(config, upstream, inventory);
//!     server.run(shutdown).await.unwrap();
//! }
//! ```

#![warn(missing_docs)]

pub mod answer;
pub mod authority;
pub mod cache;
pub mod config;
pub mod error;
pub mod inventory;
pub mod metrics;
pub mod resolver;
pub mod server;
pub mod telemetry;
pub mod upstream;

// Re-export main types
pub use answer::AnswerSet;
pub use cache::{CacheFill, Populator, TtlCache};
pub use config::{Config, DnsConfig, InventoryConfig, TelemetryConfig};
pub use error::ResolveError;
pub use inventory::{AttributeRef, Instance, InventoryClient, StaticInventory};
pub use resolver::{InventoryResolver, NameService, QueryKey};
pub use server::DnsServer;
pub use upstream::UdpNameService;
