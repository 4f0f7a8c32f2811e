//! Query resolution against the plain name service with inventory fallback.
//!
//! The resolver owns one [`TtlCache`] keyed by `(name, class, type)` and the
//! population callback the cache runs on a miss. Population first asks the
//! plain name service; on a not-found it substitutes an inventory query:
//!
//! ```text
//! lookup issued
//!   -> plain-lookup result received
//!        -> success: done
//!        -> NameNotFound:
//!             A   -> inventory filtered by forward attribute = name
//!             PTR -> inventory filtered by reverse attribute = derived IP
//!             other -> unsupported-type configuration error
//!             -> inventory result received -> done
//!        -> any other failure: propagated unchanged
//! ```
//!
//! The blocking inventory call runs under `spawn_blocking`, never on the event
//! path.

use async_trait::async_trait;
use hickory_proto::rr::{DNSClass, RecordType};
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::answer::{build_answer_set, AnswerSet};
use crate::cache::{CacheFill, Populator, TtlCache};
use crate::config::DnsConfig;
use crate::error::ResolveError;
use crate::inventory::{AttributeRef, InventoryClient};
use crate::metrics::{self, FallbackKind};

/// Reverse-zone suffix for IPv4 PTR names.
const IN_ADDR_ARPA: &str = ".in-addr.arpa";
/// Reverse-zone suffix for IPv6 PTR names.
const IP6_ARPA: &str = ".ip6.arpa";

/// A DNS query tuple, normalized for use as a cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    /// Query name, lowercased, without the trailing root dot.
    pub name: String,
    /// Query class (almost always IN).
    pub class: DNSClass,
    /// Query type.
    pub rtype: RecordType,
}

impl QueryKey {
    /// Normalize a query tuple into a key.
    pub fn new(name: &str, class: DNSClass, rtype: RecordType) -> Self {
        Self {
            name: name.trim_end_matches('.').to_ascii_lowercase(),
            class,
            rtype,
        }
    }
}

/// The plain name-service lookup contract.
///
/// Implementations fail with [`ResolveError::NameNotFound`] when no record
/// exists for the name, and with any other variant for transport failures —
/// the resolver's inventory fallback keys on that distinction.
#[async_trait]
pub trait NameService: Send + Sync + 'static {
    /// Look up `(name, class, rtype)` against the ordinary name service.
    async fn lookup(
        &self,
        name: &str,
        class: DNSClass,
        rtype: RecordType,
    ) -> Result<AnswerSet, ResolveError>;
}

/// Lookup options derived from [`DnsConfig`] once at construction.
#[derive(Debug, Clone)]
struct LookupOpts {
    forward: AttributeRef,
    reverse: AttributeRef,
    extra: Vec<AttributeRef>,
    ttl: u32,
}

impl LookupOpts {
    fn from_config(config: &DnsConfig) -> Self {
        Self {
            forward: AttributeRef::parse(&config.forward),
            reverse: AttributeRef::parse(&config.reverse),
            extra: config.extra.iter().map(|s| AttributeRef::parse(s)).collect(),
            ttl: config.ttl,
        }
    }
}

/// Strip and reverse a reverse-zone name back into an address string.
///
/// `5.0.0.10.in-addr.arpa` becomes `10.0.0.5`; `ip6.arpa` nibble names become
/// the canonical IPv6 text form. `None` for names outside either reverse zone
/// or with labels that do not assemble into an address.
pub(crate) fn reverse_zone_address(name: &str) -> Option<String> {
    let name = name.trim_end_matches('.');

    if let Some(prefix) = name.strip_suffix(IN_ADDR_ARPA) {
        let mut octets: Vec<&str> = prefix.split('.').collect();
        octets.reverse();
        let candidate = octets.join(".");
        return candidate.parse::<Ipv4Addr>().ok().map(|ip| ip.to_string());
    }

    if let Some(prefix) = name.strip_suffix(IP6_ARPA) {
        let mut nibbles: Vec<&str> = prefix.split('.').collect();
        if nibbles.len() != 32 {
            return None;
        }
        nibbles.reverse();
        let groups: Vec<String> = nibbles.chunks(4).map(|chunk| chunk.concat()).collect();
        let candidate = groups.join(":");
        return candidate.parse::<Ipv6Addr>().ok().map(|ip| ip.to_string());
    }

    None
}

/// The cache population callback: plain lookup first, inventory fallback on
/// not-found.
struct LookupPopulator {
    upstream: Arc<dyn NameService>,
    inventory: Arc<dyn InventoryClient>,
    opts: LookupOpts,
}

impl LookupPopulator {
    fn fill(&self, value: AnswerSet) -> CacheFill<AnswerSet> {
        CacheFill {
            value,
            ttl: Duration::from_secs(u64::from(self.opts.ttl)),
        }
    }

    /// Run the blocking inventory query off the event path.
    async fn list_instances(
        &self,
        filter: AttributeRef,
        value: String,
    ) -> Result<Vec<crate::inventory::Instance>, ResolveError> {
        let client = Arc::clone(&self.inventory);
        let timer = metrics::Timer::start();
        let result = tokio::task::spawn_blocking(move || client.list_instances(&filter, &value))
            .await
            .map_err(|e| ResolveError::Backend(format!("inventory task failed: {e}")))?;
        metrics::record_inventory_call(
            result.as_ref().map(Vec::len).unwrap_or(0),
            result.is_ok(),
            timer.elapsed(),
        );
        result
    }

    /// The inventory-backed substitute for a failed plain lookup.
    async fn inventory_fallback(&self, key: &QueryKey) -> Result<AnswerSet, ResolveError> {
        match key.rtype {
            RecordType::A => {
                debug!(name = %key.name, "forward inventory lookup");
                metrics::record_fallback(FallbackKind::Forward);
                let instances = self
                    .list_instances(self.opts.forward.clone(), key.name.clone())
                    .await?;
                build_answer_set(
                    &instances,
                    &key.name,
                    &self.opts.reverse,
                    RecordType::A,
                    self.opts.ttl,
                    &self.opts.extra,
                )
            }
            RecordType::PTR => {
                let Some(address) = reverse_zone_address(&key.name) else {
                    // Not a reverse-zone name; nothing in inventory can match,
                    // and the empty result is cached like any other negative.
                    warn!(name = %key.name, "PTR query outside a reverse zone");
                    return Ok(AnswerSet::empty());
                };
                debug!(name = %key.name, %address, "reverse inventory lookup");
                metrics::record_fallback(FallbackKind::Reverse);
                let instances = self
                    .list_instances(self.opts.reverse.clone(), address)
                    .await?;
                build_answer_set(
                    &instances,
                    &key.name,
                    &self.opts.forward,
                    RecordType::PTR,
                    self.opts.ttl,
                    &self.opts.extra,
                )
            }
            other => Err(ResolveError::Config(format!(
                "query type {other} is not supported by the inventory fallback"
            ))),
        }
    }
}

#[async_trait]
impl Populator for LookupPopulator {
    type Key = QueryKey;
    type Value = AnswerSet;
    type Error = ResolveError;

    async fn populate(&self, key: &QueryKey) -> Result<CacheFill<AnswerSet>, ResolveError> {
        match self.upstream.lookup(&key.name, key.class, key.rtype).await {
            Ok(answers) => Ok(self.fill(answers)),
            Err(err) if err.is_name_not_found() => {
                debug!(name = %key.name, rtype = %key.rtype, "plain lookup found nothing, trying inventory");
                let answers = self.inventory_fallback(key).await?;
                Ok(self.fill(answers))
            }
            // Fallback is strictly scoped to the not-found condition.
            Err(err) => Err(err),
        }
    }
}

/// Resolves DNS query tuples against fleet inventory, through the TTL cache.
#[derive(Clone)]
pub struct InventoryResolver {
    cache: TtlCache<LookupPopulator>,
}

impl InventoryResolver {
    /// Build a resolver from configuration and its two collaborators.
    pub fn new(
        config: &DnsConfig,
        upstream: Arc<dyn NameService>,
        inventory: Arc<dyn InventoryClient>,
    ) -> Self {
        let populator = LookupPopulator {
            upstream,
            inventory,
            opts: LookupOpts::from_config(config),
        };
        Self {
            cache: TtlCache::new(populator, config.autorefresh),
        }
    }

    /// Resolve one query tuple. The sole entry point for the protocol layer.
    ///
    /// Delegates entirely to the cache; timeouts belong to the caller.
    pub async fn resolve(
        &self,
        name: &str,
        class: DNSClass,
        rtype: RecordType,
    ) -> Result<AnswerSet, ResolveError> {
        self.cache.get(&QueryKey::new(name, class, rtype)).await
    }

    /// Number of live cache entries, for metrics and health reporting.
    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }
}
