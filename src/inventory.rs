//! Fleet inventory: instance projections and the backend query contract.
//!
//! An [`Instance`] is a read-only view of one inventory record with two attribute
//! namespaces: user-assigned tags and fixed instance properties. Attribute names
//! in configuration use the `tag:<name>` convention for tags and a bare name for
//! properties; both resolve uniformly to "missing" when absent.

use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use crate::error::ResolveError;

/// A typed reference to an instance attribute, parsed once at configuration time
/// from the `tag:`-prefix convention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeRef {
    /// A user-assigned tag, written `tag:<name>`.
    Tag(String),
    /// A fixed instance property, written as a bare name.
    Property(String),
}

impl AttributeRef {
    /// Parse an attribute reference from its configuration spelling.
    pub fn parse(spec: &str) -> Self {
        match spec.strip_prefix("tag:") {
            Some(tag) => Self::Tag(tag.to_string()),
            None => Self::Property(spec.to_string()),
        }
    }
}

impl fmt::Display for AttributeRef {
    /// Reproduces the original configuration spelling, which is also the filter
    /// syntax the inventory backend expects.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tag(name) => write!(f, "tag:{name}"),
            Self::Property(name) => write!(f, "{name}"),
        }
    }
}

/// Read-only projection of one inventory record.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Instance {
    /// User-assigned key/value tags.
    #[serde(default)]
    pub tags: HashMap<String, String>,
    /// Fixed instance fields (e.g. `private_ip_address`, `instance_type`).
    #[serde(default)]
    pub properties: HashMap<String, String>,
}

impl Instance {
    /// Create an empty instance. Mostly useful with the `with_*` builders.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: add a tag.
    pub fn with_tag(mut self, name: &str, value: &str) -> Self {
        self.tags.insert(name.to_string(), value.to_string());
        self
    }

    /// Builder: add a property.
    pub fn with_property(mut self, name: &str, value: &str) -> Self {
        self.properties.insert(name.to_string(), value.to_string());
        self
    }

    /// Look up a tag by name.
    pub fn tag(&self, name: &str) -> Option<&str> {
        self.tags.get(name).map(String::as_str)
    }

    /// Look up a property by name.
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }

    /// Resolve an attribute reference against this instance.
    pub fn attribute(&self, attr: &AttributeRef) -> Option<&str> {
        match attr {
            AttributeRef::Tag(name) => self.tag(name),
            AttributeRef::Property(name) => self.property(name),
        }
    }
}

/// The inventory query contract.
///
/// `list_instances` is a blocking call (cloud inventory APIs are slow); callers
/// must run it off the event path, e.g. under `tokio::task::spawn_blocking`. The
/// handle is read-only shared state and safe to call concurrently.
///
/// "Found nothing" is `Ok(vec![])` by contract; `Err` is reserved for transport
/// and backend failures.
pub trait InventoryClient: Send + Sync + 'static {
    /// List instances whose `filter` attribute equals `value`.
    fn list_instances(
        &self,
        filter: &AttributeRef,
        value: &str,
    ) -> Result<Vec<Instance>, ResolveError>;
}

/// Inventory seeded from a TOML file.
///
/// The cloud inventory API client proper lives outside this crate; this backend
/// implements the same contract from a static seed so the server runs end to end
/// (and so tests have a hermetic backend).
#[derive(Debug, Clone)]
pub struct StaticInventory {
    instances: Vec<Instance>,
}

#[derive(Debug, Deserialize)]
struct SeedFile {
    #[serde(default, rename = "instance")]
    instances: Vec<Instance>,
}

impl StaticInventory {
    /// Build an inventory from a list of instances.
    pub fn new(instances: Vec<Instance>) -> Self {
        Self { instances }
    }

    /// Load an inventory from a TOML seed file of `[[instance]]` entries.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ResolveError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ResolveError::Config(format!("cannot read seed file {}: {e}", path.display()))
        })?;
        Self::from_toml(&raw)
    }

    /// Parse an inventory from TOML text.
    pub fn from_toml(raw: &str) -> Result<Self, ResolveError> {
        let seed: SeedFile = toml::from_str(raw)
            .map_err(|e| ResolveError::Config(format!("invalid seed file: {e}")))?;
        Ok(Self::new(seed.instances))
    }

    /// Number of seeded instances.
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    /// True when no instances are seeded.
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

impl InventoryClient for StaticInventory {
    fn list_instances(
        &self,
        filter: &AttributeRef,
        value: &str,
    ) -> Result<Vec<Instance>, ResolveError> {
        Ok(self
            .instances
            .iter()
            .filter(|instance| instance.attribute(filter) == Some(value))
            .cloned()
            .collect())
    }
}
