//! Error types for fleet-dns.

use thiserror::Error;

/// Errors produced while resolving a query.
///
/// Variants are `Clone` on purpose: a population result — including a failed one —
/// is observed by every waiter of the same in-flight cache entry, so transport
/// errors are carried as messages rather than as their (non-cloneable) sources.
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    /// The plain name-service lookup found no records for the name.
    ///
    /// This is the only condition the resolver recovers from (by falling back to
    /// an inventory query). "Inventory found nothing" is *not* an error; it is a
    /// successful empty answer set.
    #[error("name not found: {0}")]
    NameNotFound(String),

    /// Inventory backend or upstream transport failure. Never cached.
    #[error("backend error: {0}")]
    Backend(String),

    /// IO error talking to the upstream name service.
    #[error("i/o error: {0}")]
    Io(String),

    /// DNS protocol error (malformed message, invalid name).
    #[error("dns protocol error: {0}")]
    Proto(String),

    /// Invalid configuration: unsupported record type, unparseable filter, or a
    /// missing required option. Fatal at construction or first use; never retried
    /// and never surfaced to a DNS client as data.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<std::io::Error> for ResolveError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<hickory_proto::ProtoError> for ResolveError {
    fn from(err: hickory_proto::ProtoError) -> Self {
        Self::Proto(err.to_string())
    }
}

impl ResolveError {
    /// True for the recoverable not-found condition from the plain lookup.
    pub fn is_name_not_found(&self) -> bool {
        matches!(self, Self::NameNotFound(_))
    }
}
