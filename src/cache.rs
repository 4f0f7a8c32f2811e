//! A generic TTL-keyed cache populated by an async callback.
//!
//! The cache knows nothing about DNS or inventory semantics. On a miss it runs
//! the configured [`Populator`] for the key, stores the result for the TTL the
//! populator chose, and resolves every concurrent waiter with the single
//! outcome. Entries are never mutated in place: expiry removes them, and a
//! refresh creates a new entry through a fresh population.
//!
//! Per-key lifecycle: `ABSENT -> PENDING -> PRESENT -> ABSENT`, with
//! `PRESENT -> PENDING` only via the autorefresh transition at expiry.
//!
//! Unlike the design this replaces, concurrent misses for the same key share a
//! single in-flight population instead of each issuing their own backend query.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

/// The outcome of a successful population: the value plus how long to keep it.
#[derive(Debug, Clone)]
pub struct CacheFill<V> {
    /// The value to cache and hand to waiters.
    pub value: V,
    /// How long the entry stays live.
    pub ttl: Duration,
}

/// The population callback invoked on a cache miss.
///
/// The callback must never fail for "found nothing" — an empty-but-successful
/// value is the contract for a negative result, distinguishing it from a
/// transport failure (which is relayed to callers and never cached).
#[async_trait::async_trait]
pub trait Populator: Send + Sync + 'static {
    /// Cache key type.
    type Key: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static;
    /// Cached value type. Cloned out to each waiter.
    type Value: Clone + Send + Sync + 'static;
    /// Population error type. Cloned out to each waiter.
    type Error: Clone + fmt::Display + Send + Sync + 'static;

    /// Produce the value (and its TTL) for `key`.
    async fn populate(&self, key: &Self::Key) -> Result<CacheFill<Self::Value>, Self::Error>;
}

/// Error returned by [`TtlCache::insert`]: entries are created exclusively by
/// the population path, so direct writes are a programming-contract violation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("direct cache writes are not supported; entries are created by the population callback")]
pub struct UnsupportedWrite;

enum Slot<V, E> {
    /// A live entry. The generation stamp ties it to its expiry timer so a
    /// stale timer cannot remove a newer entry for the same key.
    Ready { value: V, generation: u64 },
    /// A population in flight; waiters observe the single resolution here.
    Pending(watch::Receiver<Option<Result<V, E>>>),
}

struct CacheInner<P: Populator> {
    slots: Mutex<HashMap<P::Key, Slot<P::Value, P::Error>>>,
    populator: P,
    autorefresh: bool,
    generation: AtomicU64,
}

/// TTL-keyed cache fronting an async population callback.
///
/// Cheap to clone; clones share the same underlying map.
pub struct TtlCache<P: Populator> {
    inner: Arc<CacheInner<P>>,
}

impl<P: Populator> Clone for TtlCache<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: Populator> TtlCache<P> {
    /// Create a cache around `populator`.
    ///
    /// With `autorefresh` set, an expiring entry triggers exactly one
    /// fire-and-forget repopulation instead of being merely discarded.
    pub fn new(populator: P, autorefresh: bool) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                slots: Mutex::new(HashMap::new()),
                populator,
                autorefresh,
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Get the value for `key`, populating on miss.
    ///
    /// A live entry resolves immediately. A pending population is shared: this
    /// call waits for it and observes the same outcome, success or failure.
    /// Population failures are relayed unchanged and cache nothing.
    pub async fn get(&self, key: &P::Key) -> Result<P::Value, P::Error> {
        self.inner.lookup_or_populate(key).await
    }

    /// Direct writes bypass the population path and always fail.
    pub fn insert(&self, _key: P::Key, _value: P::Value) -> Result<(), UnsupportedWrite> {
        Err(UnsupportedWrite)
    }

    /// Number of live (non-pending) entries.
    pub fn len(&self) -> usize {
        self.inner
            .slots
            .lock()
            .values()
            .filter(|slot| matches!(slot, Slot::Ready { .. }))
            .count()
    }

    /// True when no live entry exists.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a live entry exists for `key` right now.
    pub fn contains(&self, key: &P::Key) -> bool {
        matches!(self.inner.slots.lock().get(key), Some(Slot::Ready { .. }))
    }
}

/// What a `get` decided to do while the lock was held.
enum Action<V, E> {
    Wait(watch::Receiver<Option<Result<V, E>>>),
    Claim(watch::Sender<Option<Result<V, E>>>),
}

impl<P: Populator> CacheInner<P> {
    async fn lookup_or_populate(self: &Arc<Self>, key: &P::Key) -> Result<P::Value, P::Error> {
        loop {
            // Decide under the lock, act after releasing it. The lock is never
            // held across an await.
            let action = {
                let mut slots = self.slots.lock();
                match slots.get(key) {
                    Some(Slot::Ready { value, .. }) => {
                        debug!(key = ?key, "cache hit");
                        crate::metrics::record_cache_hit();
                        return Ok(value.clone());
                    }
                    Some(Slot::Pending(rx)) => {
                        debug!(key = ?key, "cache miss, population already in flight");
                        crate::metrics::record_cache_wait();
                        Action::Wait(rx.clone())
                    }
                    None => {
                        debug!(key = ?key, "cache miss");
                        crate::metrics::record_cache_miss();
                        let (tx, rx) = watch::channel(None);
                        slots.insert(key.clone(), Slot::Pending(rx));
                        Action::Claim(tx)
                    }
                }
            };

            match action {
                Action::Wait(mut rx) => {
                    loop {
                        if let Some(outcome) = rx.borrow().clone() {
                            return outcome;
                        }
                        if rx.changed().await.is_err() {
                            // The populating task went away without settling
                            // (aborted or panicked). Its dead slot would pin
                            // the key in PENDING forever; clear it so the
                            // retry can re-claim.
                            warn!(key = ?key, "pending population vanished, reclaiming");
                            let mut slots = self.slots.lock();
                            if let Some(Slot::Pending(stale)) = slots.get(key) {
                                if stale.same_channel(&rx) {
                                    slots.remove(key);
                                }
                            }
                            break;
                        }
                    }
                }
                Action::Claim(tx) => {
                    let outcome = match self.populator.populate(key).await {
                        Ok(fill) => {
                            let value = fill.value;
                            let generation = self.generation.fetch_add(1, Ordering::Relaxed);
                            self.slots.lock().insert(
                                key.clone(),
                                Slot::Ready {
                                    value: value.clone(),
                                    generation,
                                },
                            );
                            self.arm_expiry(key.clone(), generation, fill.ttl);
                            Ok(value)
                        }
                        Err(err) => {
                            // Leave the key ABSENT so the next caller retries.
                            self.slots.lock().remove(key);
                            Err(err)
                        }
                    };

                    // Resolve everyone who piled onto this population. A send
                    // error only means there were no other waiters.
                    let _ = tx.send(Some(outcome.clone()));
                    return outcome;
                }
            }
        }
    }

    /// Arm the one-shot expiry timer for a freshly stored entry.
    ///
    /// Entry creation and timer arming are atomic from the caller's
    /// perspective: no observer sees a PRESENT entry without an eventually
    /// firing expiry. The timer holds only a weak handle so a dropped cache
    /// tears down cleanly.
    fn arm_expiry(self: &Arc<Self>, key: P::Key, generation: u64, ttl: Duration) {
        let weak: Weak<CacheInner<P>> = Arc::downgrade(self);
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;

            let Some(inner) = weak.upgrade() else {
                return;
            };

            let expired = {
                let mut slots = inner.slots.lock();
                match slots.get(&key) {
                    Some(Slot::Ready { generation: g, .. }) if *g == generation => {
                        slots.remove(&key);
                        true
                    }
                    // Superseded by a newer entry or already gone.
                    _ => false,
                }
            };

            if !expired {
                return;
            }

            debug!(key = ?key, "cache entry expired");
            crate::metrics::record_cache_expiry();

            if inner.autorefresh {
                // Fire-and-forget repopulation. No one is waiting at expiry
                // time by construction; if a fresh get raced us it claimed the
                // pending slot first and this call simply joins it.
                debug!(key = ?key, "autorefreshing expired entry");
                if let Err(err) = inner.lookup_or_populate(&key).await {
                    warn!(key = ?key, %err, "autorefresh population failed");
                }
            }
        });
    }
}
