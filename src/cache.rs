//! Query Cache
//!
//! Time-to-live cache shared by every consumer of a key. Besides plain
//! get/insert it offers:
//!
//! - `merge`: in-place update of a cached value, the only sanctioned way to
//!   mutate an entry (used by the pending-withdrawal sync)
//! - fetch tickets: `begin_fetch` hands out a ticket carrying the cache
//!   generation, the key's epoch and the current chain id; `complete_fetch`
//!   drops the result if any of them moved on while the fetch was in flight

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, trace};

use crate::staking::StakingNamespace;

// ============================================
// KEYS
// ============================================

/// Every key is scoped by namespace so pools never share entries
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub namespace: StakingNamespace,
    pub scope: CacheScope,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheScope {
    /// Pool-wide data
    Pool,
    /// Per-account data, address lower-cased
    Account(String),
}

impl CacheKey {
    pub fn pool(namespace: StakingNamespace) -> Self {
        Self {
            namespace,
            scope: CacheScope::Pool,
        }
    }

    pub fn account(namespace: StakingNamespace, address: &str) -> Self {
        Self {
            namespace,
            scope: CacheScope::Account(address.trim().to_lowercase()),
        }
    }
}

// ============================================
// ENTRIES
// ============================================

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    /// `None` for entries that only ever received merges
    fetched_at: Option<Instant>,
}

/// Proof that a fetch was started for a key under a given chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    pub chain_id: u64,
    pub generation: u64,
    pub epoch: u64,
}

struct Inner<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    epochs: HashMap<K, u64>,
    /// Bumped by `clear`; per-key epochs restart from zero after it
    generation: u64,
}

// ============================================
// TTL CACHE
// ============================================

pub struct TtlCache<K, V> {
    ttl: Duration,
    chain_id: Arc<AtomicU64>,
    inner: RwLock<Inner<K, V>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
    V: Clone + PartialEq,
{
    /// `chain_id` is shared with the owner so a chain switch invalidates
    /// in-flight fetches across every cache at once
    pub fn new(ttl: Duration, chain_id: Arc<AtomicU64>) -> Self {
        Self {
            ttl,
            chain_id,
            inner: RwLock::new(Inner {
                entries: HashMap::new(),
                epochs: HashMap::new(),
                generation: 0,
            }),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Value if present and younger than the TTL
    pub async fn get_fresh(&self, key: &K) -> Option<V> {
        let inner = self.inner.read().await;
        match inner.entries.get(key) {
            Some(CacheEntry {
                value,
                fetched_at: Some(at),
            }) if at.elapsed() <= self.ttl => {
                trace!("cache hit {:?}", key);
                Some(value.clone())
            }
            _ => None,
        }
    }

    /// Value regardless of age
    pub async fn get_any(&self, key: &K) -> Option<V> {
        let inner = self.inner.read().await;
        inner.entries.get(key).map(|e| e.value.clone())
    }

    pub async fn insert(&self, key: K, value: V) {
        let mut inner = self.inner.write().await;
        inner.entries.insert(
            key,
            CacheEntry {
                value,
                fetched_at: Some(Instant::now()),
            },
        );
    }

    /// Drop the entry; the next read refetches
    pub async fn invalidate(&self, key: &K) {
        let mut inner = self.inner.write().await;
        if inner.entries.remove(key).is_some() {
            debug!("invalidated {:?}", key);
        }
        // Results of fetches started before the invalidation are stale too
        *inner.epochs.entry(key.clone()).or_insert(0) += 1;
    }

    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        inner.entries.clear();
        inner.epochs.clear();
        inner.generation += 1;
        debug!("cache cleared (generation {})", inner.generation);
    }

    /// Update an entry in place, creating it from `V::default()` when absent.
    /// Returns whether the stored value changed. A merge never refreshes the
    /// entry's age, and an entry created by a merge is not fresh until a full
    /// fetch lands.
    pub async fn merge<F>(&self, key: K, update: F) -> bool
    where
        V: Default,
        F: FnOnce(&mut V),
    {
        let mut inner = self.inner.write().await;

        let (mut value, fetched_at) = match inner.entries.get(&key) {
            Some(entry) => (entry.value.clone(), entry.fetched_at),
            None => (V::default(), None),
        };
        update(&mut value);

        let changed = match inner.entries.get(&key) {
            Some(entry) => entry.value != value,
            None => true,
        };

        if changed {
            inner.entries.insert(key, CacheEntry { value, fetched_at });
        }

        changed
    }

    /// Start a fetch for `key`; any earlier ticket for it becomes stale
    pub async fn begin_fetch(&self, key: &K) -> FetchTicket {
        let mut inner = self.inner.write().await;
        let generation = inner.generation;
        let epoch = inner.epochs.entry(key.clone()).or_insert(0);
        *epoch += 1;

        FetchTicket {
            chain_id: self.chain_id.load(Ordering::SeqCst),
            generation,
            epoch: *epoch,
        }
    }

    /// Store a fetch result only if the ticket is still current. Returns
    /// whether the value was written.
    pub async fn complete_fetch(&self, key: K, ticket: FetchTicket, value: V) -> bool {
        let mut inner = self.inner.write().await;

        let current_epoch = inner.epochs.get(&key).copied().unwrap_or(0);
        let current_chain = self.chain_id.load(Ordering::SeqCst);

        if ticket.generation != inner.generation
            || ticket.epoch != current_epoch
            || ticket.chain_id != current_chain
        {
            debug!(
                "discarding stale fetch for {:?} (generation {} vs {}, epoch {} vs {}, chain {} vs {})",
                key,
                ticket.generation,
                inner.generation,
                ticket.epoch,
                current_epoch,
                ticket.chain_id,
                current_chain
            );
            return false;
        }

        inner.entries.insert(
            key,
            CacheEntry {
                value,
                fetched_at: Some(Instant::now()),
            },
        );
        true
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }
}

// ============================================
// TESTS
// ============================================
