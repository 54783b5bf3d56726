//! The query cache contract and an in-memory implementation.
//!
//! The cache is shared by three writers: mutation hooks, the realtime
//! reconciler, and ordinary fetches issued outside this crate. None of them
//! lock across writes; each one replaces whole values.

use crate::{QueryKey, Record};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// One page of a list view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResult {
    pub page: u32,
    pub per_page: u32,
    pub total_items: u64,
    pub items: Vec<Record>,
}

impl ListResult {
    /// A first page holding `items`, with `total_items` set to their count.
    pub fn from_items(items: Vec<Record>) -> Self {
        Self {
            page: crate::query_key::DEFAULT_PAGE,
            per_page: crate::query_key::DEFAULT_PER_PAGE,
            total_items: items.len() as u64,
            items,
        }
    }

    pub fn empty() -> Self {
        Self::from_items(Vec::new())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.items.iter().any(|r| r.id == id)
    }

    pub fn get(&self, id: &str) -> Option<&Record> {
        self.items.iter().find(|r| r.id == id)
    }

    pub fn ids(&self) -> Vec<&str> {
        self.items.iter().map(|r| r.id.as_str()).collect()
    }
}

/// A cached value: either a list view or a single record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "lowercase")]
pub enum CacheValue {
    List(ListResult),
    Record(Record),
}

impl CacheValue {
    pub fn as_list(&self) -> Option<&ListResult> {
        match self {
            CacheValue::List(list) => Some(list),
            CacheValue::Record(_) => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            CacheValue::Record(record) => Some(record),
            CacheValue::List(_) => None,
        }
    }
}

/// Capabilities consumed from the query cache.
///
/// `update` runs `updater` while the entry is held; updaters must not call
/// back into the cache.
pub trait Cache: Send + Sync {
    /// Point read.
    fn read(&self, key: &QueryKey) -> Option<CacheValue>;

    /// Full replace.
    fn write(&self, key: QueryKey, value: CacheValue);

    /// Read-modify-write. Returns false (and does nothing) if `key` is absent.
    fn update(&self, key: &QueryKey, updater: &mut dyn FnMut(&CacheValue) -> CacheValue) -> bool;

    /// Drop an entry, returning what was there.
    fn remove(&self, key: &QueryKey) -> Option<CacheValue>;

    /// Prevent a fetch already in flight for `key` from landing.
    fn cancel_outstanding_fetch(&self, key: &QueryKey);

    /// Mark every entry under `collection` as stale so it is refetched in the background.
    fn invalidate(&self, collection: &str);

    /// Every key under `collection`, in key order.
    fn keys(&self, collection: &str) -> Vec<QueryKey>;
}

/// Handle for a fetch started with [`MemoryCache::begin_fetch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    key: QueryKey,
    generation: u64,
}

impl FetchTicket {
    pub fn key(&self) -> &QueryKey {
        &self.key
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: CacheValue,
    stale: bool,
}

/// An in-memory [`Cache`].
///
/// Fetches are modelled with tickets: a ticket only lands if no newer fetch
/// started and no cancel happened for its key in the meantime.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<QueryKey, Entry>,
    fetches: DashMap<QueryKey, u64>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a fetch for `key`. Supersedes any fetch already outstanding.
    pub fn begin_fetch(&self, key: QueryKey) -> FetchTicket {
        let mut generation = self.fetches.entry(key.clone()).or_insert(0);
        *generation += 1;
        FetchTicket {
            generation: *generation,
            key,
        }
    }

    /// Land a fetch result. Returns false if the fetch was cancelled or superseded.
    pub fn complete_fetch(&self, ticket: FetchTicket, value: CacheValue) -> bool {
        let generation = ticket.generation;
        if self
            .fetches
            .remove_if(&ticket.key, |_, current| *current == generation)
            .is_none()
        {
            return false;
        }
        self.entries.insert(
            ticket.key,
            Entry {
                value,
                stale: false,
            },
        );
        true
    }

    /// Whether `key` has been invalidated since it was last written.
    pub fn is_stale(&self, key: &QueryKey) -> bool {
        self.entries.get(key).map(|e| e.stale).unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Cache for MemoryCache {
    fn read(&self, key: &QueryKey) -> Option<CacheValue> {
        self.entries.get(key).map(|e| e.value.clone())
    }

    fn write(&self, key: QueryKey, value: CacheValue) {
        self.entries.insert(
            key,
            Entry {
                value,
                stale: false,
            },
        );
    }

    fn update(&self, key: &QueryKey, updater: &mut dyn FnMut(&CacheValue) -> CacheValue) -> bool {
        match self.entries.get_mut(key) {
            Some(mut entry) => {
                let next = updater(&entry.value);
                entry.value = next;
                true
            }
            None => false,
        }
    }

    fn remove(&self, key: &QueryKey) -> Option<CacheValue> {
        self.entries.remove(key).map(|(_, e)| e.value)
    }

    fn cancel_outstanding_fetch(&self, key: &QueryKey) {
        if let Some(mut generation) = self.fetches.get_mut(key) {
            *generation += 1;
        }
    }

    fn invalidate(&self, collection: &str) {
        for mut entry in self.entries.iter_mut() {
            if entry.key().matches_prefix(collection) {
                entry.stale = true;
            }
        }
    }

    fn keys(&self, collection: &str) -> Vec<QueryKey> {
        let mut keys: Vec<QueryKey> = self
            .entries
            .iter()
            .filter(|e| e.key().matches_prefix(collection))
            .map(|e| e.key().clone())
            .collect();
        keys.sort();
        keys
    }
}
