//! Shared state for one optimistic-sync session.
//!
//! A [`SyncContext`] is built once at startup and passed around as an `Arc`.
//! It owns the ledger and the deferred-event queue and holds the cache, remote
//! store and clock it was given. Nothing here is global, so any number of
//! contexts can run side by side.

use crate::config::Config;
use crate::deferred::DeferredEvents;
use crate::mutation::CollectionMutations;
use crate::realtime::RealtimeReconciler;
use crate::remote::RemoteStore;
use optimist_engine::{
    views, Cache, Clock, Collection, Ledger, MemoryCache, Operation, Record, SystemClock,
    Timestamp,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Application state shared by mutation hooks, the reconciler and the sweeper.
pub struct SyncContext {
    ledger: Arc<Ledger>,
    cache: Arc<dyn Cache>,
    remote: Arc<dyn RemoteStore>,
    clock: Arc<dyn Clock>,
    config: Config,
    deferred: DeferredEvents,
    conflicts: AtomicU64,
}

impl std::fmt::Debug for SyncContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncContext")
            .field("ledger", &self.ledger)
            .field("config", &self.config)
            .field("deferred", &self.deferred.len())
            .field("conflicts", &self.conflict_count())
            .finish_non_exhaustive()
    }
}

/// Builder for [`SyncContext`].
pub struct SyncContextBuilder {
    remote: Arc<dyn RemoteStore>,
    cache: Option<Arc<dyn Cache>>,
    clock: Option<Arc<dyn Clock>>,
    ledger: Option<Arc<Ledger>>,
    config: Config,
}

impl SyncContextBuilder {
    /// Use `cache` instead of a fresh [`MemoryCache`].
    pub fn cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Use `clock` instead of the system clock.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Use an existing ledger, e.g. one a UI already observes.
    pub fn ledger(mut self, ledger: Arc<Ledger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Arc<SyncContext> {
        Arc::new(SyncContext {
            ledger: self.ledger.unwrap_or_else(Ledger::new_shared),
            cache: self.cache.unwrap_or_else(|| Arc::new(MemoryCache::new())),
            remote: self.remote,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock::new())),
            config: self.config,
            deferred: DeferredEvents::new(),
            conflicts: AtomicU64::new(0),
        })
    }
}

impl SyncContext {
    /// Start building a context around `remote`.
    pub fn builder(remote: Arc<dyn RemoteStore>) -> SyncContextBuilder {
        SyncContextBuilder {
            remote,
            cache: None,
            clock: None,
            ledger: None,
            config: Config::default(),
        }
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    pub fn cache(&self) -> &dyn Cache {
        self.cache.as_ref()
    }

    pub fn remote(&self) -> &dyn RemoteStore {
        self.remote.as_ref()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn deferred(&self) -> &DeferredEvents {
        &self.deferred
    }

    /// Current time according to the context's clock.
    pub fn now(&self) -> Timestamp {
        self.clock.now_millis()
    }

    /// Conflicts detected so far, by mutation hooks and the reconciler.
    pub fn conflict_count(&self) -> u64 {
        self.conflicts.load(Ordering::Relaxed)
    }

    /// Whether a pending mutation already targets `record_id`.
    pub fn has_conflict(&self, collection: &str, record_id: Option<&str>) -> bool {
        self.ledger.has_conflict(collection, record_id)
    }

    /// Mutation hooks for collection `C`.
    pub fn collection<C: Collection>(self: &Arc<Self>) -> CollectionMutations<C> {
        CollectionMutations::new(Arc::clone(self))
    }

    /// A reconciler applying push events to this context's cache.
    pub fn reconciler(self: &Arc<Self>) -> RealtimeReconciler {
        RealtimeReconciler::new(Arc::clone(self))
    }

    /// Prune operations older than the configured TTL.
    ///
    /// Swept operations no longer block their records, so deferred events for
    /// those records are replayed. Returns the pruned operations.
    pub fn sweep(&self) -> Vec<Operation> {
        let removed = self.ledger.sweep(self.now(), self.config.operation_ttl);
        if removed.is_empty() {
            return removed;
        }

        tracing::debug!(pruned = removed.len(), "Swept expired operations");
        for op in &removed {
            if let Some(record_id) = op.record_id.as_deref() {
                self.replay_deferred(&op.collection, record_id, None);
            }
        }
        removed
    }

    pub(crate) fn note_conflict(&self, collection: &str, record_id: &str, source: &'static str) {
        let total = self.conflicts.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::warn!(
            collection = %collection,
            record_id = %record_id,
            source,
            total,
            "Conflict with pending mutation"
        );
    }

    /// Apply the events deferred for one record, if nothing pending still
    /// targets it.
    ///
    /// With `committed` set, create and update events older than the
    /// committed record are skipped. Returns the number of events applied.
    pub(crate) fn replay_deferred(
        &self,
        collection: &str,
        record_id: &str,
        committed: Option<&Record>,
    ) -> usize {
        if self.has_conflict(collection, Some(record_id)) {
            return 0;
        }

        let mut applied = 0;
        for event in self.deferred.take(collection, record_id) {
            if let Some(committed) = committed {
                if !event.record.is_not_older_than(committed) {
                    tracing::debug!(
                        collection = %collection,
                        record_id = %record_id,
                        action = ?event.action,
                        "Skipping deferred event older than committed record"
                    );
                    continue;
                }
            }
            views::apply_push_event(self.cache(), collection, &event);
            applied += 1;
        }

        if applied > 0 {
            tracing::debug!(
                collection = %collection,
                record_id = %record_id,
                applied,
                "Replayed deferred push events"
            );
        }
        applied
    }

    /// Drop the events deferred for one record. Returns how many were dropped.
    pub(crate) fn discard_deferred(&self, collection: &str, record_id: &str) -> usize {
        let dropped = self.deferred.take(collection, record_id).len();
        if dropped > 0 {
            tracing::debug!(
                collection = %collection,
                record_id = %record_id,
                dropped,
                "Discarded deferred push events for deleted record"
            );
        }
        dropped
    }
}
