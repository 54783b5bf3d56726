//! The operation ledger: the single source of truth for outstanding local work.
//!
//! The ledger is an explicitly constructed value (share it through an `Arc`),
//! never a global. All mutation of operations goes through its methods, and
//! every effective mutation is announced to registered listeners.
//!
//! Reads and sweeps never hold a lock across more than one map shard at a
//! time, and listener callbacks run with no ledger lock held, so a listener
//! may call back into the ledger.

use crate::conflict::conflicts_with;
use crate::operation::new_operation_id;
use crate::error::{Error, Result};
use crate::{Operation, OperationId, OperationStatus, Timestamp};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

/// Identifier handed out by [`Ledger::subscribe`].
pub type ListenerId = u64;

/// Listener callback type.
pub type LedgerListener = dyn Fn(&LedgerEvent) + Send + Sync;

/// A change to the ledger.
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerEvent {
    /// An operation was inserted, or replaced one with the same id
    Added { id: OperationId, replaced: bool },
    /// An operation's status changed
    StatusChanged {
        id: OperationId,
        status: OperationStatus,
    },
    /// An operation was removed
    Removed { id: OperationId },
    /// The TTL sweep pruned these operations
    Swept { ids: Vec<OperationId> },
}

#[derive(Debug, Clone)]
struct Slot {
    /// Insertion sequence, breaks ties between equal timestamps
    seq: u64,
    op: Operation,
}

/// Registry of outstanding optimistic operations.
#[derive(Default)]
pub struct Ledger {
    ops: DashMap<OperationId, Slot>,
    next_seq: AtomicU64,
    /// Serializes conflict-checked inserts
    reserve: Mutex<()>,
    listeners: RwLock<Vec<(ListenerId, Arc<LedgerListener>)>>,
    next_listener: AtomicU64,
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("operations", &self.ops.len())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl Ledger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty ledger wrapped in `Arc` for sharing.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// A fresh operation id that no held operation uses.
    pub fn generate_id(&self, now: Timestamp) -> OperationId {
        loop {
            let id = new_operation_id(now);
            if !self.ops.contains_key(&id) {
                return id;
            }
        }
    }

    /// Insert `op`, replacing any operation with the same id.
    pub fn add(&self, op: Operation) {
        let event = self.insert(op);
        self.emit(&event);
    }

    /// Insert `op` unless an unresolved operation already targets its record.
    ///
    /// The conflict check and the insert happen under one lock, so of two
    /// racing callers for the same record at most one succeeds. Operations
    /// without a record id (creates) always go in.
    pub fn add_exclusive(&self, op: Operation) -> Result<()> {
        let event = {
            let _reserved = self
                .reserve
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(record_id) = op.record_id.as_deref() {
                if self.has_conflict(&op.collection, Some(record_id)) {
                    return Err(Error::ConflictPending {
                        collection: op.collection.clone(),
                        record_id: record_id.to_string(),
                    });
                }
            }
            self.insert(op)
        };
        self.emit(&event);
        Ok(())
    }

    fn insert(&self, op: Operation) -> LedgerEvent {
        let id = op.id.clone();
        let replaced = match self.ops.entry(op.id.clone()) {
            Entry::Occupied(mut slot) => {
                slot.get_mut().op = op;
                true
            }
            Entry::Vacant(slot) => {
                let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
                slot.insert(Slot { seq, op });
                false
            }
        };
        LedgerEvent::Added { id, replaced }
    }

    /// Remove an operation. Removing an unknown id is a no-op.
    pub fn remove(&self, id: &str) -> Option<Operation> {
        let removed = self.ops.remove(id).map(|(_, slot)| slot.op);
        if removed.is_some() {
            self.emit(&LedgerEvent::Removed { id: id.to_string() });
        }
        removed
    }

    /// Get a copy of an operation.
    pub fn get(&self, id: &str) -> Option<Operation> {
        self.ops.get(id).map(|slot| slot.op.clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ops.contains_key(id)
    }

    /// Change an operation's status.
    ///
    /// No-op (returns false) if the id is absent or the transition is not
    /// `Pending -> Succeeded | Failed`.
    pub fn update_status(&self, id: &str, status: OperationStatus) -> bool {
        let changed = match self.ops.get_mut(id) {
            Some(mut slot) if slot.op.status.can_become(status) => {
                slot.op = slot.op.with_status(status);
                true
            }
            _ => false,
        };
        if changed {
            self.emit(&LedgerEvent::StatusChanged {
                id: id.to_string(),
                status,
            });
        }
        changed
    }

    /// Pending operations on `collection`, oldest first.
    pub fn pending_for(&self, collection: &str) -> Vec<Operation> {
        self.sorted(|op| op.is_pending() && op.collection == collection)
    }

    /// Every held operation, oldest first.
    pub fn all(&self) -> Vec<Operation> {
        self.sorted(|_| true)
    }

    /// Pending operations targeting one record, oldest first.
    pub fn pending_for_record(&self, collection: &str, record_id: &str) -> Vec<Operation> {
        self.sorted(|op| op.is_pending() && op.targets(collection, record_id))
    }

    /// Whether an unresolved mutation already targets `record_id`.
    ///
    /// See [`crate::conflict::has_conflict`] for the rule.
    pub fn has_conflict(&self, collection: &str, record_id: Option<&str>) -> bool {
        let Some(record_id) = record_id else {
            return false;
        };
        self.ops
            .iter()
            .any(|slot| conflicts_with(&slot.op, collection, record_id))
    }

    /// Remove every operation older than `ttl` at `now`, whatever its status.
    ///
    /// Returns the removed operations.
    pub fn sweep(&self, now: Timestamp, ttl: Duration) -> Vec<Operation> {
        let ttl = ttl.as_millis() as u64;
        let expired: Vec<OperationId> = self
            .ops
            .iter()
            .filter(|slot| slot.op.age(now) > ttl)
            .map(|slot| slot.key().clone())
            .collect();

        let mut removed = Vec::with_capacity(expired.len());
        for id in expired {
            // re-check: the entry may have been replaced since we looked
            if let Some((_, slot)) = self.ops.remove_if(&id, |_, slot| slot.op.age(now) > ttl) {
                removed.push(slot.op);
            }
        }

        if !removed.is_empty() {
            self.emit(&LedgerEvent::Swept {
                ids: removed.iter().map(|op| op.id.clone()).collect(),
            });
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.ops.iter().filter(|slot| slot.op.is_pending()).count()
    }

    /// Register a listener for ledger changes.
    pub fn subscribe(&self, listener: impl Fn(&LedgerEvent) + Send + Sync + 'static) -> ListenerId {
        let id = self.next_listener.fetch_add(1, Ordering::Relaxed);
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        listeners.push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: ListenerId) {
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        listeners.retain(|(lid, _)| *lid != id);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    fn sorted(&self, keep: impl Fn(&Operation) -> bool) -> Vec<Operation> {
        let mut slots: Vec<(u64, Operation)> = self
            .ops
            .iter()
            .filter(|slot| keep(&slot.op))
            .map(|slot| (slot.seq, slot.op.clone()))
            .collect();
        slots.sort_by(|(seq_a, a), (seq_b, b)| {
            a.created_at.cmp(&b.created_at).then(seq_a.cmp(seq_b))
        });
        slots.into_iter().map(|(_, op)| op).collect()
    }

    fn emit(&self, event: &LedgerEvent) {
        // Snapshot under the lock, call outside it.
        let snapshot: Vec<Arc<LedgerListener>> = {
            let listeners = self
                .listeners
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            listeners.iter().map(|(_, l)| Arc::clone(l)).collect()
        };
        for listener in snapshot {
            listener(event);
        }
    }
}
