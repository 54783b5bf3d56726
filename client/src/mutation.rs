//! Mutation hooks: optimistic create, update and delete.
//!
//! Every mutation runs in two phases. `begin_*` does all the synchronous work
//! (conflict check, fetch cancellation, snapshot, ledger entry, optimistic
//! cache write) and issues the remote call. [`PendingMutation::settle`] awaits
//! that call and either commits the server's answer or reverts the record to
//! its snapshot. Rollback touches only the record the mutation targeted, so
//! other mutations that landed on the same views in the meantime survive.
//!
//! ```text
//! Idle --begin_*--> Optimistic --settle--> Committed
//!                                     \--> RolledBack
//!                                     \--> Expired (swept before settling)
//! ```
//!
//! A `PendingMutation` that is dropped without settling leaves its operation
//! pending until the housekeeping sweep prunes it.

use crate::config::ConflictPolicy;
use crate::context::SyncContext;
use crate::error::{self, MutationError, RemoteError};
use crate::remote::RemoteOutput;
use futures::future::BoxFuture;
use optimist_engine::collection::to_fields;
use optimist_engine::operation::new_temp_id;
use optimist_engine::record::UPDATED_FIELD;
use optimist_engine::{
    clock::to_rfc3339, views, CacheSnapshot, Collection, Operation, OperationKind, OperationStatus,
    QueryKey, Record,
};
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;

/// Where a mutation is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationPhase {
    /// Nothing written yet
    Idle,
    /// Ledger entry and optimistic cache write in place, remote call in flight
    Optimistic,
    /// Server accepted; cache holds the server's record
    Committed,
    /// Server rejected; the record restored to its prior state
    RolledBack,
    /// Swept from the ledger before the server answered; cache left as it was
    Expired,
}

/// Typed mutation hooks for collection `C`.
pub struct CollectionMutations<C: Collection> {
    ctx: Arc<SyncContext>,
    _collection: PhantomData<fn() -> C>,
}

impl<C: Collection> Clone for CollectionMutations<C> {
    fn clone(&self) -> Self {
        Self::new(Arc::clone(&self.ctx))
    }
}

impl<C: Collection> CollectionMutations<C> {
    pub fn new(ctx: Arc<SyncContext>) -> Self {
        Self {
            ctx,
            _collection: PhantomData,
        }
    }

    /// Whether a pending mutation already targets `record_id`.
    pub fn has_conflict(&self, record_id: &str) -> bool {
        self.ctx.has_conflict(C::NAME, Some(record_id))
    }

    /// Pending operations on this collection, oldest first.
    pub fn pending(&self) -> Vec<Operation> {
        self.ctx.ledger().pending_for(C::NAME)
    }

    /// Optimistically create a record and wait for the server's copy.
    pub async fn create(&self, draft: &C::Draft) -> error::Result<Record> {
        self.begin_create(draft)?.settle().await
    }

    /// Optimistically update a record and wait for the server's copy.
    pub async fn update(&self, record_id: &str, patch: &C::Patch) -> error::Result<Record> {
        self.begin_update(record_id, patch)?.settle().await
    }

    /// Optimistically delete a record and wait for the server.
    pub async fn delete(&self, record_id: &str) -> error::Result<()> {
        self.begin_delete(record_id)?.settle().await
    }

    /// Append a synthetic record to every cached list view and issue the
    /// remote create.
    pub fn begin_create(&self, draft: &C::Draft) -> error::Result<PendingMutation<Record>> {
        let ctx = &self.ctx;
        let cache = ctx.cache();
        let now = ctx.now();
        let fields = to_fields(draft)?;
        let temp_id = new_temp_id(now);

        let keys = views::list_keys(cache, C::NAME);
        let snapshot = self.prepare(&keys);

        let op_id = ctx.ledger().generate_id(now);
        let op = Operation::create(
            op_id,
            C::NAME,
            temp_id.clone(),
            Value::Object(fields.clone()),
            now,
        );
        ctx.ledger().add(op.clone());

        let record = views::synthetic_record(C::NAME, &temp_id, &fields, now);
        views::append_to_lists(cache, C::NAME, &record);

        tracing::debug!(
            op_id = %op.id,
            collection = C::NAME,
            temp_id = %temp_id,
            "Registered optimistic create"
        );

        let call = ctx.remote().create(C::NAME, Value::Object(fields));
        Ok(PendingMutation::new(Arc::clone(ctx), op, snapshot, call))
    }

    /// Merge `patch` into every cached view of the record and issue the
    /// remote update.
    pub fn begin_update(
        &self,
        record_id: &str,
        patch: &C::Patch,
    ) -> error::Result<PendingMutation<Record>> {
        let ctx = &self.ctx;
        let cache = ctx.cache();
        let fields = to_fields(patch)?;
        self.check_conflict(record_id)?;
        let now = ctx.now();

        let keys = views::record_keys(cache, C::NAME, record_id);
        let snapshot = self.prepare(&keys);

        let op_id = ctx.ledger().generate_id(now);
        let op = Operation::update(op_id, C::NAME, record_id, Value::Object(fields.clone()), now);
        self.register(&op)?;

        let mut optimistic = fields.clone();
        optimistic.insert(UPDATED_FIELD.into(), Value::String(to_rfc3339(now)));
        views::merge_into_views(cache, C::NAME, record_id, &optimistic);

        tracing::debug!(
            op_id = %op.id,
            collection = C::NAME,
            record_id = %record_id,
            "Registered optimistic update"
        );

        let call = ctx.remote().update(C::NAME, record_id, Value::Object(fields));
        Ok(PendingMutation::new(Arc::clone(ctx), op, snapshot, call))
    }

    /// Remove the record from every cached view and issue the remote delete.
    pub fn begin_delete(&self, record_id: &str) -> error::Result<PendingMutation<()>> {
        let ctx = &self.ctx;
        let cache = ctx.cache();
        self.check_conflict(record_id)?;
        let now = ctx.now();

        let keys = views::record_keys(cache, C::NAME, record_id);
        let snapshot = self.prepare(&keys);

        let op_id = ctx.ledger().generate_id(now);
        let op = Operation::delete(op_id, C::NAME, record_id, now);
        self.register(&op)?;

        views::remove_from_views(cache, C::NAME, record_id);

        tracing::debug!(
            op_id = %op.id,
            collection = C::NAME,
            record_id = %record_id,
            "Registered optimistic delete"
        );

        let call = ctx.remote().delete(C::NAME, record_id);
        Ok(PendingMutation::new(Arc::clone(ctx), op, snapshot, call))
    }

    fn check_conflict(&self, record_id: &str) -> error::Result<()> {
        if !self.has_conflict(record_id) {
            return Ok(());
        }
        self.ctx.note_conflict(C::NAME, record_id, "mutation");
        match self.ctx.config().conflict_policy {
            ConflictPolicy::Reject => Err(MutationError::ConflictPending {
                collection: C::NAME.to_string(),
                record_id: record_id.to_string(),
            }),
            ConflictPolicy::Advisory => Ok(()),
        }
    }

    /// Put an update or delete in the ledger.
    ///
    /// Under [`ConflictPolicy::Reject`] the insert is exclusive, which catches
    /// a racing mutation that slipped past [`Self::check_conflict`].
    fn register(&self, op: &Operation) -> error::Result<()> {
        let ledger = self.ctx.ledger();
        match self.ctx.config().conflict_policy {
            ConflictPolicy::Advisory => {
                ledger.add(op.clone());
                Ok(())
            }
            ConflictPolicy::Reject => ledger.add_exclusive(op.clone()).map_err(|err| match err {
                optimist_engine::Error::ConflictPending {
                    collection,
                    record_id,
                } => {
                    self.ctx.note_conflict(&collection, &record_id, "mutation");
                    MutationError::ConflictPending {
                        collection,
                        record_id,
                    }
                }
                other => MutationError::Engine(other),
            }),
        }
    }

    /// Stop in-flight fetches from landing on `keys`, then capture them.
    fn prepare(&self, keys: &[QueryKey]) -> CacheSnapshot {
        let cache = self.ctx.cache();
        for key in keys {
            cache.cancel_outstanding_fetch(key);
        }
        CacheSnapshot::capture(cache, keys)
    }
}

/// A mutation in the `Optimistic` phase, waiting on its remote call.
#[must_use = "an unsettled mutation stays pending until the housekeeping sweep"]
pub struct PendingMutation<T> {
    ctx: Arc<SyncContext>,
    op: Operation,
    snapshot: CacheSnapshot,
    call: BoxFuture<'static, Result<T, RemoteError>>,
}

impl<T> std::fmt::Debug for PendingMutation<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingMutation")
            .field("op", &self.op)
            .field("snapshot_keys", &self.snapshot.len())
            .finish_non_exhaustive()
    }
}

impl<T: RemoteOutput> PendingMutation<T> {
    fn new(
        ctx: Arc<SyncContext>,
        op: Operation,
        snapshot: CacheSnapshot,
        call: BoxFuture<'static, Result<T, RemoteError>>,
    ) -> Self {
        Self {
            ctx,
            op,
            snapshot,
            call,
        }
    }

    /// The ledger entry backing this mutation.
    pub fn operation(&self) -> &Operation {
        &self.op
    }

    /// Synthetic id of the record being created, if this is a create.
    pub fn temp_id(&self) -> Option<&str> {
        self.op.temp_id.as_deref()
    }

    /// Await the remote call, then commit or roll back.
    ///
    /// If the operation has already been swept from the ledger, the cache and
    /// ledger are left alone. A success is still returned as such; a failure
    /// comes back wrapped in [`MutationError::Expired`].
    pub async fn settle(self) -> error::Result<T> {
        let PendingMutation {
            ctx,
            op,
            snapshot,
            call,
        } = self;

        match call.await {
            Ok(output) => {
                if ctx.ledger().update_status(&op.id, OperationStatus::Succeeded) {
                    commit(&ctx, &op, output.server_record());
                } else {
                    stale(&op, "committed");
                }
                Ok(output)
            }
            Err(err) => {
                if ctx.ledger().update_status(&op.id, OperationStatus::Failed) {
                    rollback(&ctx, &op, &snapshot, &err);
                    Err(err.into())
                } else {
                    stale(&op, "failed");
                    Err(MutationError::Expired(Box::new(err.into())))
                }
            }
        }
    }
}

fn commit(ctx: &SyncContext, op: &Operation, server: Option<&Record>) {
    let cache = ctx.cache();
    match (op.kind, server) {
        (OperationKind::Create, Some(record)) => {
            if let Some(temp_id) = op.temp_id.as_deref() {
                views::swap_temp_id(cache, &op.collection, temp_id, record);
            }
        }
        (OperationKind::Update, Some(record)) => {
            views::replace_in_views(cache, &op.collection, record, true);
        }
        (OperationKind::Delete, _) => {
            if let Some(record_id) = op.record_id.as_deref() {
                views::remove_from_views(cache, &op.collection, record_id);
            }
        }
        (_, None) => {}
    }
    ctx.ledger().remove(&op.id);

    tracing::debug!(
        op_id = %op.id,
        collection = %op.collection,
        kind = %op.kind,
        record_id = server.map(|r| r.id.as_str()).or(op.record_id.as_deref()),
        "Mutation committed"
    );

    if let Some(record_id) = op.record_id.as_deref() {
        match op.kind {
            OperationKind::Delete => {
                ctx.discard_deferred(&op.collection, record_id);
            }
            _ => {
                ctx.replay_deferred(&op.collection, record_id, server);
            }
        }
    }
}

fn rollback(ctx: &SyncContext, op: &Operation, snapshot: &CacheSnapshot, err: &RemoteError) {
    let target = match op.kind {
        OperationKind::Create => op.temp_id.as_deref(),
        _ => op.record_id.as_deref(),
    };
    if let Some(target) = target {
        snapshot.restore_record(ctx.cache(), target);
    }
    ctx.ledger().remove(&op.id);

    tracing::warn!(
        op_id = %op.id,
        collection = %op.collection,
        kind = %op.kind,
        error = %err,
        "Mutation rolled back"
    );

    if let Some(record_id) = op.record_id.as_deref() {
        ctx.replay_deferred(&op.collection, record_id, None);
    }
}

fn stale(op: &Operation, outcome: &str) {
    tracing::warn!(
        op_id = %op.id,
        collection = %op.collection,
        outcome,
        "Settled an operation that was already swept; cache left untouched"
    );
}
