//! The remote record store contract.
//!
//! One async call per mutation kind. Implementations own transport, auth and
//! retry; the mutation hooks never retry on their own.

use crate::error::RemoteError;
use futures::future::BoxFuture;
use optimist_engine::Record;
use serde_json::Value;

/// Remote persistence for records.
///
/// Each call returns a `'static` future so the hook can issue it right after
/// the optimistic write and await it later.
pub trait RemoteStore: Send + Sync + 'static {
    /// Create a record from `payload`, returning it with its server-assigned id.
    fn create(&self, collection: &str, payload: Value) -> BoxFuture<'static, Result<Record, RemoteError>>;

    /// Apply `patch` to `record_id`, returning the updated record.
    fn update(
        &self,
        collection: &str,
        record_id: &str,
        patch: Value,
    ) -> BoxFuture<'static, Result<Record, RemoteError>>;

    /// Delete `record_id`.
    fn delete(&self, collection: &str, record_id: &str) -> BoxFuture<'static, Result<(), RemoteError>>;
}

/// What a remote call hands back on success.
pub trait RemoteOutput: Send + 'static {
    /// The server's copy of the record, when the call returns one.
    fn server_record(&self) -> Option<&Record>;
}

impl RemoteOutput for Record {
    fn server_record(&self) -> Option<&Record> {
        Some(self)
    }
}

impl RemoteOutput for () {
    fn server_record(&self) -> Option<&Record> {
        None
    }
}
