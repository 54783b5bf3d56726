//! Conflict detection over a set of operations.
//!
//! Existence-based, not order-based: the question is only whether some
//! unresolved mutation already targets the record. Creates never conflict
//! because they have no record id until the server assigns one.

use crate::{Operation, OperationKind};

/// Whether any pending operation in `ops` conflicts with work on
/// `record_id` in `collection`.
///
/// Always false when `record_id` is `None`.
pub fn has_conflict<'a>(
    ops: impl IntoIterator<Item = &'a Operation>,
    collection: &str,
    record_id: Option<&str>,
) -> bool {
    let Some(record_id) = record_id else {
        return false;
    };
    ops.into_iter().any(|op| conflicts_with(op, collection, record_id))
}

/// Whether a single operation conflicts with work on `record_id`.
pub fn conflicts_with(op: &Operation, collection: &str, record_id: &str) -> bool {
    if !op.is_pending() || op.collection != collection {
        return false;
    }
    let same_record = op.record_id.as_deref() == Some(record_id);
    match op.kind {
        OperationKind::Delete => same_record,
        OperationKind::Update => same_record,
        OperationKind::Create => false,
    }
}
