//! Operations: one outstanding local mutation attempt each.
//!
//! An operation is created `Pending` and settles exactly once, to either
//! `Succeeded` or `Failed`. Settled operations are garbage and are removed
//! from the ledger right after settlement or by the TTL sweep.

use crate::{error::Result, CollectionName, RecordId, Timestamp};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for an operation.
pub type OperationId = String;

/// Prefix of every operation id.
pub const OPERATION_ID_PREFIX: &str = "op_";
/// Prefix of every synthetic record id.
pub const TEMP_ID_PREFIX: &str = "temp-";

/// What an operation does to its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Create => f.write_str("create"),
            OperationKind::Update => f.write_str("update"),
            OperationKind::Delete => f.write_str("delete"),
        }
    }
}

/// Lifecycle of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    Pending,
    Succeeded,
    Failed,
}

impl OperationStatus {
    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_become(self, next: OperationStatus) -> bool {
        matches!(
            (self, next),
            (OperationStatus::Pending, OperationStatus::Succeeded)
                | (OperationStatus::Pending, OperationStatus::Failed)
        )
    }

    pub fn is_pending(self) -> bool {
        self == OperationStatus::Pending
    }
}

/// An outstanding local mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    /// Operation ID
    pub id: OperationId,
    /// Create, update or delete
    pub kind: OperationKind,
    /// Target collection
    pub collection: CollectionName,
    /// Target record; absent for creates until the server assigns one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<RecordId>,
    /// Synthetic id standing in for a created record in the cache
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_id: Option<RecordId>,
    /// When the operation was registered (milliseconds)
    pub created_at: Timestamp,
    /// Full record for create, patch for update, none for delete
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    /// Lifecycle status
    pub status: OperationStatus,
}

impl Operation {
    /// A pending create carrying `payload` and cached under `temp_id`.
    pub fn create(
        id: impl Into<OperationId>,
        collection: impl Into<CollectionName>,
        temp_id: impl Into<RecordId>,
        payload: serde_json::Value,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id: id.into(),
            kind: OperationKind::Create,
            collection: collection.into(),
            record_id: None,
            temp_id: Some(temp_id.into()),
            created_at,
            payload: Some(payload),
            status: OperationStatus::Pending,
        }
    }

    /// A pending update applying `patch` to `record_id`.
    pub fn update(
        id: impl Into<OperationId>,
        collection: impl Into<CollectionName>,
        record_id: impl Into<RecordId>,
        patch: serde_json::Value,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id: id.into(),
            kind: OperationKind::Update,
            collection: collection.into(),
            record_id: Some(record_id.into()),
            temp_id: None,
            created_at,
            payload: Some(patch),
            status: OperationStatus::Pending,
        }
    }

    /// A pending delete of `record_id`.
    pub fn delete(
        id: impl Into<OperationId>,
        collection: impl Into<CollectionName>,
        record_id: impl Into<RecordId>,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id: id.into(),
            kind: OperationKind::Delete,
            collection: collection.into(),
            record_id: Some(record_id.into()),
            temp_id: None,
            created_at,
            payload: None,
            status: OperationStatus::Pending,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status.is_pending()
    }

    /// A copy differing only in `status`.
    pub fn with_status(&self, status: OperationStatus) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }

    /// Whether this operation targets `record_id` in `collection`.
    pub fn targets(&self, collection: &str, record_id: &str) -> bool {
        self.collection == collection && self.record_id.as_deref() == Some(record_id)
    }

    /// Decode the payload into a typed value.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        match &self.payload {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }

    /// Age of the operation at `now`. Zero if `now` precedes creation.
    pub fn age(&self, now: Timestamp) -> u64 {
        now.saturating_sub(self.created_at)
    }
}

/// Generate an operation id: `op_<millis>_<random>`.
pub fn new_operation_id(now: Timestamp) -> OperationId {
    format!("{}{}_{}", OPERATION_ID_PREFIX, now, random_suffix())
}

/// Generate a synthetic record id: `temp-<millis>-<random>`.
pub fn new_temp_id(now: Timestamp) -> RecordId {
    format!("{}{}-{}", TEMP_ID_PREFIX, now, random_suffix())
}

/// Whether `id` is a synthetic record id.
pub fn is_temp_id(id: &str) -> bool {
    id.starts_with(TEMP_ID_PREFIX)
}

fn random_suffix() -> String {
    let mut simple = uuid::Uuid::new_v4().simple().to_string();
    simple.truncate(12);
    simple
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_op() {
        let op = Operation::create("op-1", "patients", "temp-1", json!({"name": "Acme"}), 1000);
        assert_eq!(op.kind, OperationKind::Create);
        assert_eq!(op.record_id, None);
        assert_eq!(op.temp_id.as_deref(), Some("temp-1"));
        assert!(op.is_pending());
    }

    #[test]
    fn update_and_delete_ops() {
        let update = Operation::update("op-2", "patients", "r1", json!({"name": "New"}), 2000);
        assert!(update.targets("patients", "r1"));
        assert!(!update.targets("appointments", "r1"));
        assert!(!update.targets("patients", "r2"));

        let delete = Operation::delete("op-3", "patients", "r1", 3000);
        assert_eq!(delete.payload, None);
        assert!(delete.targets("patients", "r1"));
    }

    #[test]
    fn status_transitions() {
        use OperationStatus::*;
        assert!(Pending.can_become(Succeeded));
        assert!(Pending.can_become(Failed));
        assert!(!Succeeded.can_become(Pending));
        assert!(!Failed.can_become(Pending));
        assert!(!Succeeded.can_become(Failed));
        assert!(!Pending.can_become(Pending));
    }

    #[test]
    fn with_status_changes_only_status() {
        let op = Operation::update("op-2", "patients", "r1", json!({"name": "New"}), 2000);
        let done = op.with_status(OperationStatus::Succeeded);
        assert_eq!(done.status, OperationStatus::Succeeded);
        assert_eq!(done.with_status(OperationStatus::Pending), op);
    }

    #[test]
    fn typed_payload() {
        #[derive(Debug, serde::Deserialize, PartialEq)]
        struct Patch {
            name: String,
        }
        let op = Operation::update("op-2", "patients", "r1", json!({"name": "New"}), 2000);
        let patch: Option<Patch> = op.payload_as().unwrap();
        assert_eq!(patch, Some(Patch { name: "New".into() }));

        let delete = Operation::delete("op-3", "patients", "r1", 3000);
        assert_eq!(delete.payload_as::<Patch>().unwrap(), None);
    }

    #[test]
    fn age_saturates() {
        let op = Operation::delete("op-3", "patients", "r1", 3000);
        assert_eq!(op.age(4000), 1000);
        assert_eq!(op.age(1000), 0);
    }

    #[test]
    fn id_formats() {
        let op_id = new_operation_id(1234);
        assert!(op_id.starts_with("op_1234_"));

        let temp = new_temp_id(1234);
        assert!(temp.starts_with("temp-1234-"));
        assert!(is_temp_id(&temp));
        assert!(!is_temp_id("abc123"));

        assert_ne!(new_operation_id(1), new_operation_id(1));
    }

    #[test]
    fn serialization() {
        let op = Operation::delete("op-3", "patients", "r1", 3000);
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(
            json,
            json!({
                "id": "op-3",
                "kind": "delete",
                "collection": "patients",
                "recordId": "r1",
                "createdAt": 3000,
                "status": "pending"
            })
        );
        let parsed: Operation = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, op);
    }
}
