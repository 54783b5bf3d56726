//! Record types as held in the cache.
//!
//! Records are schemaless on the cache side: an id plus a flat JSON object of
//! fields. Typed access goes through [`Record::decode`].

use crate::{error::Result, Error, RecordId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field carrying the last-modified time of a record.
pub const UPDATED_FIELD: &str = "updated";
/// Field carrying the creation time of a record.
pub const CREATED_FIELD: &str = "created";
/// Field carrying the owning collection's name.
pub const COLLECTION_NAME_FIELD: &str = "collectionName";

/// A single addressable entity within a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Record identifier (server-assigned, or synthetic while a create is pending)
    pub id: RecordId,
    /// All other fields
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Record {
    /// Create a record with no fields.
    pub fn new(id: impl Into<RecordId>) -> Self {
        Self {
            id: id.into(),
            fields: Map::new(),
        }
    }

    /// Build a record from a JSON object. The object must contain a string `id`.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(mut map) => {
                let id = match map.remove("id") {
                    Some(Value::String(id)) => id,
                    Some(other) => {
                        return Err(Error::InvalidPayload(format!(
                            "record id must be a string, got {other}"
                        )))
                    }
                    None => return Err(Error::InvalidPayload("record has no id".into())),
                };
                Ok(Self { id, fields: map })
            }
            other => Err(Error::InvalidPayload(format!(
                "record must be an object, got {other}"
            ))),
        }
    }

    /// Build a record with the given id from a serializable draft.
    ///
    /// Any `id` field in the draft is ignored.
    pub fn from_draft<T: Serialize>(id: impl Into<RecordId>, draft: &T) -> Result<Self> {
        let fields = into_object(serde_json::to_value(draft)?)?;
        let mut record = Self::new(id);
        record.fields = fields;
        record.fields.remove("id");
        Ok(record)
    }

    /// Set a field, builder style.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Get a field by name.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// A copy of this record with a different id and identical fields.
    pub fn with_id(&self, id: impl Into<RecordId>) -> Self {
        Self {
            id: id.into(),
            fields: self.fields.clone(),
        }
    }

    /// A new record with `patch` merged over this one's fields.
    ///
    /// The id is never changed by a patch.
    pub fn merged(&self, patch: &Map<String, Value>) -> Self {
        let mut fields = self.fields.clone();
        for (key, value) in patch {
            if key != "id" {
                fields.insert(key.clone(), value.clone());
            }
        }
        Self {
            id: self.id.clone(),
            fields,
        }
    }

    /// The `updated` field, if the record carries one as a string.
    pub fn updated_at(&self) -> Option<&str> {
        self.fields.get(UPDATED_FIELD).and_then(Value::as_str)
    }

    /// Whether this record is at least as recent as `other`.
    ///
    /// Compares the `updated` fields (RFC 3339 strings order lexicographically).
    /// Records without a comparable timestamp are treated as not older.
    pub fn is_not_older_than(&self, other: &Record) -> bool {
        match (self.updated_at(), other.updated_at()) {
            (Some(mine), Some(theirs)) => mine >= theirs,
            _ => true,
        }
    }

    /// Convert to a full JSON object including `id`.
    pub fn to_value(&self) -> Value {
        let mut map = self.fields.clone();
        map.insert("id".into(), Value::String(self.id.clone()));
        Value::Object(map)
    }

    /// Decode into a typed struct.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.to_value())?)
    }
}

/// Require a JSON value to be an object and unwrap it.
pub fn into_object(value: Value) -> Result<Map<String, Value>> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(Error::InvalidPayload(format!(
            "expected a JSON object, got {other}"
        ))),
    }
}
