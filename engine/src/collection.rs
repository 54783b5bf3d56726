//! Typed collection descriptors.
//!
//! The ledger and cache are schemaless; a [`Collection`] ties a collection
//! name to the Rust types its mutations carry so call sites stay typed.

use crate::{error::Result, record::into_object};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

/// A named collection with typed create and update payloads.
///
/// ```
/// use optimist_engine::Collection;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct NewPatient { name: String }
///
/// #[derive(Serialize, Deserialize, Default)]
/// struct PatientPatch {
///     #[serde(skip_serializing_if = "Option::is_none")]
///     name: Option<String>,
/// }
///
/// struct Patients;
/// impl Collection for Patients {
///     const NAME: &'static str = "patients";
///     type Draft = NewPatient;
///     type Patch = PatientPatch;
/// }
/// ```
pub trait Collection: Send + Sync + 'static {
    /// Collection name as used in query keys and push topics.
    const NAME: &'static str;
    /// Payload of a create.
    type Draft: Serialize + DeserializeOwned + Send + Sync + 'static;
    /// Payload of an update. Fields left out of the serialized form are untouched.
    type Patch: Serialize + DeserializeOwned + Send + Sync + 'static;
}

/// Serialize a payload to a JSON object.
pub fn to_fields<T: Serialize>(payload: &T) -> Result<Map<String, Value>> {
    into_object(serde_json::to_value(payload)?)
}
