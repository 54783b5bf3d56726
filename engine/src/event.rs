//! Push-event wire format.
//!
//! ```json
//! { "action": "create" | "update" | "delete", "record": { "id": "...", ... } }
//! ```
//!
//! Actions outside the three known ones decode as [`PushAction::Unknown`]
//! rather than failing, so a newer server cannot break an older client.

use crate::{error::Result, Error, Record};
use serde::{Deserialize, Serialize};

/// What happened to the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PushAction {
    Create,
    Update,
    Delete,
    #[serde(other)]
    Unknown,
}

/// A server-initiated change notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushEvent {
    pub action: PushAction,
    pub record: Record,
}

impl PushEvent {
    pub fn create(record: Record) -> Self {
        Self {
            action: PushAction::Create,
            record,
        }
    }

    pub fn update(record: Record) -> Self {
        Self {
            action: PushAction::Update,
            record,
        }
    }

    /// A delete carries only the id.
    pub fn delete(id: impl Into<String>) -> Self {
        Self {
            action: PushAction::Delete,
            record: Record::new(id),
        }
    }

    /// Decode one event from its JSON text.
    pub fn parse(text: &str) -> Result<Self> {
        let event: PushEvent =
            serde_json::from_str(text).map_err(|e| Error::MalformedEvent(e.to_string()))?;
        if event.record.id.is_empty() {
            return Err(Error::MalformedEvent("record id is empty".into()));
        }
        Ok(event)
    }

    /// Encode as JSON text.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn record_id(&self) -> &str {
        &self.record.id
    }
}
