//! Error types surfaced by the client runtime.

use crate::mutation::MutationPhase;
use optimist_engine::{CollectionName, RecordId};

/// A typed rejection from the remote record store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("record not found")]
    NotFound,

    #[error("rejected by server concurrency control: {0}")]
    Conflict(String),

    #[error("network unavailable: {0}")]
    Network(String),
}

/// Why a mutation did not commit.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MutationError {
    #[error("server rejected the payload: {0}")]
    ValidationRejected(String),

    #[error("record no longer exists on the server")]
    NotFound,

    #[error("network unavailable: {0}")]
    NetworkUnavailable(String),

    #[error("server reported a conflicting write: {0}")]
    RemoteConflict(String),

    #[error("a pending mutation already targets {collection}/{record_id}")]
    ConflictPending {
        collection: CollectionName,
        record_id: RecordId,
    },

    #[error("Engine error: {0}")]
    Engine(#[from] optimist_engine::Error),

    /// The server answered after the operation was swept; nothing was rolled back
    #[error("operation expired before settlement: {0}")]
    Expired(Box<MutationError>),
}

/// Result type alias for mutation hooks.
pub type Result<T> = std::result::Result<T, MutationError>;

impl From<RemoteError> for MutationError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Validation(msg) => MutationError::ValidationRejected(msg),
            RemoteError::NotFound => MutationError::NotFound,
            RemoteError::Conflict(msg) => MutationError::RemoteConflict(msg),
            RemoteError::Network(msg) => MutationError::NetworkUnavailable(msg),
        }
    }
}

impl MutationError {
    /// The phase a mutation ended in when it failed with this error.
    ///
    /// Errors raised before any write leave the mutation `Idle`; remote
    /// failures mean it was rolled back, unless the sweep got there first.
    pub fn phase(&self) -> MutationPhase {
        match self {
            MutationError::ConflictPending { .. } | MutationError::Engine(_) => MutationPhase::Idle,
            MutationError::Expired(_) => MutationPhase::Expired,
            _ => MutationPhase::RolledBack,
        }
    }

    /// Whether retrying later could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            MutationError::NetworkUnavailable(_) | MutationError::ConflictPending { .. } => true,
            MutationError::Expired(inner) => inner.is_transient(),
            _ => false,
        }
    }
}

/// Failure to open a push subscription.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubscribeError {
    #[error("push channel unavailable: {0}")]
    Unavailable(String),

    #[error("subscription refused: {0}")]
    Refused(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_errors_map_onto_mutation_errors() {
        assert_eq!(
            MutationError::from(RemoteError::Validation("name required".into())),
            MutationError::ValidationRejected("name required".into())
        );
        assert_eq!(MutationError::from(RemoteError::NotFound), MutationError::NotFound);
        assert_eq!(
            MutationError::from(RemoteError::Network("timeout".into())),
            MutationError::NetworkUnavailable("timeout".into())
        );
        assert_eq!(
            MutationError::from(RemoteError::Conflict("etag".into())),
            MutationError::RemoteConflict("etag".into())
        );
    }

    #[test]
    fn phases() {
        let pending = MutationError::ConflictPending {
            collection: "patients".into(),
            record_id: "r1".into(),
        };
        assert_eq!(pending.phase(), MutationPhase::Idle);
        assert!(pending.is_transient());
        assert_eq!(MutationError::NotFound.phase(), MutationPhase::RolledBack);
        assert!(!MutationError::NotFound.is_transient());

        let expired =
            MutationError::Expired(Box::new(MutationError::NetworkUnavailable("timeout".into())));
        assert_eq!(expired.phase(), MutationPhase::Expired);
        assert!(expired.is_transient());
        assert_eq!(
            expired.to_string(),
            "operation expired before settlement: network unavailable: timeout"
        );
    }

    #[test]
    fn display() {
        let err = MutationError::ConflictPending {
            collection: "patients".into(),
            record_id: "r1".into(),
        };
        assert_eq!(
            err.to_string(),
            "a pending mutation already targets patients/r1"
        );
    }
}
