//! # Optimist Engine
//!
//! The synchronous core of an optimistic mutation queue.
//!
//! A UI should show the result of a mutation before the server confirms it,
//! roll back when the server rejects it, and stay consistent while server
//! push events arrive for the same records. This crate holds the pieces that
//! need no IO to do that:
//!
//! - [`Ledger`] records every outstanding local mutation as an [`Operation`]
//! - [`conflict::has_conflict`] answers whether a record is mid-mutation
//! - [`Cache`] is the query-cache contract, with [`MemoryCache`] as an
//!   in-memory implementation
//! - [`CacheSnapshot`] captures views before an optimistic write so a
//!   rejection restores them exactly
//! - [`views`] applies optimistic and direct writes to every cached view of a
//!   collection
//! - [`PushEvent`] is the realtime wire format
//!
//! The async side (remote calls, subscriptions, the TTL sweeper) lives in the
//! `optimist-client` crate.
//!
//! ## Quick Start
//!
//! ```rust
//! use optimist_engine::{
//!     views, Cache, CacheSnapshot, CacheValue, Ledger, ListResult, MemoryCache, Operation,
//!     QueryKey, Record,
//! };
//! use serde_json::json;
//!
//! let cache = MemoryCache::new();
//! let ledger = Ledger::new();
//! let list = QueryKey::list_all("patients");
//! cache.write(
//!     list.clone(),
//!     CacheValue::List(ListResult::from_items(vec![
//!         Record::new("r1").with_field("name", "Old"),
//!     ])),
//! );
//!
//! // optimistic update of r1
//! let keys = views::record_keys(&cache, "patients", "r1");
//! let snapshot = CacheSnapshot::capture(&cache, &keys);
//! let id = ledger.generate_id(1_000);
//! ledger.add(Operation::update(id.clone(), "patients", "r1", json!({"name": "New"}), 1_000));
//! let patch = json!({"name": "New"}).as_object().cloned().unwrap();
//! views::merge_into_views(&cache, "patients", "r1", &patch);
//! assert!(ledger.has_conflict("patients", Some("r1")));
//!
//! // server rejected it
//! snapshot.restore(&cache);
//! ledger.remove(&id);
//! let restored = cache.read(&list).unwrap();
//! assert_eq!(restored.as_list().unwrap().items[0].get("name"), Some(&json!("Old")));
//! ```

pub mod cache;
pub mod clock;
pub mod collection;
pub mod conflict;
pub mod error;
pub mod event;
pub mod ledger;
pub mod operation;
pub mod query_key;
pub mod record;
pub mod snapshot;
pub mod views;

// Re-export main types at crate root
pub use cache::{Cache, CacheValue, FetchTicket, ListResult, MemoryCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use collection::Collection;
pub use error::Error;
pub use event::{PushAction, PushEvent};
pub use ledger::{Ledger, LedgerEvent, ListenerId};
pub use operation::{Operation, OperationId, OperationKind, OperationStatus};
pub use query_key::{KeyScope, ListOptions, QueryKey};
pub use record::Record;
pub use snapshot::CacheSnapshot;
pub use views::DirectWrite;

/// Type aliases for clarity
pub type RecordId = String;
pub type CollectionName = String;
/// Milliseconds since the Unix epoch.
pub type Timestamp = u64;
