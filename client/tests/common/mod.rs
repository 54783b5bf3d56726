//! Shared fixtures for client integration tests.

#![allow(dead_code)]

use futures::future::{self, BoxFuture, FutureExt};
use optimist_client::{Config, RemoteError, RemoteStore, SyncContext};
use optimist_engine::clock::to_rfc3339;
use optimist_engine::record::{into_object, UPDATED_FIELD};
use optimist_engine::{
    Cache, CacheValue, Collection, ListResult, ManualClock, MemoryCache, QueryKey, Record,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Local clock start: 2023-11-14T22:13:20.000Z
pub const LOCAL_START: u64 = 1_700_000_000_000;
/// Server clock start, well after the local one.
pub const SERVER_START: u64 = 1_800_000_000_000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewPatient {
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PatientPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl PatientPatch {
    pub fn name(name: &str) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }
}

pub struct Patients;

impl Collection for Patients {
    const NAME: &'static str = "patients";
    type Draft = NewPatient;
    type Patch = PatientPatch;
}

/// A call received by [`MockRemote`].
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Create { collection: String, payload: Value },
    Update { collection: String, id: String, patch: Value },
    Delete { collection: String, id: String },
}

/// An in-memory record store that answers immediately.
///
/// Failures queued with [`MockRemote::fail_next`] are returned in order
/// before any real work is done.
#[derive(Default)]
pub struct MockRemote {
    records: Mutex<HashMap<(String, String), Record>>,
    ids: Mutex<VecDeque<String>>,
    failures: Mutex<VecDeque<RemoteError>>,
    ticks: AtomicU64,
    calls: Mutex<Vec<Call>>,
}

impl MockRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn seed(&self, collection: &str, record: Record) {
        self.records
            .lock()
            .unwrap()
            .insert((collection.to_string(), record.id.clone()), record);
    }

    /// Id to hand out for the next create.
    pub fn assign_next_id(&self, id: &str) {
        self.ids.lock().unwrap().push_back(id.to_string());
    }

    pub fn fail_next(&self, err: RemoteError) {
        self.failures.lock().unwrap().push_back(err);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn stamp(&self) -> String {
        to_rfc3339(SERVER_START + self.ticks.fetch_add(1, Ordering::SeqCst))
    }

    fn take_failure(&self) -> Option<RemoteError> {
        self.failures.lock().unwrap().pop_front()
    }
}

impl RemoteStore for MockRemote {
    fn create(&self, collection: &str, payload: Value) -> BoxFuture<'static, Result<Record, RemoteError>> {
        self.calls.lock().unwrap().push(Call::Create {
            collection: collection.into(),
            payload: payload.clone(),
        });
        if let Some(err) = self.take_failure() {
            return future::ready(Err(err)).boxed();
        }

        let id = self
            .ids
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| format!("srv{}", self.ticks.load(Ordering::SeqCst)));
        let mut record = Record::new(id);
        record.fields = into_object(payload).unwrap();
        record.fields.insert(UPDATED_FIELD.into(), Value::String(self.stamp()));
        self.seed(collection, record.clone());
        future::ready(Ok(record)).boxed()
    }

    fn update(
        &self,
        collection: &str,
        id: &str,
        patch: Value,
    ) -> BoxFuture<'static, Result<Record, RemoteError>> {
        self.calls.lock().unwrap().push(Call::Update {
            collection: collection.into(),
            id: id.into(),
            patch: patch.clone(),
        });
        if let Some(err) = self.take_failure() {
            return future::ready(Err(err)).boxed();
        }

        let key = (collection.to_string(), id.to_string());
        let existing = self.records.lock().unwrap().get(&key).cloned();
        let result = match existing {
            Some(record) => {
                let mut patch = into_object(patch).unwrap();
                patch.insert(UPDATED_FIELD.into(), Value::String(self.stamp()));
                let updated = record.merged(&patch);
                self.records.lock().unwrap().insert(key, updated.clone());
                Ok(updated)
            }
            None => Err(RemoteError::NotFound),
        };
        future::ready(result).boxed()
    }

    fn delete(&self, collection: &str, id: &str) -> BoxFuture<'static, Result<(), RemoteError>> {
        self.calls.lock().unwrap().push(Call::Delete {
            collection: collection.into(),
            id: id.into(),
        });
        if let Some(err) = self.take_failure() {
            return future::ready(Err(err)).boxed();
        }

        let key = (collection.to_string(), id.to_string());
        let result = match self.records.lock().unwrap().remove(&key) {
            Some(_) => Ok(()),
            None => Err(RemoteError::NotFound),
        };
        future::ready(result).boxed()
    }
}

/// A context wired to a [`MockRemote`], a [`MemoryCache`] and a [`ManualClock`].
pub struct Harness {
    pub ctx: Arc<SyncContext>,
    pub cache: Arc<MemoryCache>,
    pub remote: Arc<MockRemote>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let cache = Arc::new(MemoryCache::new());
        let remote = MockRemote::new();
        let clock = Arc::new(ManualClock::new(LOCAL_START));
        let ctx = SyncContext::builder(remote.clone())
            .cache(cache.clone())
            .clock(clock.clone())
            .config(config)
            .build();
        Self {
            ctx,
            cache,
            remote,
            clock,
        }
    }

    /// Put `records` on the server and in the default list view.
    pub fn seed_list(&self, records: Vec<Record>) {
        for record in &records {
            self.remote.seed(Patients::NAME, record.clone());
        }
        self.cache.write(
            QueryKey::list_all(Patients::NAME),
            CacheValue::List(ListResult::from_items(records)),
        );
    }

    /// Put `record` in its detail view.
    pub fn seed_detail(&self, record: Record) {
        self.cache.write(
            QueryKey::detail(Patients::NAME, &record.id),
            CacheValue::Record(record),
        );
    }

    pub fn list(&self) -> ListResult {
        self.list_at(&QueryKey::list_all(Patients::NAME))
    }

    pub fn list_at(&self, key: &QueryKey) -> ListResult {
        self.cache
            .read(key)
            .and_then(|v| v.as_list().cloned())
            .expect("list view cached")
    }

    pub fn detail(&self, id: &str) -> Option<Record> {
        self.cache
            .read(&QueryKey::detail(Patients::NAME, id))
            .and_then(|v| v.as_record().cloned())
    }
}
