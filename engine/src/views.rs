//! Whole-value transforms over every cached view of a collection.
//!
//! Both the optimistic path (mutation hooks) and the direct-write path
//! (server push events) go through these functions. Each view is replaced as
//! a whole value via [`Cache::update`]; nothing here merges concurrently at
//! field level.

use crate::clock::to_rfc3339;
use crate::record::{COLLECTION_NAME_FIELD, CREATED_FIELD, UPDATED_FIELD};
use crate::{Cache, CacheValue, ListResult, PushAction, PushEvent, QueryKey, Record, Timestamp};
use serde_json::{Map, Value};

/// What a direct write did to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectWrite {
    /// The record was inserted or merged into this many views
    Upserted { views: usize },
    /// The record was removed from this many views
    Removed { views: usize },
    /// The event was not understood; the collection was invalidated instead
    Invalidated,
}

/// List-view keys currently cached for `collection`.
pub fn list_keys(cache: &dyn Cache, collection: &str) -> Vec<QueryKey> {
    cache
        .keys(collection)
        .into_iter()
        .filter(QueryKey::is_list)
        .collect()
}

/// Every view key a mutation of `record_id` can touch: all list views plus
/// the record's detail view (whether cached or not).
pub fn record_keys(cache: &dyn Cache, collection: &str, record_id: &str) -> Vec<QueryKey> {
    let mut keys = list_keys(cache, collection);
    keys.push(QueryKey::detail(collection, record_id));
    keys
}

/// Build the placeholder record shown while a create is in flight.
pub fn synthetic_record(
    collection: &str,
    temp_id: &str,
    fields: &Map<String, Value>,
    now: Timestamp,
) -> Record {
    let stamp = to_rfc3339(now);
    let mut record = Record::new(temp_id);
    record.fields = fields.clone();
    record.fields.remove("id");
    record
        .fields
        .insert(CREATED_FIELD.into(), Value::String(stamp.clone()));
    record.fields.insert(UPDATED_FIELD.into(), Value::String(stamp));
    record.fields.insert(
        COLLECTION_NAME_FIELD.into(),
        Value::String(collection.to_string()),
    );
    record
}

/// Append `record` to every list view that does not already hold its id.
pub fn append_to_lists(cache: &dyn Cache, collection: &str, record: &Record) -> usize {
    let mut changed = 0;
    for key in list_keys(cache, collection) {
        cache.update(&key, &mut |value| match value {
            CacheValue::List(list) if !list.contains(&record.id) => {
                changed += 1;
                let mut next = list.clone();
                next.items.push(record.clone());
                next.total_items += 1;
                CacheValue::List(next)
            }
            other => other.clone(),
        });
    }
    changed
}

/// Merge `patch` into the record wherever it appears. Returns the number of
/// views changed.
pub fn merge_into_views(
    cache: &dyn Cache,
    collection: &str,
    record_id: &str,
    patch: &Map<String, Value>,
) -> usize {
    let mut changed = 0;
    for key in record_keys(cache, collection, record_id) {
        cache.update(&key, &mut |value| match value {
            CacheValue::List(list) if list.contains(record_id) => {
                changed += 1;
                CacheValue::List(map_items(list, |item| {
                    if item.id == record_id {
                        item.merged(patch)
                    } else {
                        item.clone()
                    }
                }))
            }
            CacheValue::Record(record) if record.id == record_id => {
                changed += 1;
                CacheValue::Record(record.merged(patch))
            }
            other => other.clone(),
        });
    }
    changed
}

/// Replace the record wherever a view holds its id. When `write_detail` is
/// set, the detail view is written even if it was not cached.
pub fn replace_in_views(
    cache: &dyn Cache,
    collection: &str,
    record: &Record,
    write_detail: bool,
) -> usize {
    let mut changed = 0;
    for key in list_keys(cache, collection) {
        cache.update(&key, &mut |value| match value {
            CacheValue::List(list) if list.contains(&record.id) => {
                changed += 1;
                CacheValue::List(map_items(list, |item| {
                    if item.id == record.id {
                        record.clone()
                    } else {
                        item.clone()
                    }
                }))
            }
            other => other.clone(),
        });
    }

    let detail = QueryKey::detail(collection, &record.id);
    if write_detail || cache.read(&detail).is_some() {
        cache.write(detail, CacheValue::Record(record.clone()));
        changed += 1;
    }
    changed
}

/// Remove the record from every view. Returns the number of views changed.
pub fn remove_from_views(cache: &dyn Cache, collection: &str, record_id: &str) -> usize {
    let mut changed = 0;
    for key in list_keys(cache, collection) {
        cache.update(&key, &mut |value| match value {
            CacheValue::List(list) if list.contains(record_id) => {
                changed += 1;
                let mut next = list.clone();
                next.items.retain(|item| item.id != record_id);
                next.total_items = next.total_items.saturating_sub(1);
                CacheValue::List(next)
            }
            other => other.clone(),
        });
    }
    if cache.remove(&QueryKey::detail(collection, record_id)).is_some() {
        changed += 1;
    }
    changed
}

/// Swap a synthetic id for the server record in every view that holds it.
///
/// A list that already holds the server id (a push event beat the response)
/// drops the synthetic item instead, so the record never appears twice.
pub fn swap_temp_id(cache: &dyn Cache, collection: &str, temp_id: &str, record: &Record) -> usize {
    let mut changed = 0;
    for key in list_keys(cache, collection) {
        cache.update(&key, &mut |value| match value {
            CacheValue::List(list) if list.contains(temp_id) => {
                changed += 1;
                if list.contains(&record.id) {
                    let mut next = list.clone();
                    next.items.retain(|item| item.id != temp_id);
                    next.total_items = next.total_items.saturating_sub(1);
                    CacheValue::List(next)
                } else {
                    CacheValue::List(map_items(list, |item| {
                        if item.id == temp_id {
                            record.clone()
                        } else {
                            item.clone()
                        }
                    }))
                }
            }
            other => other.clone(),
        });
    }
    if cache.remove(&QueryKey::detail(collection, temp_id)).is_some() {
        cache.write(
            QueryKey::detail(collection, &record.id),
            CacheValue::Record(record.clone()),
        );
        changed += 1;
    }
    changed
}

/// Insert `record` where absent and merge its fields where present.
///
/// Lists gain the record; a cached detail view is merged. Applying the same
/// record twice leaves the cache as applying it once.
pub fn upsert_into_views(cache: &dyn Cache, collection: &str, record: &Record) -> usize {
    let mut changed = 0;
    for key in list_keys(cache, collection) {
        cache.update(&key, &mut |value| match value {
            CacheValue::List(list) => {
                changed += 1;
                if list.contains(&record.id) {
                    CacheValue::List(map_items(list, |item| {
                        if item.id == record.id {
                            item.merged(&record.fields)
                        } else {
                            item.clone()
                        }
                    }))
                } else {
                    let mut next = list.clone();
                    next.items.push(record.clone());
                    next.total_items += 1;
                    CacheValue::List(next)
                }
            }
            other => other.clone(),
        });
    }
    let detail = QueryKey::detail(collection, &record.id);
    if cache.update(&detail, &mut |value| match value {
        CacheValue::Record(existing) => CacheValue::Record(existing.merged(&record.fields)),
        other => other.clone(),
    }) {
        changed += 1;
    }
    changed
}

/// Apply a server push event straight to the cache, with no ledger
/// involvement.
pub fn apply_push_event(cache: &dyn Cache, collection: &str, event: &PushEvent) -> DirectWrite {
    match event.action {
        PushAction::Create | PushAction::Update => DirectWrite::Upserted {
            views: upsert_into_views(cache, collection, &event.record),
        },
        PushAction::Delete => DirectWrite::Removed {
            views: remove_from_views(cache, collection, &event.record.id),
        },
        PushAction::Unknown => {
            cache.invalidate(collection);
            DirectWrite::Invalidated
        }
    }
}

fn map_items(list: &ListResult, f: impl Fn(&Record) -> Record) -> ListResult {
    ListResult {
        page: list.page,
        per_page: list.per_page,
        total_items: list.total_items,
        items: list.items.iter().map(f).collect(),
    }
}
