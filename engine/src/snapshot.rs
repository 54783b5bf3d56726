//! Point-in-time copies of cache entries, used to roll back optimistic writes.
//!
//! A snapshot records the exact prior state of every key it covers, including
//! absence. [`CacheSnapshot::restore`] writes those values back verbatim.
//! [`CacheSnapshot::restore_record`] reverts a single record on top of the
//! views' current contents, leaving every other record as it is now.

use crate::{Cache, CacheValue, ListResult, QueryKey};

/// Prior state of a set of cache keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheSnapshot {
    entries: Vec<(QueryKey, Option<CacheValue>)>,
}

impl CacheSnapshot {
    /// Capture the current value of each key in `keys`.
    ///
    /// Duplicate keys are captured once.
    pub fn capture<'a>(cache: &dyn Cache, keys: impl IntoIterator<Item = &'a QueryKey>) -> Self {
        let mut entries: Vec<(QueryKey, Option<CacheValue>)> = Vec::new();
        for key in keys {
            if entries.iter().any(|(k, _)| k == key) {
                continue;
            }
            entries.push((key.clone(), cache.read(key)));
        }
        Self { entries }
    }

    /// Keys covered by this snapshot.
    pub fn keys(&self) -> impl Iterator<Item = &QueryKey> {
        self.entries.iter().map(|(k, _)| k)
    }

    /// The captured value for `key`. `None` if the key is not covered;
    /// `Some(None)` if it was absent at capture time.
    pub fn get(&self, key: &QueryKey) -> Option<Option<&CacheValue>> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_ref())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write every captured value back. Keys that were absent are removed.
    pub fn restore(&self, cache: &dyn Cache) {
        for (key, value) in &self.entries {
            match value {
                Some(value) => cache.write(key.clone(), value.clone()),
                None => {
                    cache.remove(key);
                }
            }
        }
    }

    /// Revert only `record_id` to its captured state.
    ///
    /// In each covered list that is still cached, the record is put back at
    /// its captured position (or removed if it was not there), and
    /// `total_items` moves with it. The record's detail view is written back
    /// or removed. Lists that were absent at capture time, and lists evicted
    /// since, are left alone.
    pub fn restore_record(&self, cache: &dyn Cache, record_id: &str) {
        for (key, captured) in &self.entries {
            if key.is_list() {
                let Some(CacheValue::List(prior)) = captured else {
                    continue;
                };
                cache.update(key, &mut |value| match value {
                    CacheValue::List(current) => {
                        CacheValue::List(revert_item(prior, current, record_id))
                    }
                    other => other.clone(),
                });
            } else if key.detail_id() == Some(record_id) {
                match captured {
                    Some(value) => cache.write(key.clone(), value.clone()),
                    None => {
                        cache.remove(key);
                    }
                }
            }
        }
    }
}

fn revert_item(prior: &ListResult, current: &ListResult, record_id: &str) -> ListResult {
    let mut next = current.clone();
    let was = prior.items.iter().position(|item| item.id == record_id);
    let now = next.items.iter().position(|item| item.id == record_id);
    match (was, now) {
        (Some(was), Some(now)) => next.items[now] = prior.items[was].clone(),
        (Some(was), None) => {
            let at = was.min(next.items.len());
            next.items.insert(at, prior.items[was].clone());
            next.total_items += 1;
        }
        (None, Some(now)) => {
            next.items.remove(now);
            next.total_items = next.total_items.saturating_sub(1);
        }
        (None, None) => {}
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ListResult, MemoryCache, Record};

    #[test]
    fn restore_reverts_writes_and_removals() {
        let cache = MemoryCache::new();
        let list = QueryKey::list_all("patients");
        let detail = QueryKey::detail("patients", "r1");
        let absent = QueryKey::detail("patients", "r2");

        let original = CacheValue::List(ListResult::from_items(vec![Record::new("r1")]));
        cache.write(list.clone(), original.clone());
        cache.write(detail.clone(), CacheValue::Record(Record::new("r1")));

        let snapshot = CacheSnapshot::capture(&cache, [&list, &detail, &absent]);
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot.get(&absent), Some(None));
        assert_eq!(snapshot.get(&QueryKey::list_all("other")), None);

        cache.write(list.clone(), CacheValue::List(ListResult::empty()));
        cache.remove(&detail);
        cache.write(absent.clone(), CacheValue::Record(Record::new("r2")));

        snapshot.restore(&cache);
        assert_eq!(cache.read(&list), Some(original));
        assert_eq!(
            cache.read(&detail),
            Some(CacheValue::Record(Record::new("r1")))
        );
        assert!(cache.read(&absent).is_none());
    }

    fn list_of(cache: &MemoryCache) -> ListResult {
        match cache.read(&QueryKey::list_all("patients")) {
            Some(CacheValue::List(list)) => list,
            other => panic!("expected list, got {other:?}"),
        }
    }

    #[test]
    fn restore_record_keeps_other_records_current() {
        let cache = MemoryCache::new();
        let list = QueryKey::list_all("patients");
        cache.write(
            list.clone(),
            CacheValue::List(ListResult::from_items(vec![
                Record::new("r1").with_field("name", "Old"),
                Record::new("r2").with_field("name", "Old"),
                Record::new("temp-1"),
            ])),
        );
        let snapshot = CacheSnapshot::capture(&cache, [&list]);

        // r1 is edited by the operation being reverted, r2 and temp-1 by others
        cache.write(
            list.clone(),
            CacheValue::List(ListResult::from_items(vec![
                Record::new("r1").with_field("name", "Rejected"),
                Record::new("r2").with_field("name", "Committed"),
                Record::new("srv-1"),
            ])),
        );
        snapshot.restore_record(&cache, "r1");

        let restored = list_of(&cache);
        assert_eq!(restored.ids(), vec!["r1", "r2", "srv-1"]);
        assert_eq!(restored.get("r1").unwrap().get("name"), Some(&serde_json::json!("Old")));
        assert_eq!(
            restored.get("r2").unwrap().get("name"),
            Some(&serde_json::json!("Committed"))
        );
    }

    #[test]
    fn restore_record_reinserts_and_removes() {
        let cache = MemoryCache::new();
        let list = QueryKey::list_all("patients");
        let detail = QueryKey::detail("patients", "r2");
        cache.write(
            list.clone(),
            CacheValue::List(ListResult::from_items(vec![
                Record::new("r1"),
                Record::new("r2"),
                Record::new("r3"),
            ])),
        );
        cache.write(detail.clone(), CacheValue::Record(Record::new("r2")));
        let snapshot = CacheSnapshot::capture(&cache, [&list, &detail]);

        // r2 deleted, temp-9 appended
        let mut current = ListResult::from_items(vec![Record::new("r1"), Record::new("r3")]);
        current.items.push(Record::new("temp-9"));
        current.total_items += 1;
        cache.write(list.clone(), CacheValue::List(current));
        cache.remove(&detail);

        snapshot.restore_record(&cache, "r2");
        let after = list_of(&cache);
        assert_eq!(after.ids(), vec!["r1", "r2", "r3", "temp-9"]);
        assert_eq!(after.total_items, 4);
        assert_eq!(cache.read(&detail), Some(CacheValue::Record(Record::new("r2"))));

        snapshot.restore_record(&cache, "temp-9");
        let after = list_of(&cache);
        assert_eq!(after.ids(), vec!["r1", "r2", "r3"]);
        assert_eq!(after.total_items, 3);
    }

    #[test]
    fn restore_record_skips_evicted_lists() {
        let cache = MemoryCache::new();
        let list = QueryKey::list_all("patients");
        cache.write(
            list.clone(),
            CacheValue::List(ListResult::from_items(vec![Record::new("r1")])),
        );
        let snapshot = CacheSnapshot::capture(&cache, [&list]);
        cache.remove(&list);

        snapshot.restore_record(&cache, "r1");
        assert!(cache.read(&list).is_none());
    }

    #[test]
    fn capture_dedups_keys() {
        let cache = MemoryCache::new();
        let key = QueryKey::list_all("patients");
        let snapshot = CacheSnapshot::capture(&cache, [&key, &key]);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.keys().count(), 1);
    }

    #[test]
    fn empty_snapshot_restores_nothing() {
        let cache = MemoryCache::new();
        let key = QueryKey::list_all("patients");
        cache.write(key.clone(), CacheValue::List(ListResult::empty()));

        let snapshot = CacheSnapshot::default();
        assert!(snapshot.is_empty());
        snapshot.restore(&cache);
        assert!(cache.read(&key).is_some());
    }
}
