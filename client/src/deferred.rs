//! Push events held back while a local mutation on the same record is pending.

use dashmap::DashMap;
use optimist_engine::{CollectionName, PushEvent, RecordId};

/// Per-record FIFO queues of deferred push events.
#[derive(Debug, Default)]
pub struct DeferredEvents {
    queues: DashMap<(CollectionName, RecordId), Vec<PushEvent>>,
}

impl DeferredEvents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `event` behind any already deferred for the same record.
    pub fn push(&self, collection: &str, event: PushEvent) {
        self.queues
            .entry((collection.to_string(), event.record.id.clone()))
            .or_default()
            .push(event);
    }

    /// Remove and return the queue for one record, oldest first.
    pub fn take(&self, collection: &str, record_id: &str) -> Vec<PushEvent> {
        self.queues
            .remove(&(collection.to_string(), record_id.to_string()))
            .map(|(_, events)| events)
            .unwrap_or_default()
    }

    /// Number of events waiting for one record.
    pub fn queued_for(&self, collection: &str, record_id: &str) -> usize {
        self.queues
            .get(&(collection.to_string(), record_id.to_string()))
            .map_or(0, |events| events.len())
    }

    /// Total number of deferred events.
    pub fn len(&self) -> usize {
        self.queues.iter().map(|q| q.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use optimist_engine::Record;

    #[test]
    fn queues_are_per_record_and_ordered() {
        let deferred = DeferredEvents::new();
        deferred.push("patients", PushEvent::update(Record::new("r1").with_field("n", 1)));
        deferred.push("patients", PushEvent::update(Record::new("r2").with_field("n", 2)));
        deferred.push("patients", PushEvent::update(Record::new("r1").with_field("n", 3)));
        deferred.push("appointments", PushEvent::delete("r1"));

        assert_eq!(deferred.len(), 4);
        assert_eq!(deferred.queued_for("patients", "r1"), 2);

        let r1 = deferred.take("patients", "r1");
        let ns: Vec<_> = r1.iter().map(|e| e.record.get("n").cloned()).collect();
        assert_eq!(ns, vec![Some(1.into()), Some(3.into())]);

        assert!(deferred.take("patients", "r1").is_empty());
        assert_eq!(deferred.len(), 2);
    }
}
