//! In-process push hub.
//!
//! Tracks subscribers per topic and fans published events out to them. Serves
//! as the [`PushChannel`] for single-process deployments and tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use futures::future::{self, BoxFuture, FutureExt};
use futures::stream::{self, BoxStream, StreamExt};
use optimist_engine::PushEvent;
use tokio::sync::mpsc;

use crate::error::SubscribeError;
use crate::realtime::{PushChannel, Topic};

/// Sender for raw push events.
pub type EventSender = mpsc::UnboundedSender<String>;

/// A single subscriber.
#[derive(Debug)]
pub struct Subscriber {
    /// Unique identifier for this subscriber
    pub id: String,
    /// What the subscriber listens to
    pub topic: Topic,
    /// Channel to deliver events on
    pub sender: EventSender,
}

/// Manages push subscribers.
///
/// Thread-safe and can be shared via `Arc`.
#[derive(Debug)]
pub struct PushHub {
    /// All subscribers, keyed by subscriber ID.
    subscribers: DashMap<String, Subscriber>,
    /// Index of subscriber IDs by collection for fan-out.
    by_collection: DashMap<String, Vec<String>>,
    /// Whether new subscriptions are accepted.
    available: AtomicBool,
}

impl Default for PushHub {
    fn default() -> Self {
        Self {
            subscribers: DashMap::new(),
            by_collection: DashMap::new(),
            available: AtomicBool::new(true),
        }
    }
}

impl PushHub {
    /// Create a new hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new hub wrapped in Arc for sharing.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Register a subscriber.
    ///
    /// Returns the subscriber ID.
    pub fn register(&self, topic: Topic, sender: EventSender) -> String {
        let sub_id = uuid::Uuid::new_v4().to_string();
        let collection = topic.collection_name().to_string();

        self.subscribers.insert(
            sub_id.clone(),
            Subscriber {
                id: sub_id.clone(),
                topic: topic.clone(),
                sender,
            },
        );
        self.by_collection
            .entry(collection)
            .or_default()
            .push(sub_id.clone());

        tracing::info!(sub_id = %sub_id, topic = %topic, "Push subscriber registered");

        sub_id
    }

    /// Unregister a subscriber.
    pub fn unregister(&self, sub_id: &str) {
        if let Some((_, sub)) = self.subscribers.remove(sub_id) {
            let collection = sub.topic.collection_name();
            if let Some(mut ids) = self.by_collection.get_mut(collection) {
                ids.retain(|id| id != sub_id);
                if ids.is_empty() {
                    drop(ids);
                    self.by_collection.remove_if(collection, |_, ids| ids.is_empty());
                }
            }

            tracing::info!(sub_id = %sub_id, topic = %sub.topic, "Push subscriber unregistered");
        }
    }

    /// Publish `event` on `collection`.
    ///
    /// Reaches collection subscribers and record subscribers for the event's
    /// record. Subscribers whose receiver is gone are pruned. Returns the
    /// number of subscribers that received the event.
    pub fn publish(&self, collection: &str, event: &PushEvent) -> usize {
        match event.to_json() {
            Ok(text) => self.publish_raw(collection, event.record_id(), &text),
            Err(err) => {
                tracing::error!(collection = %collection, error = %err, "Failed to encode push event");
                0
            }
        }
    }

    /// Publish pre-encoded text as if it concerned `record_id`.
    pub fn publish_raw(&self, collection: &str, record_id: &str, text: &str) -> usize {
        let ids: Vec<String> = self
            .by_collection
            .get(collection)
            .map(|ids| ids.clone())
            .unwrap_or_default();

        let mut sent_count = 0;
        let mut closed = Vec::new();
        for id in ids {
            let Some(sub) = self.subscribers.get(&id) else {
                continue;
            };
            if !sub.topic.covers(collection, record_id) {
                continue;
            }
            if sub.sender.send(text.to_string()).is_ok() {
                sent_count += 1;
            } else {
                closed.push(id.clone());
            }
        }

        for id in closed {
            self.unregister(&id);
        }

        tracing::debug!(
            collection = %collection,
            record_id = %record_id,
            recipients = sent_count,
            "Published push event"
        );

        sent_count
    }

    /// Accept or refuse new subscriptions.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Drop every subscriber, ending their streams.
    pub fn disconnect_all(&self) {
        let ids: Vec<String> = self.subscribers.iter().map(|s| s.key().clone()).collect();
        for id in ids {
            self.unregister(&id);
        }
    }

    /// Get the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Get the number of collections with at least one subscriber.
    pub fn collection_count(&self) -> usize {
        self.by_collection.len()
    }
}

impl PushChannel for PushHub {
    fn subscribe(
        &self,
        topic: &Topic,
    ) -> BoxFuture<'static, Result<BoxStream<'static, String>, SubscribeError>> {
        if !self.available.load(Ordering::SeqCst) {
            return future::ready(Err(SubscribeError::Unavailable(
                "push hub is not accepting subscriptions".into(),
            )))
            .boxed();
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.register(topic.clone(), tx);
        let events = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|text| (text, rx))
        })
        .boxed();
        future::ready(Ok(events)).boxed()
    }
}
