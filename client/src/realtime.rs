//! Realtime reconciliation of server push events.
//!
//! A push event either lands in the cache through the direct-write path, or,
//! when a local mutation on the same record is still pending, is deferred.
//! Deferred events are replayed or dropped according to
//! [`DeferredEventPolicy`]. The reconciler never fails outward: malformed
//! events are logged and skipped.
//!
//! [`subscribe`] keeps one topic subscription alive on a [`PushChannel`],
//! reconnecting with exponential backoff.

use crate::config::DeferredEventPolicy;
use crate::context::SyncContext;
use crate::error::SubscribeError;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::StreamExt;
use optimist_engine::{views, CollectionName, DirectWrite, PushEvent, RecordId};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// What a subscription listens to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Every record of a collection (list views)
    Collection(CollectionName),
    /// One record (detail views)
    Record {
        collection: CollectionName,
        record_id: RecordId,
    },
}

impl Topic {
    pub fn collection(name: impl Into<CollectionName>) -> Self {
        Topic::Collection(name.into())
    }

    pub fn record(collection: impl Into<CollectionName>, record_id: impl Into<RecordId>) -> Self {
        Topic::Record {
            collection: collection.into(),
            record_id: record_id.into(),
        }
    }

    /// The collection this topic belongs to.
    pub fn collection_name(&self) -> &str {
        match self {
            Topic::Collection(name) => name,
            Topic::Record { collection, .. } => collection,
        }
    }

    /// Whether an event on `record_id` in `collection` is delivered on this topic.
    pub fn covers(&self, collection: &str, record_id: &str) -> bool {
        match self {
            Topic::Collection(name) => name == collection,
            Topic::Record {
                collection: c,
                record_id: r,
            } => c == collection && r == record_id,
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Collection(name) => write!(f, "{name}"),
            Topic::Record {
                collection,
                record_id,
            } => write!(f, "{collection}/{record_id}"),
        }
    }
}

/// The real-time channel a subscription reads from.
///
/// A successful subscribe yields a stream of raw JSON push events; the stream
/// ending means the connection dropped.
pub trait PushChannel: Send + Sync + 'static {
    fn subscribe(
        &self,
        topic: &Topic,
    ) -> BoxFuture<'static, Result<BoxStream<'static, String>, SubscribeError>>;
}

/// What became of one push event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    /// Written to the cache directly
    Applied(DirectWrite),
    /// Queued until the conflicting operation settles
    Deferred,
    /// Discarded because of a conflict
    Dropped,
    /// Could not be decoded
    Malformed,
}

/// Applies push events to a context's cache.
#[derive(Debug, Clone)]
pub struct RealtimeReconciler {
    ctx: Arc<SyncContext>,
}

impl RealtimeReconciler {
    pub fn new(ctx: Arc<SyncContext>) -> Self {
        Self { ctx }
    }

    /// Decode and handle one raw event received for `collection`.
    pub fn handle_message(&self, collection: &str, text: &str) -> Reconciled {
        match PushEvent::parse(text) {
            Ok(event) => self.handle_event(collection, event),
            Err(err) => {
                tracing::warn!(collection = %collection, error = %err, "Dropping malformed push event");
                Reconciled::Malformed
            }
        }
    }

    /// Handle one decoded event for `collection`.
    pub fn handle_event(&self, collection: &str, event: PushEvent) -> Reconciled {
        let record_id = event.record_id().to_string();
        if !self.ctx.has_conflict(collection, Some(&record_id)) {
            let outcome = views::apply_push_event(self.ctx.cache(), collection, &event);
            tracing::debug!(
                collection = %collection,
                record_id = %record_id,
                action = ?event.action,
                outcome = ?outcome,
                "Applied push event"
            );
            return Reconciled::Applied(outcome);
        }

        self.ctx.note_conflict(collection, &record_id, "realtime");
        match self.ctx.config().deferred_events {
            DeferredEventPolicy::Replay => {
                tracing::debug!(
                    collection = %collection,
                    record_id = %record_id,
                    action = ?event.action,
                    "Deferring push event until pending mutation settles"
                );
                self.ctx.deferred().push(collection, event);
                // the operation may have settled between the check and the push,
                // after its own replay ran
                if !self.ctx.has_conflict(collection, Some(&record_id)) {
                    self.ctx.replay_deferred(collection, &record_id, None);
                }
                Reconciled::Deferred
            }
            DeferredEventPolicy::Drop => {
                tracing::debug!(
                    collection = %collection,
                    record_id = %record_id,
                    action = ?event.action,
                    "Dropping push event for record with pending mutation"
                );
                Reconciled::Dropped
            }
        }
    }
}

/// Connection state of a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionState {
    Connecting,
    Connected,
    /// Waiting `delay` before retry number `attempt` (1-based)
    Retrying {
        attempt: u32,
        delay: Duration,
    },
    /// Retries exhausted; the subscription has stopped
    Failed,
}

/// Handle to a running subscription. Dropping it unsubscribes.
#[derive(Debug)]
pub struct SubscriptionHandle {
    topic: Topic,
    state: watch::Receiver<SubscriptionState>,
    task: JoinHandle<()>,
}

impl SubscriptionHandle {
    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// The most recent connection state.
    pub fn state(&self) -> SubscriptionState {
        self.state.borrow().clone()
    }

    /// Wait until the state satisfies `pred`. Returns the matching state, or
    /// `None` if the subscription task has ended without reaching it.
    pub async fn wait_for(
        &mut self,
        pred: impl FnMut(&SubscriptionState) -> bool,
    ) -> Option<SubscriptionState> {
        self.state.wait_for(pred).await.ok().map(|s| s.clone())
    }

    /// Stop the subscription.
    pub fn unsubscribe(self) {
        self.task.abort();
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Subscribe to `topic` and feed its events through the context's reconciler.
///
/// The subscription reconnects after failed subscribes and dropped streams,
/// waiting `min(base * 2^n, max)` before retry `n + 1`, and gives up after
/// `max_retries` consecutive failures. Because events may be missed while
/// disconnected, every reconnect invalidates the topic's collection.
pub fn subscribe(
    ctx: Arc<SyncContext>,
    channel: Arc<dyn PushChannel>,
    topic: Topic,
) -> SubscriptionHandle {
    let (state_tx, state_rx) = watch::channel(SubscriptionState::Connecting);
    let task = tokio::spawn(run_subscription(ctx, channel, topic.clone(), state_tx));
    SubscriptionHandle {
        topic,
        state: state_rx,
        task,
    }
}

async fn run_subscription(
    ctx: Arc<SyncContext>,
    channel: Arc<dyn PushChannel>,
    topic: Topic,
    state: watch::Sender<SubscriptionState>,
) {
    let reconciler = ctx.reconciler();
    let realtime = ctx.config().realtime.clone();
    let collection = topic.collection_name().to_string();
    let mut failures: u32 = 0;
    let mut connected_before = false;

    loop {
        state.send_replace(SubscriptionState::Connecting);
        match channel.subscribe(&topic).await {
            Ok(mut stream) => {
                failures = 0;
                if connected_before {
                    tracing::info!(topic = %topic, "Resubscribed; invalidating cached views");
                    ctx.cache().invalidate(&collection);
                } else {
                    tracing::info!(topic = %topic, "Subscribed");
                }
                connected_before = true;
                state.send_replace(SubscriptionState::Connected);

                while let Some(text) = stream.next().await {
                    reconciler.handle_message(&collection, &text);
                }
                tracing::warn!(topic = %topic, "Push stream ended");
            }
            Err(err) => {
                tracing::warn!(topic = %topic, error = %err, attempt = failures + 1, "Subscribe failed");
            }
        }

        if failures >= realtime.max_retries {
            tracing::error!(topic = %topic, retries = failures, "Giving up on subscription");
            state.send_replace(SubscriptionState::Failed);
            return;
        }

        let delay = realtime.backoff(failures);
        failures += 1;
        state.send_replace(SubscriptionState::Retrying {
            attempt: failures,
            delay,
        });
        tokio::time::sleep(delay).await;
    }
}
