//! Periodic TTL sweep of the operation ledger.

use crate::context::SyncContext;
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

/// Handle to the background sweeper. Dropping it stops the sweeper.
#[derive(Debug)]
pub struct SweeperHandle {
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stop sweeping.
    pub fn stop(self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Run [`SyncContext::sweep`] every `sweep_interval`.
///
/// The first sweep happens one interval after spawning. The task holds only a
/// weak reference and exits once the context is dropped.
pub fn spawn_sweeper(ctx: &Arc<SyncContext>) -> SweeperHandle {
    let period = ctx.config().sweep_interval;
    let weak: Weak<SyncContext> = Arc::downgrade(ctx);

    let task = tokio::spawn(async move {
        let mut ticker = time::interval_at(time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let Some(ctx) = weak.upgrade() else {
                tracing::debug!("Context dropped; sweeper exiting");
                return;
            };
            ctx.sweep();
        }
    });

    SweeperHandle { task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteError;
    use crate::remote::RemoteStore;
    use futures::future::{self, BoxFuture, FutureExt};
    use optimist_engine::{ManualClock, Operation, Record};
    use serde_json::{json, Value};
    use std::time::Duration;

    struct Unused;

    impl RemoteStore for Unused {
        fn create(&self, _: &str, _: Value) -> BoxFuture<'static, Result<Record, RemoteError>> {
            future::pending().boxed()
        }
        fn update(&self, _: &str, _: &str, _: Value) -> BoxFuture<'static, Result<Record, RemoteError>> {
            future::pending().boxed()
        }
        fn delete(&self, _: &str, _: &str) -> BoxFuture<'static, Result<(), RemoteError>> {
            future::pending().boxed()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn sweeps_on_interval() {
        let clock = Arc::new(ManualClock::new(0));
        let ctx = SyncContext::builder(Arc::new(Unused))
            .clock(clock.clone())
            .build();
        ctx.ledger()
            .add(Operation::update("op-1", "patients", "r1", json!({}), 0));
        let _sweeper = spawn_sweeper(&ctx);

        // first tick: not yet expired
        clock.set(60_000);
        time::sleep(Duration::from_secs(61)).await;
        assert_eq!(ctx.ledger().len(), 1);

        clock.set(300_001);
        time::sleep(Duration::from_secs(60)).await;
        assert!(ctx.ledger().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_halts_sweeping() {
        let clock = Arc::new(ManualClock::new(0));
        let ctx = SyncContext::builder(Arc::new(Unused))
            .clock(clock.clone())
            .build();
        ctx.ledger()
            .add(Operation::update("op-1", "patients", "r1", json!({}), 0));

        spawn_sweeper(&ctx).stop();
        clock.set(300_001);
        time::sleep(Duration::from_secs(121)).await;
        assert_eq!(ctx.ledger().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exits_when_context_dropped() {
        let ctx = SyncContext::builder(Arc::new(Unused)).build();
        let sweeper = spawn_sweeper(&ctx);
        drop(ctx);
        time::sleep(Duration::from_secs(61)).await;
        assert!(sweeper.is_finished());
    }
}
