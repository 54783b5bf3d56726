//! # Optimist Client
//!
//! The async runtime around [`optimist_engine`]: mutation hooks that write to
//! the cache before the server answers, a realtime reconciler that keeps push
//! events from clobbering in-flight work, and a housekeeping sweeper that
//! prunes operations whose settlement never arrived.
//!
//! ## Quick Start
//!
//! ```no_run
//! use optimist_client::{housekeeping, realtime, Config, PushHub, SyncContext, Topic};
//! # use optimist_client::{RemoteError, RemoteStore};
//! # use optimist_engine::{Collection, Record};
//! # use futures::future::BoxFuture;
//! # use serde::{Deserialize, Serialize};
//! # use std::sync::Arc;
//! # struct Http;
//! # impl RemoteStore for Http {
//! #     fn create(&self, _: &str, _: serde_json::Value) -> BoxFuture<'static, Result<Record, RemoteError>> { unimplemented!() }
//! #     fn update(&self, _: &str, _: &str, _: serde_json::Value) -> BoxFuture<'static, Result<Record, RemoteError>> { unimplemented!() }
//! #     fn delete(&self, _: &str, _: &str) -> BoxFuture<'static, Result<(), RemoteError>> { unimplemented!() }
//! # }
//! # #[derive(Serialize, Deserialize)] struct NewPatient { name: String }
//! # #[derive(Serialize, Deserialize)] struct PatientPatch { name: Option<String> }
//! # struct Patients;
//! # impl Collection for Patients {
//! #     const NAME: &'static str = "patients";
//! #     type Draft = NewPatient;
//! #     type Patch = PatientPatch;
//! # }
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! optimist_client::telemetry::init();
//! let config = Config::from_env()?;
//! let ctx = SyncContext::builder(Arc::new(Http)).config(config).build();
//!
//! let _sweeper = housekeeping::spawn_sweeper(&ctx);
//! let hub = PushHub::new_shared();
//! let _subscription = realtime::subscribe(ctx.clone(), hub, Topic::collection("patients"));
//!
//! let patients = ctx.collection::<Patients>();
//! let created = patients.create(&NewPatient { name: "Acme".into() }).await?;
//! println!("server id: {}", created.id);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod context;
pub mod deferred;
pub mod error;
pub mod housekeeping;
pub mod hub;
pub mod mutation;
pub mod realtime;
pub mod remote;
pub mod status;
pub mod telemetry;

pub use config::{Config, ConfigError, ConflictPolicy, DeferredEventPolicy, RealtimeConfig};
pub use context::{SyncContext, SyncContextBuilder};
pub use deferred::DeferredEvents;
pub use error::{MutationError, RemoteError, SubscribeError};
pub use housekeeping::{spawn_sweeper, SweeperHandle};
pub use hub::PushHub;
pub use mutation::{CollectionMutations, MutationPhase, PendingMutation};
pub use realtime::{
    PushChannel, Reconciled, RealtimeReconciler, SubscriptionHandle, SubscriptionState, Topic,
};
pub use remote::{RemoteOutput, RemoteStore};
