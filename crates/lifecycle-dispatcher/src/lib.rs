//! Idempotent lifecycle notification dispatch.
//!
//! This crate provides:
//! - IdempotencyGate: atomic claim/release over persisted (user, trigger) flags
//! - Dispatcher: claim, then send and confirm/release in a detached task
//! - LifecycleEngine: interactive entitlement, module and reminder checks
//! - BatchDispatcher: paced sweep over every trialing user
//! - HttpNotifier: transactional-messaging provider client
//!
//! Interactive checks and the sweep share one trigger registry and one gate.
//! The store's conditional update is the only synchronization between them,
//! so they may run in different processes.

mod dispatch;
mod engine;
mod error;
mod gate;
mod notifier;
mod store;
mod sweep;

pub use dispatch::{DeliveryOutcome, DispatchAttempt, Dispatcher, PendingDelivery};
pub use engine::{EntitlementReport, LifecycleEngine, ModuleCheck};
pub use error::{DispatchError, DispatchResult, NotifierError, NotifierResult, StoreError, StoreResult};
pub use gate::{ClaimOutcome, IdempotencyGate};
pub use notifier::{
    HttpNotifier, HttpNotifierConfig, NotificationMessage, Notifier, Recipient, RecordingNotifier,
};
pub use store::{ActivityLog, LifecycleStore, SqliteStore};
pub use sweep::{BatchDispatcher, SweepFailure, SweepReport};
