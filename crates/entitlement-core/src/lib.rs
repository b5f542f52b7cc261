//! Pure domain logic for the onboarding lifecycle engine.
//!
//! Everything in this crate is a function of its inputs: no clock reads,
//! no storage, no network. Callers pass `now` explicitly.
//!
//! - [`compute_entitlement`]: trial/subscription facts → [`EntitlementState`]
//! - [`resolve_modules`]: which content modules should be unlocked
//! - [`TRIGGER_REGISTRY`]: declarative lifecycle notification rules
//! - [`needs_activity_reminder`]: advisory "come back" signal

pub mod activity;
pub mod clock;
pub mod entitlement;
mod error;
pub mod modules;
mod status;
pub mod triggers;

pub use activity::{needs_activity_reminder, REMINDER_IDLE_HOURS};
pub use clock::{Clock, FixedClock, SystemClock};
pub use entitlement::{compute_entitlement, EntitlementInput, EntitlementState, TRIAL_LENGTH_DAYS};
pub use error::{CoreError, CoreResult};
pub use modules::{resolve_modules, ModuleResolution, BASE_MODULE, MODULE_TWO_UNLOCK_DAYS, SECOND_MODULE};
pub use status::SubscriptionStatus;
pub use triggers::{
    evaluate_triggers, find_rule, PredicateStyle, TriggerContext, TriggerId, TriggerRule,
    TRIGGER_REGISTRY,
};
