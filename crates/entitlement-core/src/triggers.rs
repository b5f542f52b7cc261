//! Lifecycle notification trigger registry.
//!
//! One static table drives both the interactive status path and the batch
//! sweep. Each rule names a [`TriggerId`] (also the storage key for its
//! sent flag), a predicate over the derived entitlement state, and the
//! message template handed to the notifier.
//!
//! Two predicate styles exist:
//!
//! - **Catch-up**: true forever once a threshold is crossed. Combined with
//!   the sent flag this fires exactly once whenever the user is next seen.
//! - **Exact-day**: true only while `days_remaining` equals one value. A
//!   user who is not evaluated during that day never receives the message.

use crate::{CoreError, CoreResult, EntitlementState, SECOND_MODULE};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;

/// Closed set of lifecycle triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerId {
    Welcome,
    Day2,
    Day3,
    Day4,
    Day5,
    Day6,
    Day7,
    Day8,
    Day9,
    Day10,
    ModuleUnlock,
}

impl TriggerId {
    pub const ALL: [TriggerId; 11] = [
        Self::Welcome,
        Self::Day2,
        Self::Day3,
        Self::Day4,
        Self::Day5,
        Self::Day6,
        Self::Day7,
        Self::Day8,
        Self::Day9,
        Self::Day10,
        Self::ModuleUnlock,
    ];

    /// Stable storage key.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Welcome => "welcome",
            Self::Day2 => "day2",
            Self::Day3 => "day3",
            Self::Day4 => "day4",
            Self::Day5 => "day5",
            Self::Day6 => "day6",
            Self::Day7 => "day7",
            Self::Day8 => "day8",
            Self::Day9 => "day9",
            Self::Day10 => "day10",
            Self::ModuleUnlock => "module_unlock",
        }
    }
}

impl FromStr for TriggerId {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        Self::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| CoreError::UnknownTrigger(s.to_string()))
    }
}

impl std::fmt::Display for TriggerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a rule's predicate behaves over time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredicateStyle {
    CatchUp,
    ExactDay,
}

/// Everything a predicate may look at.
#[derive(Debug, Clone, Copy)]
pub struct TriggerContext<'a> {
    pub entitlement: &'a EntitlementState,
    pub unlocked_modules: &'a BTreeSet<u32>,
}

/// A single declarative rule.
pub struct TriggerRule {
    pub id: TriggerId,
    pub style: PredicateStyle,
    pub predicate: fn(&TriggerContext<'_>) -> bool,
    /// Template key understood by the messaging provider.
    pub template: &'static str,
}

impl std::fmt::Debug for TriggerRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriggerRule")
            .field("id", &self.id)
            .field("style", &self.style)
            .field("template", &self.template)
            .finish()
    }
}

impl TriggerRule {
    pub fn is_due(&self, ctx: &TriggerContext<'_>) -> bool {
        (self.predicate)(ctx)
    }
}

fn always(_: &TriggerContext<'_>) -> bool {
    true
}

fn on_trial_day<const DAY: i64>(ctx: &TriggerContext<'_>) -> bool {
    !ctx.entitlement.is_active && ctx.entitlement.days_remaining == crate::TRIAL_LENGTH_DAYS - DAY
}

// The no-start-date sentinel is also "expired" but sits at day zero.
fn trial_expired(ctx: &TriggerContext<'_>) -> bool {
    ctx.entitlement.trial_expired && ctx.entitlement.days_since_start >= crate::TRIAL_LENGTH_DAYS
}

fn past_day<const DAY: i64>(ctx: &TriggerContext<'_>) -> bool {
    !ctx.entitlement.is_active && ctx.entitlement.days_since_start >= DAY
}

fn second_module_unlocked(ctx: &TriggerContext<'_>) -> bool {
    ctx.unlocked_modules.contains(&SECOND_MODULE)
}

/// The registry. Order is evaluation order; there is no ordering guarantee
/// between deliveries.
pub static TRIGGER_REGISTRY: &[TriggerRule] = &[
    TriggerRule {
        id: TriggerId::Welcome,
        style: PredicateStyle::CatchUp,
        predicate: always,
        template: "welcome",
    },
    TriggerRule {
        id: TriggerId::Day2,
        style: PredicateStyle::ExactDay,
        predicate: on_trial_day::<2>,
        template: "trial-day-2",
    },
    TriggerRule {
        id: TriggerId::Day3,
        style: PredicateStyle::ExactDay,
        predicate: on_trial_day::<3>,
        template: "trial-day-3",
    },
    TriggerRule {
        id: TriggerId::Day4,
        style: PredicateStyle::ExactDay,
        predicate: on_trial_day::<4>,
        template: "trial-day-4",
    },
    TriggerRule {
        id: TriggerId::Day5,
        style: PredicateStyle::ExactDay,
        predicate: on_trial_day::<5>,
        template: "trial-day-5",
    },
    TriggerRule {
        id: TriggerId::Day6,
        style: PredicateStyle::ExactDay,
        predicate: on_trial_day::<6>,
        template: "trial-ending-tomorrow",
    },
    TriggerRule {
        id: TriggerId::Day7,
        style: PredicateStyle::CatchUp,
        predicate: trial_expired,
        template: "trial-ended",
    },
    TriggerRule {
        id: TriggerId::Day8,
        style: PredicateStyle::CatchUp,
        predicate: past_day::<8>,
        template: "trial-follow-up-8",
    },
    TriggerRule {
        id: TriggerId::Day9,
        style: PredicateStyle::CatchUp,
        predicate: past_day::<9>,
        template: "trial-follow-up-9",
    },
    TriggerRule {
        id: TriggerId::Day10,
        style: PredicateStyle::CatchUp,
        predicate: past_day::<10>,
        template: "trial-final-offer",
    },
    TriggerRule {
        id: TriggerId::ModuleUnlock,
        style: PredicateStyle::CatchUp,
        predicate: second_module_unlocked,
        template: "module-unlocked",
    },
];

/// Look up the rule for a trigger.
pub fn find_rule(id: TriggerId) -> Option<&'static TriggerRule> {
    TRIGGER_REGISTRY.iter().find(|rule| rule.id == id)
}

/// Rules whose predicate holds for `ctx`. Sent flags are not consulted;
/// the gate decides who actually sends.
pub fn evaluate_triggers(ctx: &TriggerContext<'_>) -> Vec<&'static TriggerRule> {
    TRIGGER_REGISTRY.iter().filter(|rule| rule.is_due(ctx)).collect()
}
