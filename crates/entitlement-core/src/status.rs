//! Subscription status as persisted on the user record.

use serde::{Deserialize, Serialize};

/// Subscription status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    None,
    Trialing,
    Active,
    Canceled,
    TrialEnded,
}

impl Default for SubscriptionStatus {
    fn default() -> Self {
        Self::None
    }
}

impl SubscriptionStatus {
    /// Stored spellings the batch sweep re-evaluates, including the legacy
    /// `trial`. The candidate query is built from this list.
    pub const SWEEP_CANDIDATE_SPELLINGS: [&'static str; 3] = ["trialing", "trial", "trial_ended"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Trialing => "trialing",
            Self::Active => "active",
            Self::Canceled => "canceled",
            Self::TrialEnded => "trial_ended",
        }
    }

    /// Lenient parse of a stored status. `trial` is a legacy spelling of
    /// `trialing`; anything unrecognized is treated as `none`.
    pub fn from_str(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "trialing" | "trial" => Self::Trialing,
            "active" => Self::Active,
            "canceled" | "cancelled" => Self::Canceled,
            "trial_ended" => Self::TrialEnded,
            _ => Self::None,
        }
    }

    /// Statuses the batch sweep re-evaluates.
    pub fn is_sweep_candidate(&self) -> bool {
        Self::SWEEP_CANDIDATE_SPELLINGS.contains(&self.as_str())
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_str_accepts_legacy_trial_spelling() {
        assert_eq!(SubscriptionStatus::from_str("trial"), SubscriptionStatus::Trialing);
        assert_eq!(SubscriptionStatus::from_str("TRIALING"), SubscriptionStatus::Trialing);
        assert_eq!(SubscriptionStatus::from_str("trial_ended"), SubscriptionStatus::TrialEnded);
    }

    #[test]
    fn from_str_unknown_defaults_to_none() {
        assert_eq!(SubscriptionStatus::from_str(""), SubscriptionStatus::None);
        assert_eq!(SubscriptionStatus::from_str("paused"), SubscriptionStatus::None);
    }

    #[test]
    fn as_str_roundtrips_through_from_str() {
        for status in [
            SubscriptionStatus::None,
            SubscriptionStatus::Trialing,
            SubscriptionStatus::Active,
            SubscriptionStatus::Canceled,
            SubscriptionStatus::TrialEnded,
        ] {
            assert_eq!(SubscriptionStatus::from_str(status.as_str()), status);
        }
    }

    #[test]
    fn sweep_candidates() {
        assert!(SubscriptionStatus::Trialing.is_sweep_candidate());
        assert!(SubscriptionStatus::TrialEnded.is_sweep_candidate());
        assert!(!SubscriptionStatus::Active.is_sweep_candidate());
        assert!(!SubscriptionStatus::Canceled.is_sweep_candidate());
        assert!(!SubscriptionStatus::None.is_sweep_candidate());
    }

    #[test]
    fn every_sweep_spelling_parses_to_a_candidate() {
        for spelling in SubscriptionStatus::SWEEP_CANDIDATE_SPELLINGS {
            assert!(SubscriptionStatus::from_str(spelling).is_sweep_candidate(), "{spelling}");
        }
    }
}
