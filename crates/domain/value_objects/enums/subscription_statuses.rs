use std::fmt::Display;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Mirrors Stripe's subscription status enum.
#[derive(Default, Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    #[default]
    Incomplete,
    IncompleteExpired,
    Trialing,
    Active,
    PastDue,
    Unpaid,
    Paused,
    Canceled,
}

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("subscription cannot move from {from} to {to}")]
pub struct InvalidSubscriptionTransition {
    pub from: SubscriptionStatus,
    pub to: SubscriptionStatus,
}

impl Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Incomplete => "incomplete",
            SubscriptionStatus::IncompleteExpired => "incomplete_expired",
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Unpaid => "unpaid",
            SubscriptionStatus::Paused => "paused",
            SubscriptionStatus::Canceled => "canceled",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "incomplete" => Some(SubscriptionStatus::Incomplete),
            "incomplete_expired" => Some(SubscriptionStatus::IncompleteExpired),
            "trialing" => Some(SubscriptionStatus::Trialing),
            "active" => Some(SubscriptionStatus::Active),
            "past_due" => Some(SubscriptionStatus::PastDue),
            "unpaid" => Some(SubscriptionStatus::Unpaid),
            "paused" => Some(SubscriptionStatus::Paused),
            "canceled" => Some(SubscriptionStatus::Canceled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::Canceled | SubscriptionStatus::IncompleteExpired
        )
    }

    /// Applies an externally reported status. Redelivering the current status is accepted.
    pub fn transition(self, next: SubscriptionStatus) -> Result<Self, InvalidSubscriptionTransition> {
        if self == next {
            return Ok(next);
        }

        let allowed = !self.is_terminal() && next != SubscriptionStatus::Incomplete;
        if allowed {
            Ok(next)
        } else {
            Err(InvalidSubscriptionTransition {
                from: self,
                to: next,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_moves_forward() {
        let status = SubscriptionStatus::Incomplete
            .transition(SubscriptionStatus::Active)
            .and_then(|s| s.transition(SubscriptionStatus::PastDue))
            .and_then(|s| s.transition(SubscriptionStatus::Active))
            .and_then(|s| s.transition(SubscriptionStatus::Canceled));

        assert_eq!(status, Ok(SubscriptionStatus::Canceled));
    }

    #[test]
    fn canceled_subscription_cannot_be_revived() {
        let err = SubscriptionStatus::Canceled
            .transition(SubscriptionStatus::Active)
            .unwrap_err();

        assert_eq!(err.from, SubscriptionStatus::Canceled);
        assert_eq!(err.to, SubscriptionStatus::Active);
    }

    #[test]
    fn nothing_returns_to_incomplete() {
        assert!(SubscriptionStatus::Active
            .transition(SubscriptionStatus::Incomplete)
            .is_err());
    }

    #[test]
    fn redelivered_status_is_accepted_even_when_terminal() {
        assert_eq!(
            SubscriptionStatus::Canceled.transition(SubscriptionStatus::Canceled),
            Ok(SubscriptionStatus::Canceled)
        );
    }

    #[test]
    fn round_trips_stripe_names() {
        for raw in ["incomplete_expired", "past_due", "trialing", "paused"] {
            let status = SubscriptionStatus::from_str(raw).unwrap();
            assert_eq!(status.as_str(), raw);
        }
        assert_eq!(SubscriptionStatus::from_str("expired"), None);
    }
}
