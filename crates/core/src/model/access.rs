use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::UserId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AccessError {
    #[error("attempt quota exhausted ({used}/{limit})")]
    QuotaExceeded { used: u32, limit: u32 },
}

/// Subscription tier of the signed-in user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    /// Limited to a fixed number of attempts.
    Free,
    /// No attempt quota.
    Premium,
}

impl SubscriptionTier {
    #[must_use]
    pub fn is_quota_limited(self) -> bool {
        matches!(self, SubscriptionTier::Free)
    }
}

/// Snapshot of the current user's entitlement, taken by the caller before a session starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessSnapshot {
    pub user_id: UserId,
    pub tier: SubscriptionTier,
    pub attempts_used: u32,
    pub attempts_limit: u32,
}

impl AccessSnapshot {
    #[must_use]
    pub fn new(
        user_id: UserId,
        tier: SubscriptionTier,
        attempts_used: u32,
        attempts_limit: u32,
    ) -> Self {
        Self {
            user_id,
            tier,
            attempts_used,
            attempts_limit,
        }
    }

    /// Remaining attempts, or `None` when the tier is not quota-limited.
    #[must_use]
    pub fn remaining_attempts(&self) -> Option<u32> {
        self.tier
            .is_quota_limited()
            .then(|| self.attempts_limit.saturating_sub(self.attempts_used))
    }

    /// Checks that a new attempt may be started.
    ///
    /// # Errors
    ///
    /// Returns `AccessError::QuotaExceeded` when a quota-limited user has no attempts left.
    pub fn ensure_can_start(&self) -> Result<(), AccessError> {
        match self.remaining_attempts() {
            Some(0) => Err(AccessError::QuotaExceeded {
                used: self.attempts_used,
                limit: self.attempts_limit,
            }),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(tier: SubscriptionTier, used: u32, limit: u32) -> AccessSnapshot {
        AccessSnapshot::new(UserId::new("u"), tier, used, limit)
    }

    #[test]
    fn free_user_with_quota_left_may_start() {
        let access = snapshot(SubscriptionTier::Free, 2, 3);
        assert_eq!(access.remaining_attempts(), Some(1));
        assert!(access.ensure_can_start().is_ok());
    }

    #[test]
    fn free_user_at_limit_is_refused() {
        let access = snapshot(SubscriptionTier::Free, 3, 3);
        assert_eq!(
            access.ensure_can_start(),
            Err(AccessError::QuotaExceeded { used: 3, limit: 3 })
        );
    }

    #[test]
    fn over_limit_counts_saturate() {
        let access = snapshot(SubscriptionTier::Free, 5, 3);
        assert_eq!(access.remaining_attempts(), Some(0));
        assert!(access.ensure_can_start().is_err());
    }

    #[test]
    fn premium_is_unlimited() {
        let access = snapshot(SubscriptionTier::Premium, 50, 3);
        assert_eq!(access.remaining_attempts(), None);
        assert!(access.ensure_can_start().is_ok());
    }
}
