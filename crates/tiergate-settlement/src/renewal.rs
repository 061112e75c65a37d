//! Same-tier renewal policy.
//!
//! Decides what a re-purchase of the tier already held does with the money:
//! hand it back and leave the membership alone, or keep it and extend.

use chrono::{DateTime, Duration, Utc};
use tiergate_types::{RenewalConfig, Result, SameTierPolicy, constants};

/// Outcome of a same-tier re-purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenewalOutcome {
    /// Return the payment; membership unchanged.
    Refund,
    /// Keep the payment; the lock extends the membership.
    Extend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenewalPolicy {
    kind: SameTierPolicy,
    window: Duration,
}

impl RenewalPolicy {
    #[must_use]
    pub fn new(kind: SameTierPolicy, window: Duration) -> Self {
        Self { kind, window }
    }

    /// # Errors
    /// `Configuration` if the window is negative or beyond
    /// `MAX_RENEWAL_WINDOW_SECS`.
    pub fn from_config(cfg: &RenewalConfig) -> Result<Self> {
        Ok(Self::new(cfg.policy, cfg.window()?))
    }

    #[must_use]
    pub fn kind(&self) -> SameTierPolicy {
        self.kind
    }

    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Resolve a re-purchase given the current membership expiration.
    ///
    /// `expires_at` of `None` (or in the past) means nothing is left to
    /// protect, so the purchase is a straight renewal under every policy
    /// except `AlwaysRefund`. A window reaching past the end of time covers
    /// every expiration.
    #[must_use]
    pub fn resolve(&self, expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> RenewalOutcome {
        match self.kind {
            SameTierPolicy::AlwaysExtend => RenewalOutcome::Extend,
            SameTierPolicy::AlwaysRefund => RenewalOutcome::Refund,
            SameTierPolicy::RefundUnlessExpiring => match expires_at {
                Some(exp) if now.checked_add_signed(self.window).is_some_and(|edge| exp > edge) => {
                    RenewalOutcome::Refund
                }
                _ => RenewalOutcome::Extend,
            },
        }
    }
}

impl Default for RenewalPolicy {
    fn default() -> Self {
        Self::new(
            SameTierPolicy::RefundUnlessExpiring,
            Duration::seconds(constants::DEFAULT_RENEWAL_WINDOW_SECS),
        )
    }
}
