//! System-wide constants for TierGate.

/// Default key lifetime for a membership lock: 7 days, in seconds.
pub const DEFAULT_EXPIRATION_DURATION_SECS: i64 = 60 * 60 * 24 * 7;

/// Longest key lifetime a lock accepts: 100 years, in seconds.
pub const MAX_EXPIRATION_DURATION_SECS: i64 = 60 * 60 * 24 * 365 * 100;

/// Default same-tier renewal window, in seconds. A re-purchase of a
/// membership expiring within this window is treated as a renewal.
pub const DEFAULT_RENEWAL_WINDOW_SECS: i64 = 60 * 60 * 24;

/// Widest renewal window accepted: 10 years, in seconds.
pub const MAX_RENEWAL_WINDOW_SECS: i64 = 60 * 60 * 24 * 365 * 10;

/// Number of refund records a resolver keeps before evicting the oldest.
pub const REFUND_LOG_CAPACITY: usize = 100_000;

/// Maximum number of diagnostics retained by a coordinator.
pub const MAX_DIAGNOSTICS: usize = 1_024;

/// Upper bound on catalog size. The coordinator queries every tier on every
/// purchase.
pub const MAX_TIERS: usize = 32;
