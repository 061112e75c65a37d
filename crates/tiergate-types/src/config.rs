//! Configuration types for the coordinator and its locks.

use chrono::Duration;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Address, TiergateError, constants};

/// What happens when an identity re-purchases the tier it already holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SameTierPolicy {
    #[default]
    /// Refund in full while the membership is valid and outside the renewal
    /// window; inside the window (or once expired) extend it.
    RefundUnlessExpiring,
    /// Always accept the payment and extend the membership.
    AlwaysExtend,
    /// Always refund; the membership is never extended by re-purchase.
    AlwaysRefund,
}

/// Same-tier renewal settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenewalConfig {
    pub policy: SameTierPolicy,
    /// Seconds before expiration during which a re-purchase counts as renewal.
    pub renewal_window_secs: i64,
}

impl RenewalConfig {
    /// The renewal window as a duration.
    ///
    /// # Errors
    /// `Configuration` unless `0 <= renewal_window_secs <= MAX_RENEWAL_WINDOW_SECS`.
    pub fn window(&self) -> Result<Duration, TiergateError> {
        bounded_secs(
            "renewal_window_secs",
            self.renewal_window_secs,
            0,
            constants::MAX_RENEWAL_WINDOW_SECS,
        )
    }
}

fn bounded_secs(field: &str, secs: i64, min: i64, max: i64) -> Result<Duration, TiergateError> {
    if !(min..=max).contains(&secs) {
        return Err(TiergateError::Configuration(format!(
            "{field} must be within {min}..={max}, got {secs}"
        )));
    }
    Duration::try_seconds(secs)
        .ok_or_else(|| TiergateError::Configuration(format!("{field} out of range: {secs}")))
}

impl Default for RenewalConfig {
    fn default() -> Self {
        Self {
            policy: SameTierPolicy::default(),
            renewal_window_secs: constants::DEFAULT_RENEWAL_WINDOW_SECS,
        }
    }
}

/// Explicit tier definition. When a coordinator is wired with tier configs,
/// prices come from here instead of being read off the locks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierConfig {
    pub name: String,
    pub lock: Address,
    pub price: Decimal,
}

/// Coordinator configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Address the coordinator acts as when calling lock-manager operations.
    pub manager: Address,
    #[serde(default)]
    pub renewal: RenewalConfig,
    /// Number of refund records kept by the resolver's refund log.
    #[serde(default = "default_refund_log_capacity")]
    pub refund_log_capacity: usize,
    /// Number of diagnostics retained before the oldest is dropped.
    #[serde(default = "default_max_diagnostics")]
    pub max_diagnostics: usize,
    /// Optional explicit tiers, in catalog order.
    #[serde(default)]
    pub tiers: Vec<TierConfig>,
}

fn default_refund_log_capacity() -> usize {
    constants::REFUND_LOG_CAPACITY
}

fn default_max_diagnostics() -> usize {
    constants::MAX_DIAGNOSTICS
}

impl CoordinatorConfig {
    /// Default configuration acting as `manager`.
    #[must_use]
    pub fn new(manager: Address) -> Self {
        Self {
            manager,
            renewal: RenewalConfig::default(),
            refund_log_capacity: constants::REFUND_LOG_CAPACITY,
            max_diagnostics: constants::MAX_DIAGNOSTICS,
            tiers: Vec::new(),
        }
    }

    /// Parse and validate a JSON configuration document.
    pub fn from_json(json: &str) -> Result<Self, TiergateError> {
        let cfg: Self = serde_json::from_str(json)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), TiergateError> {
        if self.manager.is_zero() {
            return Err(TiergateError::Configuration(
                "manager address must not be zero".into(),
            ));
        }
        self.renewal.window()?;
        if self.refund_log_capacity == 0 {
            return Err(TiergateError::Configuration(
                "refund_log_capacity must be > 0".into(),
            ));
        }
        if self.max_diagnostics == 0 {
            return Err(TiergateError::Configuration(
                "max_diagnostics must be > 0".into(),
            ));
        }
        if self.tiers.len() > constants::MAX_TIERS {
            return Err(TiergateError::Configuration(format!(
                "at most {} tiers supported, got {}",
                constants::MAX_TIERS,
                self.tiers.len()
            )));
        }
        Ok(())
    }
}

/// Parameters of an in-memory membership lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockConfig {
    pub name: String,
    pub key_price: Decimal,
    /// Lifetime of a freshly purchased key, in seconds.
    pub expiration_duration_secs: i64,
    /// Cap on concurrently existing keys. `None` means unlimited.
    pub max_number_of_keys: Option<usize>,
}

impl LockConfig {
    #[must_use]
    pub fn new(name: impl Into<String>, key_price: Decimal) -> Self {
        Self {
            name: name.into(),
            key_price,
            expiration_duration_secs: constants::DEFAULT_EXPIRATION_DURATION_SECS,
            max_number_of_keys: None,
        }
    }

    /// Lifetime of a freshly purchased key.
    ///
    /// # Errors
    /// `Configuration` unless `1 <= expiration_duration_secs <= MAX_EXPIRATION_DURATION_SECS`.
    pub fn key_lifetime(&self) -> Result<Duration, TiergateError> {
        bounded_secs(
            "expiration_duration_secs",
            self.expiration_duration_secs,
            1,
            constants::MAX_EXPIRATION_DURATION_SECS,
        )
    }

    /// Check name, price, lifetime and key cap.
    pub fn validate(&self) -> Result<(), TiergateError> {
        if self.name.trim().is_empty() {
            return Err(TiergateError::Configuration("lock name must not be blank".into()));
        }
        if self.key_price.is_sign_negative() {
            return Err(TiergateError::Configuration(format!(
                "lock {}: key_price must be >= 0, got {}",
                self.name, self.key_price
            )));
        }
        if self.max_number_of_keys == Some(0) {
            return Err(TiergateError::Configuration(format!(
                "lock {}: max_number_of_keys must be > 0",
                self.name
            )));
        }
        self.key_lifetime()?;
        Ok(())
    }
}

/// Test helpers: the three-tier product line.
#[cfg(any(test, feature = "test-helpers"))]
impl LockConfig {
    /// "Basic" at 0.1, 100 keys, 7 days.
    pub fn basic() -> Self {
        Self {
            max_number_of_keys: Some(100),
            ..Self::new("Basic", Decimal::new(1, 1))
        }
    }

    /// "Premium" at 0.5, 100 keys, 7 days.
    pub fn premium() -> Self {
        Self {
            max_number_of_keys: Some(100),
            ..Self::new("Premium", Decimal::new(5, 1))
        }
    }

    /// "Pro" at 1.0, 100 keys, 7 days.
    pub fn pro() -> Self {
        Self {
            max_number_of_keys: Some(100),
            ..Self::new("Pro", Decimal::ONE)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renewal_defaults() {
        let cfg = RenewalConfig::default();
        assert_eq!(cfg.policy, SameTierPolicy::RefundUnlessExpiring);
        assert_eq!(cfg.renewal_window_secs, 86_400);
    }

    #[test]
    fn coordinator_config_from_minimal_json() {
        let manager = Address::derive("coordinator");
        let json = format!(r#"{{ "manager": {} }}"#, serde_json::to_string(&manager).unwrap());
        let cfg = CoordinatorConfig::from_json(&json).unwrap();
        assert_eq!(cfg.manager, manager);
        assert_eq!(cfg.renewal, RenewalConfig::default());
        assert_eq!(cfg.refund_log_capacity, constants::REFUND_LOG_CAPACITY);
        assert!(cfg.tiers.is_empty());
    }

    #[test]
    fn coordinator_config_policy_from_json() {
        let mut cfg = CoordinatorConfig::new(Address::derive("coordinator"));
        cfg.renewal.policy = SameTierPolicy::AlwaysExtend;
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(json.contains("always_extend"));
        let back = CoordinatorConfig::from_json(&json).unwrap();
        assert_eq!(back, cfg);
    }

    #[test]
    fn zero_manager_rejected() {
        let err = CoordinatorConfig::new(Address::ZERO).validate().unwrap_err();
        assert!(matches!(err, TiergateError::Configuration(_)));
    }

    #[test]
    fn negative_window_rejected() {
        let mut cfg = CoordinatorConfig::new(Address::derive("coordinator"));
        cfg.renewal.renewal_window_secs = -1;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn oversized_window_rejected() {
        let mut cfg = CoordinatorConfig::new(Address::derive("coordinator"));
        for secs in [i64::MAX, 10_000_000_000_000, constants::MAX_RENEWAL_WINDOW_SECS + 1] {
            cfg.renewal.renewal_window_secs = secs;
            let err = cfg.validate().unwrap_err();
            assert!(err.is_config_error(), "{secs}: {err}");
        }
        cfg.renewal.renewal_window_secs = constants::MAX_RENEWAL_WINDOW_SECS;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn lock_lifetime_bounds() {
        let mut lock = LockConfig::basic();
        assert_eq!(lock.key_lifetime().unwrap(), Duration::days(7));
        for secs in [0, -60, i64::MIN, i64::MAX, constants::MAX_EXPIRATION_DURATION_SECS + 1] {
            lock.expiration_duration_secs = secs;
            assert!(
                matches!(lock.validate(), Err(TiergateError::Configuration(_))),
                "{secs} accepted"
            );
        }
    }

    #[test]
    fn lock_config_rejects_bad_fields() {
        let blank = LockConfig::new("  ", Decimal::ONE);
        assert!(blank.validate().is_err());
        let negative = LockConfig::new("Basic", Decimal::new(-1, 1));
        assert!(negative.validate().is_err());
        let no_keys = LockConfig {
            max_number_of_keys: Some(0),
            ..LockConfig::basic()
        };
        assert!(no_keys.validate().is_err());
        assert!(LockConfig::pro().validate().is_ok());
    }

    #[test]
    fn malformed_json_is_serialization_error() {
        let err = CoordinatorConfig::from_json("{ not json").unwrap_err();
        assert!(matches!(err, TiergateError::Serialization(_)));
    }

    #[test]
    fn product_line_prices_ascend() {
        assert!(LockConfig::basic().key_price < LockConfig::premium().key_price);
        assert!(LockConfig::premium().key_price < LockConfig::pro().key_price);
        assert_eq!(LockConfig::pro().expiration_duration_secs, 604_800);
    }
}
