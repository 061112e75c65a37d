//! Identifiers used throughout TierGate.
//!
//! Purchasers and purchases use UUIDv7 for time-ordered sorting. Locks and
//! lock managers are addressed by a 20-byte [`Address`].

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// IdentityId
// ---------------------------------------------------------------------------

/// The purchaser: the identity that owns (or wants to own) a membership key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct IdentityId(pub Uuid);

impl IdentityId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    #[must_use]
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }
}

impl Default for IdentityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// PurchaseId
// ---------------------------------------------------------------------------

/// Identifies one purchase attempt. Refunds and payment holds are keyed by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct PurchaseId(pub Uuid);

impl PurchaseId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Deterministic `PurchaseId` from the selling lock and its purchase
    /// sequence number. A lock replaying its own log derives the same IDs.
    #[must_use]
    pub fn deterministic(lock: &Address, sequence: u64) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"tiergate:purchase_id:v1:");
        hasher.update(lock.as_bytes());
        hasher.update(sequence.to_le_bytes());
        let hash = hasher.finalize();
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&hash[..16]);
        Self(Uuid::from_bytes(bytes))
    }
}

impl Default for PurchaseId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PurchaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "purchase:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Address
// ---------------------------------------------------------------------------

/// A 20-byte account address, used for locks and lock managers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Address(pub [u8; 20]);

impl Address {
    /// The all-zero address. Never assigned to a lock.
    pub const ZERO: Self = Self([0u8; 20]);

    #[must_use]
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Derive a stable address from a human label (e.g. a lock name plus a
    /// deployment salt). Same label, same address.
    #[must_use]
    pub fn derive(label: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"tiergate:address:v1:");
        hasher.update(label.as_bytes());
        let hash = hasher.finalize();
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&hash[12..]);
        Self(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    /// First four bytes as hex, for compact log fields.
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_id_uniqueness() {
        let a = IdentityId::new();
        let b = IdentityId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn purchase_id_deterministic() {
        let lock = Address::derive("Basic");
        let a = PurchaseId::deterministic(&lock, 7);
        let b = PurchaseId::deterministic(&lock, 7);
        assert_eq!(a, b);
        assert_ne!(a, PurchaseId::deterministic(&lock, 8));
        assert_ne!(a, PurchaseId::deterministic(&Address::derive("Pro"), 7));
    }

    #[test]
    fn address_derive_is_stable() {
        assert_eq!(Address::derive("Premium"), Address::derive("Premium"));
        assert_ne!(Address::derive("Premium"), Address::derive("Pro"));
        assert!(!Address::derive("Premium").is_zero());
        assert!(Address::ZERO.is_zero());
    }

    #[test]
    fn address_display_is_prefixed_hex() {
        let addr = Address::from_bytes([0xab; 20]);
        let shown = format!("{addr}");
        assert!(shown.starts_with("0x"));
        assert_eq!(shown.len(), 42);
        assert_eq!(addr.short(), "abababab");
    }

    #[test]
    fn serde_roundtrips() {
        let id = IdentityId::new();
        let json = serde_json::to_string(&id).unwrap();
        let back: IdentityId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);

        let addr = Address::derive("Basic");
        let json = serde_json::to_string(&addr).unwrap();
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(addr, back);
    }
}
