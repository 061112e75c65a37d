//! # tiergate-registry
//!
//! **Lock registry seam**: how the coordinator talks to membership locks and
//! how locks call back into the coordinator.
//!
//! - [`LockRegistry`]: membership queries (`has_valid_membership`,
//!   `key_expiration`) and lock-manager mutations (`expire_membership`,
//!   `restore_membership`)
//! - [`PurchaseHook`]: `on_key_purchase` before a key becomes visible,
//!   `on_key_purchased` after it is finalized
//! - [`InMemoryLock`]: a reference lock backed by the shared
//!   [`PaymentLedger`](tiergate_settlement::PaymentLedger)

pub mod handle;
pub mod memory_lock;

pub use handle::{HookDecision, LockRegistry, PurchaseHook};
pub use memory_lock::{InMemoryLock, PurchaseReceipt};
