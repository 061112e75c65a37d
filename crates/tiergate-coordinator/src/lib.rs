//! # tiergate-coordinator
//!
//! Cross-tier purchase coordination for the **TierGate** membership system.
//!
//! Each tier (Basic, Premium, Pro, ...) is sold by its own lock. Locks know
//! nothing about each other; the coordinator keeps them consistent:
//!
//! - [`TierCatalog`]: the ordered tier list, validated at construction
//! - [`PurchaseCoordinator`]: classifies every purchase as new, upgrade,
//!   renewal or rejection and applies the result
//! - [`IdentityGate`]: serializes purchase decisions per identity
//! - [`UnitOfWork`]: journals lock mutations so a failed decision rolls back
//!
//! ## Invariant
//!
//! At any instant an identity holds a valid membership in **at most one**
//! tier. Upgrades expire the old tier before the new key is written,
//! downgrades are refused and refunded, and a detected violation is never
//! repaired silently; it rejects the purchase and records a [`Diagnostic`].
//!
//! ## Purchase flow
//!
//! ```text
//! lock.purchase ─▶ hold payment ─▶ coordinator.on_key_purchase
//!                                    │ permit(identity)
//!                                    │ query every tier
//!                                    │ expire old tier / refund
//!                                    ▼
//!                  verdict ◀──────── HookDecision
//!    reject: release hold    accept: capture, write key,
//!                                    on_key_purchased, drop permit
//! ```

pub mod catalog;
pub mod coordinator;
pub mod identity_gate;
pub mod unit_of_work;

pub use catalog::{Tier, TierCatalog};
pub use coordinator::{Diagnostic, DiagnosticKind, PurchaseCoordinator};
pub use identity_gate::{IdentityGate, IdentityPermit};
pub use unit_of_work::UnitOfWork;
