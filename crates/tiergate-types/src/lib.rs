//! # tiergate-types
//!
//! Shared types, errors, and configuration for **TierGate**, the cross-lock
//! purchase coordinator for tiered memberships.
//!
//! This crate is the leaf dependency of the workspace; every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`IdentityId`], [`PurchaseId`], [`Address`], [`TierId`]
//! - **Purchase model**: [`PurchaseEvent`], [`Verdict`], [`RejectReason`]
//! - **Configuration**: [`CoordinatorConfig`], [`RenewalConfig`], [`SameTierPolicy`],
//!   [`TierConfig`], [`LockConfig`]
//! - **Errors**: [`TiergateError`] with `TG_ERR_` prefix codes, [`SettlementError`]
//! - **Constants**: system-wide limits and defaults

pub mod config;
pub mod constants;
pub mod error;
pub mod ids;
pub mod purchase;
pub mod tier;

// Re-export all primary types at crate root for ergonomic imports:
//   use tiergate_types::{IdentityId, PurchaseEvent, Verdict, ...};

pub use config::*;
pub use error::*;
pub use ids::*;
pub use purchase::*;
pub use tier::*;

// Constants are accessed via `tiergate_types::constants::FOO`
// (not re-exported to avoid name collisions).
