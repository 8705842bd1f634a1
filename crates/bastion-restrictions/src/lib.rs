//! `bastion-restrictions` — the restriction store and the effective-restriction
//! cache read by downstream admission checks.
//!
//! A restriction is a `(category, scope, value, state)` rule. The global
//! maintenance marker (`maintenance / all / all`) is shared by every
//! maintenance window and is unique per category; whitelist rules
//! (`whitelist / ip / <address>`) belong to exactly one window.

pub mod cache;
pub mod db;
pub mod error;
pub mod store;
pub mod types;

pub use cache::{EffectiveRestrictions, RestrictionCache, RestrictionSnapshot};
pub use error::{RestrictionError, Result};
pub use store::Resolved;
pub use types::{Category, Restriction, RestrictionState, Scope};
