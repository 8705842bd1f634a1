//! `bastion-core` — configuration, identifiers and time helpers shared by
//! every bastion crate.

pub mod config;
pub mod error;
pub mod time;
pub mod types;

pub use config::BastionConfig;
pub use error::{BastionError, Result};
pub use types::{JobId, RestrictionId};
