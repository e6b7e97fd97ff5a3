//! # hearthgate-types
//!
//! Core type definitions for the hearthgate smart-home gateway.
//!
//! This crate is the foundation of the dependency graph -- the guard
//! engine and the integration layers depend on it. It contains:
//!
//! - **[`protection`]** -- [`ServiceType`], [`CostCategory`],
//!   [`ProtectionLevel`] and [`EmergencyTrigger`] enums
//! - **[`error`]** -- [`GuardError`] error type
//! - **[`config`]** -- Configuration schema for quota overrides

pub mod config;
pub mod error;
pub mod protection;

pub use config::GuardConfig;
pub use error::{GuardError, Result};
pub use protection::{CostCategory, EmergencyTrigger, ProtectionLevel, ServiceType};
