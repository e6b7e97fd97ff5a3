//! # hearthgate-guard
//!
//! Quota-aware admission control for the hearthgate smart-home gateway.
//!
//! A serverless gateway instance pays for every Lambda invocation,
//! CloudWatch call, SSM read and log byte it emits. This crate tracks that
//! consumption against monthly free-tier budgets, escalates through
//! protection levels as budgets fill up, and answers admission questions
//! ("may this unit of work proceed?") cheaply and deterministically. State
//! survives cold starts via a pluggable store.
//!
//! Layout:
//!
//! - **[`limits`]** -- the static quota table ([`limits::CostLimits`])
//! - **[`usage`]** -- the mutable usage ledger ([`usage::UsageMetrics`])
//! - **[`state`]** -- the protection state machine ([`state::ProtectionState`])
//! - **[`gate`]** -- pure admission decisions ([`gate::Verdict`])
//! - **[`epoch`]** -- monthly rollover handling
//! - **[`store`]** -- state persistence ([`store::StateStore`])
//! - **[`callbacks`]** -- level-transition subscriptions
//! - **[`report`]** -- usage summary and plain-text report
//! - **[`manager`]** -- the [`manager::CostGuard`] composition root

pub mod callbacks;
pub mod epoch;
pub mod gate;
pub mod limits;
pub mod manager;
pub mod report;
pub mod state;
pub mod store;
pub mod telemetry;
pub mod usage;

pub use gate::Verdict;
pub use limits::CostLimits;
pub use manager::{CostGuard, cleanup, guard};
pub use report::UsageSummary;
pub use state::ProtectionState;
pub use store::{FileStore, MemoryStore, StateStore};
pub use usage::UsageMetrics;
