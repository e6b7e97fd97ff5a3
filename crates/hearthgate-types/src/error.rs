//! Error types for the hearthgate gateway.
//!
//! Provides [`GuardError`] as the guard-engine error type. Non-exhaustive
//! to allow future extension without breaking downstream.
//!
//! Nothing in the guard engine is fatal to the host process: every public
//! entry point degrades to "allow the request" or "use defaults" instead
//! of propagating, so these variants surface only at the library boundary
//! (ledger arithmetic, store adapters, config validation) and in logs.

use thiserror::Error;

/// Convenience alias used throughout the guard crates.
pub type Result<T> = std::result::Result<T, GuardError>;

/// Error type for the cost-protection engine.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum GuardError {
    /// A usage counter was asked to move backwards. Counters represent
    /// monotonic consumption within an epoch; decrements are rejected
    /// without mutating state.
    #[error("negative delta {delta} for counter {counter}")]
    NegativeDelta {
        /// Which counter the delta targeted.
        counter: &'static str,
        /// The rejected delta.
        delta: f64,
    },

    /// The persisted state document failed validation after parsing.
    #[error("invalid persisted state: {reason}")]
    InvalidState {
        /// Which invariant or field check failed.
        reason: String,
    },

    /// Configuration is malformed or semantically invalid.
    #[error("invalid config: {reason}")]
    ConfigInvalid {
        /// What is wrong with the configuration.
        reason: String,
    },

    /// Underlying I/O error from a store adapter.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization / deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
