//! The admission gate: pure allow/block decisions over the current state.
//!
//! Two deliberately asymmetric entry points:
//!
//! - [`verdict`] is the fine-grained gate for callers that attach a
//!   [`CostCategory`] to their work. It is the stricter of the two.
//! - [`service_allowed`] is the coarse service-level gate for callers that
//!   only know a service name string. Unknown names fail open so new
//!   callers can ship before the guard learns about their service.
//!
//! Both are pure functions of `&ProtectionState`: no mutation happens
//! here. The caller is responsible for bumping the blocked-operation
//! tally when it acts on a `Blocked` verdict.

use hearthgate_types::{CostCategory, ProtectionLevel, ServiceType};
use tracing::debug;

use crate::state::ProtectionState;

// ── Verdict ──────────────────────────────────────────────────────────────

/// Outcome of a category-based admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The unit of work may proceed.
    Allowed,
    /// The unit of work must not proceed.
    Blocked {
        /// Why admission was denied (for logs and diagnostics).
        reason: &'static str,
    },
}

impl Verdict {
    /// `true` when the verdict is [`Verdict::Blocked`].
    pub fn is_blocked(&self) -> bool {
        matches!(self, Verdict::Blocked { .. })
    }
}

// ── Category gate ────────────────────────────────────────────────────────

/// Decide whether a unit of work in `category` may proceed.
///
/// Critical work is never blocked, regardless of state. Emergency mode
/// blocks everything else. At the `Protection` level, optional and
/// low-priority work is shed while normal traffic still flows.
pub fn verdict(state: &ProtectionState, category: CostCategory) -> Verdict {
    match category {
        CostCategory::Critical => Verdict::Allowed,
        CostCategory::Normal | CostCategory::Optional | CostCategory::LowPriority => {
            if state.emergency_mode {
                return Verdict::Blocked {
                    reason: "emergency mode active",
                };
            }
            match state.protection_level {
                ProtectionLevel::Protection => match category {
                    CostCategory::Optional | CostCategory::LowPriority => Verdict::Blocked {
                        reason: "optional work shed at protection level",
                    },
                    CostCategory::Critical | CostCategory::Normal => Verdict::Allowed,
                },
                ProtectionLevel::Disabled
                | ProtectionLevel::Monitoring
                | ProtectionLevel::Warning => Verdict::Allowed,
                // Emergency level without the latched flag cannot occur
                // (aggregate invariant), but the decision stays safe.
                ProtectionLevel::Emergency => Verdict::Blocked {
                    reason: "emergency level active",
                },
            }
        }
    }
}

/// Tally key for a denied request, keyed by target service.
pub fn blocked_key(service: Option<ServiceType>) -> String {
    match service {
        Some(service) => format!("{service}_request"),
        None => "unknown_request".to_string(),
    }
}

// ── Service gate ─────────────────────────────────────────────────────────

/// Coarse service-level gate for callers without a [`CostCategory`].
///
/// Unknown service names default to allowed (fail-open for forward
/// compatibility). A frozen service, or any service while emergency mode
/// is active, is denied. While `Protection` is active only Lambda -- the
/// service that carries the actual request path -- stays allowed.
pub fn service_allowed(state: &ProtectionState, name: &str) -> bool {
    let Some(service) = ServiceType::parse(name) else {
        debug!(service = name, "unknown service name, allowing (fail-open)");
        return true;
    };

    if state.emergency_mode || state.blocked_services.contains(&service) {
        return false;
    }

    match state.protection_level {
        ProtectionLevel::Protection => match service {
            ServiceType::Lambda => true,
            ServiceType::CloudWatch | ServiceType::Ssm | ServiceType::CloudWatchLogs => false,
        },
        ProtectionLevel::Disabled
        | ProtectionLevel::Monitoring
        | ProtectionLevel::Warning => true,
        ProtectionLevel::Emergency => false,
    }
}

// ── Tests ────────────────────────────────────────────────────────────────
