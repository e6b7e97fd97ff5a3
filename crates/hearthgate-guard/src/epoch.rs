//! Monthly epoch handling.
//!
//! Usage accounting follows the billing calendar: counters reset at the
//! start of each UTC month. The check is idempotent and safe to run on
//! every mutation -- a serverless instance has no scheduler to run it for
//! us, so it piggybacks on recording calls.
//!
//! An emergency latched in a *previous* month is cleared by the rollover;
//! an emergency latched in the *current* month survives a reset that runs
//! later in that same month. The comparison is the trigger timestamp
//! against the current month start, as wall-clock time. A long-idle
//! instance that skips several month boundaries still resolves to the
//! current month on its first call.
//!
//! Rollover de-escalation is calendar bookkeeping, not a transition
//! event: it never fires level callbacks. Callbacks fire on escalations
//! and on operator actions only.

use chrono::{DateTime, Datelike, TimeZone, Utc};
use tracing::info;

use crate::state::ProtectionState;

/// Start-of-month instant (00:00:00 UTC on the 1st) for `now`.
pub fn month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}

/// Reset the ledger if a month boundary has been crossed since
/// `usage.last_reset`. Returns `true` when a reset was performed.
///
/// On reset:
/// - all usage counters are zeroed and a new epoch opens at `now`
/// - blocked-operation tallies are cleared unconditionally
/// - emergency mode is cleared unless it was triggered within the
///   current month
pub fn maybe_reset(state: &mut ProtectionState, now: DateTime<Utc>) -> bool {
    let boundary = month_start(now);
    if state.usage.last_reset >= boundary {
        return false;
    }

    info!(
        last_reset = %state.usage.last_reset,
        boundary = %boundary,
        "monthly epoch rollover, resetting usage counters"
    );

    state.usage.reset(now);
    state.blocked_operations.clear();

    let emergency_is_current = state
        .emergency_timestamp
        .is_some_and(|ts| ts >= boundary);

    if state.emergency_mode && !emergency_is_current {
        state.clear_emergency();
    } else if !state.emergency_mode {
        // De-escalate any usage-driven level: the counters that justified
        // it are gone. Disabled is an operator override and stays put.
        use hearthgate_types::ProtectionLevel;
        match state.protection_level {
            ProtectionLevel::Warning | ProtectionLevel::Protection => {
                state.protection_level = ProtectionLevel::Monitoring;
            }
            ProtectionLevel::Disabled
            | ProtectionLevel::Monitoring
            | ProtectionLevel::Emergency => {}
        }
    }

    true
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::CostLimits;
    use hearthgate_types::{EmergencyTrigger, ProtectionLevel, ServiceType};

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn state_at(start: &str) -> ProtectionState {
        ProtectionState::new(CostLimits::default(), ts(start))
    }

    // ── month_start ─────────────────────────────────────────────────

    #[test]
    fn month_start_truncates_to_first() {
        assert_eq!(
            month_start(ts("2025-06-15T12:34:56Z")),
            ts("2025-06-01T00:00:00Z")
        );
        assert_eq!(
            month_start(ts("2025-12-31T23:59:59Z")),
            ts("2025-12-01T00:00:00Z")
        );
    }

    // ── No-op within the same month ─────────────────────────────────

    #[test]
    fn same_month_does_not_reset() {
        let mut state = state_at("2025-06-02T00:00:00Z");
        state.usage.add_lambda_invocations(10, ts("2025-06-02T01:00:00Z"));
        assert!(!maybe_reset(&mut state, ts("2025-06-28T00:00:00Z")));
        assert_eq!(state.usage.lambda_invocations, 10);
    }

    #[test]
    fn reset_is_idempotent() {
        let mut state = state_at("2025-05-10T00:00:00Z");
        let now = ts("2025-06-05T00:00:00Z");
        assert!(maybe_reset(&mut state, now));
        assert!(!maybe_reset(&mut state, now));
        assert!(!maybe_reset(&mut state, now + chrono::Duration::days(1)));
    }

    // ── Rollover behavior ───────────────────────────────────────────

    #[test]
    fn rollover_zeroes_counters_and_tallies() {
        let mut state = state_at("2025-05-10T00:00:00Z");
        state.usage.add_lambda_invocations(500, ts("2025-05-20T00:00:00Z"));
        state.note_blocked("lambda_request");

        let now = ts("2025-06-01T08:00:00Z");
        assert!(maybe_reset(&mut state, now));

        assert_eq!(state.usage.lambda_invocations, 0);
        assert_eq!(state.usage.last_reset, now);
        assert!(state.blocked_operations.is_empty());
    }

    #[test]
    fn rollover_clears_prior_month_emergency() {
        let mut state = state_at("2025-05-01T00:00:00Z");
        state.usage.add_lambda_invocations(96, ts("2025-05-20T00:00:00Z"));
        state.enter_emergency(
            EmergencyTrigger::LimitBreach,
            Some(ServiceType::Lambda),
            "may breach".into(),
            ts("2025-05-20T00:00:00Z"),
        );

        assert!(maybe_reset(&mut state, ts("2025-06-03T00:00:00Z")));
        assert!(!state.emergency_mode);
        assert!(state.blocked_services.is_empty());
        assert_eq!(state.protection_level, ProtectionLevel::Monitoring);
    }

    #[test]
    fn rollover_preserves_current_month_emergency() {
        // Ledger last reset in May, emergency latched June 2nd, reset check
        // runs June 5th: the emergency is of the current month and survives.
        let mut state = state_at("2025-05-01T00:00:00Z");
        state.enter_emergency(
            EmergencyTrigger::Manual,
            None,
            "june incident".into(),
            ts("2025-06-02T00:00:00Z"),
        );

        assert!(maybe_reset(&mut state, ts("2025-06-05T00:00:00Z")));
        assert!(state.emergency_mode);
        assert_eq!(state.protection_level, ProtectionLevel::Emergency);
        // Counters still reset regardless.
        assert_eq!(state.usage.last_reset, ts("2025-06-05T00:00:00Z"));
    }

    #[test]
    fn rollover_deescalates_usage_driven_levels() {
        let limits = CostLimits {
            lambda_invocations: 100,
            ..CostLimits::default()
        };
        let mut state = ProtectionState::new(limits, ts("2025-05-01T00:00:00Z"));
        state.usage.add_lambda_invocations(91, ts("2025-05-20T00:00:00Z"));
        state.reevaluate(ServiceType::Lambda, ts("2025-05-20T00:00:00Z"));
        assert_eq!(state.protection_level, ProtectionLevel::Protection);

        assert!(maybe_reset(&mut state, ts("2025-06-01T00:00:00Z")));
        assert_eq!(state.protection_level, ProtectionLevel::Monitoring);
    }

    #[test]
    fn rollover_keeps_disabled_pinned() {
        let mut state =
            ProtectionState::new_disabled(CostLimits::default(), ts("2025-05-01T00:00:00Z"));
        assert!(maybe_reset(&mut state, ts("2025-07-01T00:00:00Z")));
        assert_eq!(state.protection_level, ProtectionLevel::Disabled);
    }

    #[test]
    fn multi_month_idle_gap_resolves_to_current_month() {
        let mut state = state_at("2025-01-15T00:00:00Z");
        state.usage.add_lambda_invocations(42, ts("2025-01-16T00:00:00Z"));
        let now = ts("2025-06-20T00:00:00Z");
        assert!(maybe_reset(&mut state, now));
        assert_eq!(state.usage.lambda_invocations, 0);
        assert_eq!(state.usage.last_reset, now);
    }
}
