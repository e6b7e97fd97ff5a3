//! The protection state machine.
//!
//! [`ProtectionState`] is the aggregate the whole engine revolves around:
//! current level, the latched emergency flag and its diagnostics, the
//! usage ledger, the quota table and the blocked-operation tallies. It is
//! created once per process (or loaded from the store) and mutated only
//! inside the manager's critical section.
//!
//! Escalation is monotonic on the way up: usage events can only raise the
//! level, never lower it. De-escalation happens exclusively through an
//! epoch reset or an explicit operator action (`set_levels`,
//! `clear_emergency`).

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use hearthgate_types::{EmergencyTrigger, GuardError, ProtectionLevel, ServiceType};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::limits::CostLimits;
use crate::usage::UsageMetrics;

// ── ProtectionState ──────────────────────────────────────────────────────

/// Full mutable state of the cost-protection engine.
///
/// Invariants, enforced by the mutation methods and re-checked by
/// [`ProtectionState::validate`] when loading a persisted document:
///
/// - `emergency_mode` implies `protection_level == Emergency`
/// - `blocked_services` is non-empty only while `emergency_mode` is set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtectionState {
    /// Current escalation stage.
    pub protection_level: ProtectionLevel,
    /// Latched lockdown flag.
    pub emergency_mode: bool,
    /// Why emergency mode was entered (diagnostics only).
    pub emergency_trigger: Option<EmergencyTrigger>,
    /// When emergency mode was entered.
    pub emergency_timestamp: Option<DateTime<Utc>>,
    /// Operator-readable explanation for the emergency.
    pub emergency_reason: Option<String>,
    /// The usage ledger.
    pub usage: UsageMetrics,
    /// The quota table.
    pub limits: CostLimits,
    /// Count of admission denials, keyed by `"{service}_request"`.
    pub blocked_operations: HashMap<String, u64>,
    /// Services frozen by an emergency limit breach.
    pub blocked_services: BTreeSet<ServiceType>,
}

impl ProtectionState {
    /// Fresh state at the `Monitoring` level.
    pub fn new(limits: CostLimits, now: DateTime<Utc>) -> Self {
        Self {
            protection_level: ProtectionLevel::Monitoring,
            emergency_mode: false,
            emergency_trigger: None,
            emergency_timestamp: None,
            emergency_reason: None,
            usage: UsageMetrics::new(now),
            limits,
            blocked_operations: HashMap::new(),
            blocked_services: BTreeSet::new(),
        }
    }

    /// Fresh state pinned at `Disabled` (config master switch off).
    pub fn new_disabled(limits: CostLimits, now: DateTime<Utc>) -> Self {
        Self {
            protection_level: ProtectionLevel::Disabled,
            ..Self::new(limits, now)
        }
    }

    // ── Escalation ──────────────────────────────────────────────────

    /// Re-derive the protection level after a usage event on `service`.
    ///
    /// Returns the newly *entered* level, if any, so the caller can fire
    /// transition callbacks. Exhaustive over the current level at every
    /// decision point; `Disabled` short-circuits all escalation.
    pub fn reevaluate(
        &mut self,
        service: ServiceType,
        now: DateTime<Utc>,
    ) -> Option<ProtectionLevel> {
        if self.protection_level == ProtectionLevel::Disabled {
            return None;
        }

        let p = self.usage.usage_percent(service, &self.limits);

        if p >= self.limits.emergency_percent {
            let reason = format!(
                "{service} usage at {p:.1}% of monthly limit (emergency threshold {:.0}%)",
                self.limits.emergency_percent
            );
            let entered =
                self.enter_emergency(EmergencyTrigger::LimitBreach, Some(service), reason, now);
            return entered.then_some(ProtectionLevel::Emergency);
        }

        if p >= self.limits.critical_percent {
            return match self.protection_level {
                ProtectionLevel::Monitoring | ProtectionLevel::Warning => {
                    info!(%service, percent = p, "entering protection level");
                    self.protection_level = ProtectionLevel::Protection;
                    Some(ProtectionLevel::Protection)
                }
                // Already at or above Protection: no automatic de-escalation.
                ProtectionLevel::Protection | ProtectionLevel::Emergency => None,
                ProtectionLevel::Disabled => None,
            };
        }

        if p >= self.limits.warning_percent {
            return match self.protection_level {
                ProtectionLevel::Monitoring => {
                    info!(%service, percent = p, "entering warning level");
                    self.protection_level = ProtectionLevel::Warning;
                    Some(ProtectionLevel::Warning)
                }
                ProtectionLevel::Warning
                | ProtectionLevel::Protection
                | ProtectionLevel::Emergency => None,
                ProtectionLevel::Disabled => None,
            };
        }

        // Below every threshold: level is left as-is. Only an epoch reset
        // or an operator action de-escalates.
        None
    }

    /// Latch emergency mode.
    ///
    /// Returns `true` if emergency mode was newly entered. A `service`
    /// that breached its limit is added to the frozen set either way (a
    /// second service can breach while the first emergency is active).
    pub fn enter_emergency(
        &mut self,
        trigger: EmergencyTrigger,
        service: Option<ServiceType>,
        reason: String,
        now: DateTime<Utc>,
    ) -> bool {
        if let Some(service) = service {
            self.blocked_services.insert(service);
        }
        if self.emergency_mode {
            return false;
        }
        warn!(%trigger, %reason, "entering emergency mode");
        self.emergency_mode = true;
        self.protection_level = ProtectionLevel::Emergency;
        self.emergency_trigger = Some(trigger);
        self.emergency_timestamp = Some(now);
        self.emergency_reason = Some(reason);
        true
    }

    /// Clear emergency mode and return to `Monitoring`.
    pub fn clear_emergency(&mut self) {
        self.emergency_mode = false;
        self.emergency_trigger = None;
        self.emergency_timestamp = None;
        self.emergency_reason = None;
        self.blocked_services.clear();
        self.protection_level = ProtectionLevel::Monitoring;
    }

    /// Operator override: force `Protection`, `Emergency`, or back to
    /// `Monitoring`, bypassing percentage checks entirely.
    ///
    /// Returns the newly entered level, if the override changed it.
    pub fn set_levels(
        &mut self,
        active: bool,
        emergency: bool,
        now: DateTime<Utc>,
    ) -> Option<ProtectionLevel> {
        if emergency {
            let entered = self.enter_emergency(
                EmergencyTrigger::Manual,
                None,
                "manual operator override".into(),
                now,
            );
            return entered.then_some(ProtectionLevel::Emergency);
        }

        if active {
            if self.emergency_mode {
                self.clear_emergency();
            }
            if self.protection_level == ProtectionLevel::Protection {
                return None;
            }
            self.protection_level = ProtectionLevel::Protection;
            return Some(ProtectionLevel::Protection);
        }

        // Fully stand down.
        let was_monitoring = !self.emergency_mode
            && self.protection_level == ProtectionLevel::Monitoring;
        self.clear_emergency();
        (!was_monitoring).then_some(ProtectionLevel::Monitoring)
    }

    /// Bump the denial tally for an operation key.
    pub fn note_blocked(&mut self, key: &str) {
        *self.blocked_operations.entry(key.to_string()).or_insert(0) += 1;
    }

    // ── Validation (persistence load path) ──────────────────────────

    /// Re-check aggregate invariants after deserializing a document.
    pub fn validate(&self) -> Result<(), GuardError> {
        self.limits.validate()?;
        if self.emergency_mode && self.protection_level != ProtectionLevel::Emergency {
            return Err(GuardError::InvalidState {
                reason: format!(
                    "emergency_mode set but level is {}",
                    self.protection_level
                ),
            });
        }
        if !self.emergency_mode && !self.blocked_services.is_empty() {
            return Err(GuardError::InvalidState {
                reason: "blocked_services non-empty outside emergency mode".into(),
            });
        }
        if !self.usage.lambda_gb_seconds.is_finite()
            || self.usage.lambda_gb_seconds < 0.0
            || !self.usage.lambda_storage_mb.is_finite()
            || self.usage.lambda_storage_mb < 0.0
        {
            return Err(GuardError::InvalidState {
                reason: "usage counters out of range".into(),
            });
        }
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────────────
