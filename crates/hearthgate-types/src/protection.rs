//! Admission-control enums: metered services, cost categories, protection
//! levels and emergency triggers.
//!
//! All four enums are plain tagged unions so that decision points in the
//! guard engine can `match` exhaustively -- adding a variant fails to
//! compile at every admission/transition site instead of silently falling
//! through a string comparison.

use std::fmt;

use serde::{Deserialize, Serialize};

// ── ServiceType ──────────────────────────────────────────────────────────

/// A metered external dependency whose consumption is tracked against a
/// monthly quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ServiceType {
    /// Function invocations, compute time and code storage.
    #[serde(rename = "lambda")]
    Lambda,
    /// CloudWatch API calls and custom metrics.
    #[serde(rename = "cloudwatch")]
    CloudWatch,
    /// SSM parameter store API calls.
    #[serde(rename = "ssm")]
    Ssm,
    /// CloudWatch Logs ingestion.
    #[serde(rename = "cloudwatch_logs")]
    CloudWatchLogs,
}

impl ServiceType {
    /// All tracked services, in quota-table order.
    pub const ALL: [ServiceType; 4] = [
        ServiceType::Lambda,
        ServiceType::CloudWatch,
        ServiceType::Ssm,
        ServiceType::CloudWatchLogs,
    ];

    /// Wire name used in persisted documents, log fields and blocked-op keys.
    pub fn wire_name(self) -> &'static str {
        match self {
            ServiceType::Lambda => "lambda",
            ServiceType::CloudWatch => "cloudwatch",
            ServiceType::Ssm => "ssm",
            ServiceType::CloudWatchLogs => "cloudwatch_logs",
        }
    }

    /// Parse a wire name. Returns `None` for unknown names.
    ///
    /// Unknown names are deliberately NOT an error: the service-level
    /// admission gate fails open for names it does not recognize, so new
    /// callers can ship before the guard learns about their service.
    pub fn parse(name: &str) -> Option<ServiceType> {
        match name {
            "lambda" => Some(ServiceType::Lambda),
            "cloudwatch" => Some(ServiceType::CloudWatch),
            "ssm" => Some(ServiceType::Ssm),
            "cloudwatch_logs" => Some(ServiceType::CloudWatchLogs),
            _ => None,
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

// ── CostCategory ─────────────────────────────────────────────────────────

/// Priority class attached to a unit of work by its caller.
///
/// Ordered by admission priority: [`CostCategory::Critical`] is never
/// blocked; [`CostCategory::LowPriority`] is the first to be shed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostCategory {
    /// Must always proceed (safety-relevant device commands, auth refresh).
    Critical,
    /// Regular gateway traffic (directive handling, state reports).
    Normal,
    /// Nice-to-have work (prefetching, cache warming).
    Optional,
    /// Background housekeeping (diagnostics uploads, report generation).
    LowPriority,
}

impl fmt::Display for CostCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CostCategory::Critical => "critical",
            CostCategory::Normal => "normal",
            CostCategory::Optional => "optional",
            CostCategory::LowPriority => "low_priority",
        };
        f.write_str(s)
    }
}

// ── ProtectionLevel ──────────────────────────────────────────────────────

/// Escalation stage of the guard engine, totally ordered by severity.
///
/// [`ProtectionLevel::Disabled`] is an administrative override that
/// short-circuits all escalation; it is never entered automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtectionLevel {
    /// Escalation switched off by an operator.
    Disabled,
    /// Normal operation, usage well under quota.
    Monitoring,
    /// Warning threshold crossed on at least one counter.
    Warning,
    /// Critical threshold crossed; optional work is shed.
    Protection,
    /// Emergency threshold crossed or manually latched; lockdown.
    Emergency,
}

impl fmt::Display for ProtectionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProtectionLevel::Disabled => "disabled",
            ProtectionLevel::Monitoring => "monitoring",
            ProtectionLevel::Warning => "warning",
            ProtectionLevel::Protection => "protection",
            ProtectionLevel::Emergency => "emergency",
        };
        f.write_str(s)
    }
}

// ── EmergencyTrigger ─────────────────────────────────────────────────────

/// Why emergency mode was entered. Diagnostics only -- the trigger is
/// recorded and reported but never consulted by admission decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmergencyTrigger {
    /// Operator called `set_state(_, emergency: true)`.
    Manual,
    /// A service crossed its emergency threshold.
    LimitBreach,
    /// Spend rate anomaly detected by an external watcher.
    CostSpike,
    /// Host memory pressure reported by an external watcher.
    MemoryPressure,
}

impl fmt::Display for EmergencyTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EmergencyTrigger::Manual => "manual",
            EmergencyTrigger::LimitBreach => "limit_breach",
            EmergencyTrigger::CostSpike => "cost_spike",
            EmergencyTrigger::MemoryPressure => "memory_pressure",
        };
        f.write_str(s)
    }
}

// ── Tests ────────────────────────────────────────────────────────────────
