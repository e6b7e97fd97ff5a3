//! Usage summary and plain-text report rendering.
//!
//! [`UsageSummary`] is the structured answer to "how close are we to the
//! bill?": one row per tracked counter with its percentage, ceiling and
//! status, plus the engine-level state (level, emergency diagnostics,
//! denial tallies). [`render`] turns it into the operator-facing text
//! report; anything fancier (dashboards, HTML) is out of scope here.

use std::collections::HashMap;
use std::fmt::Write as _;

use hearthgate_types::{EmergencyTrigger, ProtectionLevel, ServiceType};
use serde::{Deserialize, Serialize};

use crate::state::ProtectionState;
use crate::usage::percent;

// ── Status ───────────────────────────────────────────────────────────────

/// Per-counter status derived from the global thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageStatus {
    /// Below the warning threshold.
    Ok,
    /// At or above the warning threshold.
    Warning,
    /// At or above the critical threshold.
    Critical,
    /// At or above the emergency threshold.
    Emergency,
}

impl std::fmt::Display for UsageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            UsageStatus::Ok => "ok",
            UsageStatus::Warning => "warning",
            UsageStatus::Critical => "critical",
            UsageStatus::Emergency => "emergency",
        };
        f.write_str(s)
    }
}

// ── Summary types ────────────────────────────────────────────────────────

/// One tracked counter's position against its ceiling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterUsage {
    /// Counter name (matches the ledger field name).
    pub counter: String,
    /// Which service the counter belongs to.
    pub service: ServiceType,
    /// Percent of the monthly ceiling consumed.
    pub percent: f64,
    /// Current counter value.
    pub current: f64,
    /// Monthly ceiling. 0 = untracked.
    pub limit: f64,
    /// Human unit for `current` / `limit`.
    pub unit: String,
    /// Status against the global thresholds.
    pub status: UsageStatus,
}

/// The three escalation thresholds, echoed for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Warning threshold, percent.
    pub warning_percent: f64,
    /// Critical threshold, percent.
    pub critical_percent: f64,
    /// Emergency threshold, percent.
    pub emergency_percent: f64,
}

/// Full structured usage summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageSummary {
    /// Current protection level.
    pub level: ProtectionLevel,
    /// Whether emergency mode is latched.
    pub emergency_mode: bool,
    /// Why emergency mode was entered, if latched.
    pub emergency_trigger: Option<EmergencyTrigger>,
    /// Operator-readable emergency explanation, if latched.
    pub emergency_reason: Option<String>,
    /// One row per tracked counter.
    pub counters: Vec<CounterUsage>,
    /// Denial counts keyed by `"{service}_request"`.
    pub blocked_operations: HashMap<String, u64>,
    /// Services frozen by emergency limit breaches.
    pub blocked_services: Vec<ServiceType>,
    /// The escalation thresholds in force.
    pub thresholds: Thresholds,
}

// ── Building ─────────────────────────────────────────────────────────────

/// Build a summary from the current state.
pub fn summarize(state: &ProtectionState) -> UsageSummary {
    let usage = &state.usage;
    let limits = &state.limits;

    let rows: [(&str, ServiceType, f64, f64, &str); 8] = [
        (
            "lambda_invocations",
            ServiceType::Lambda,
            usage.lambda_invocations as f64,
            limits.lambda_invocations as f64,
            "requests",
        ),
        (
            "lambda_gb_seconds",
            ServiceType::Lambda,
            usage.lambda_gb_seconds,
            limits.lambda_gb_seconds,
            "GB-seconds",
        ),
        (
            "lambda_storage_mb",
            ServiceType::Lambda,
            usage.lambda_storage_mb,
            limits.lambda_storage_mb,
            "MB",
        ),
        (
            "cloudwatch_api_calls",
            ServiceType::CloudWatch,
            usage.cloudwatch_api_calls as f64,
            limits.cloudwatch_api_calls as f64,
            "calls",
        ),
        (
            "cloudwatch_custom_metrics",
            ServiceType::CloudWatch,
            usage.cloudwatch_custom_metrics as f64,
            limits.cloudwatch_custom_metrics as f64,
            "metrics",
        ),
        (
            "cloudwatch_logs_bytes",
            ServiceType::CloudWatchLogs,
            usage.cloudwatch_logs_bytes as f64,
            limits.cloudwatch_logs_bytes as f64,
            "bytes",
        ),
        (
            "ssm_api_calls",
            ServiceType::Ssm,
            usage.ssm_api_calls as f64,
            limits.ssm_api_calls as f64,
            "calls",
        ),
        (
            "ssm_advanced_params",
            ServiceType::Ssm,
            usage.ssm_advanced_params as f64,
            limits.ssm_advanced_params as f64,
            "parameters",
        ),
    ];

    let counters = rows
        .into_iter()
        .map(|(counter, service, current, limit, unit)| {
            let pct = percent(current, limit);
            CounterUsage {
                counter: counter.to_string(),
                service,
                percent: pct,
                current,
                limit,
                unit: unit.to_string(),
                status: status_for(pct, limits.warning_percent, limits.critical_percent, limits.emergency_percent),
            }
        })
        .collect();

    UsageSummary {
        level: state.protection_level,
        emergency_mode: state.emergency_mode,
        emergency_trigger: state.emergency_trigger,
        emergency_reason: state.emergency_reason.clone(),
        counters,
        blocked_operations: state.blocked_operations.clone(),
        blocked_services: state.blocked_services.iter().copied().collect(),
        thresholds: Thresholds {
            warning_percent: limits.warning_percent,
            critical_percent: limits.critical_percent,
            emergency_percent: limits.emergency_percent,
        },
    }
}

fn status_for(pct: f64, warning: f64, critical: f64, emergency: f64) -> UsageStatus {
    if pct >= emergency {
        UsageStatus::Emergency
    } else if pct >= critical {
        UsageStatus::Critical
    } else if pct >= warning {
        UsageStatus::Warning
    } else {
        UsageStatus::Ok
    }
}

// ── Rendering ────────────────────────────────────────────────────────────

/// Render the summary as a plain-text operator report.
pub fn render(summary: &UsageSummary) -> String {
    let mut out = String::new();

    let emergency = if summary.emergency_mode { "yes" } else { "no" };
    let _ = writeln!(
        out,
        "hearthgate cost protection -- level: {} (emergency: {emergency})",
        summary.level
    );
    if let Some(trigger) = summary.emergency_trigger {
        let reason = summary.emergency_reason.as_deref().unwrap_or("-");
        let _ = writeln!(out, "emergency trigger: {trigger} ({reason})");
    }
    let t = &summary.thresholds;
    let _ = writeln!(
        out,
        "thresholds: warning {:.0}% / critical {:.0}% / emergency {:.0}%",
        t.warning_percent, t.critical_percent, t.emergency_percent
    );
    let _ = writeln!(out);

    let _ = writeln!(
        out,
        "  {:<26} {:>14} {:>14} {:>7}  {}",
        "counter", "current", "limit", "used", "status"
    );
    for row in &summary.counters {
        let _ = writeln!(
            out,
            "  {:<26} {:>14.1} {:>14.1} {:>6.1}%  {} ({})",
            row.counter, row.current, row.limit, row.percent, row.status, row.unit
        );
    }

    if !summary.blocked_operations.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "blocked operations:");
        let mut keys: Vec<_> = summary.blocked_operations.iter().collect();
        keys.sort();
        for (key, count) in keys {
            let _ = writeln!(out, "  {key}: {count}");
        }
    }

    if !summary.blocked_services.is_empty() {
        let names: Vec<_> = summary
            .blocked_services
            .iter()
            .map(|s| s.wire_name())
            .collect();
        let _ = writeln!(out, "blocked services: {}", names.join(", "));
    }

    out
}

// ── Tests ────────────────────────────────────────────────────────────────
