//! The static quota table: monthly ceilings and escalation thresholds.
//!
//! Defaults are the AWS free-tier numbers for a single-account gateway
//! deployment. Ceilings are immutable at runtime except through an
//! explicit reconfiguration (see [`CostLimits::from_config`]).

use hearthgate_types::{GuardConfig, GuardError};
use serde::{Deserialize, Serialize};

// ── CostLimits ───────────────────────────────────────────────────────────

/// Monthly ceiling per tracked counter plus the three global escalation
/// thresholds (percent of any ceiling). A ceiling of 0 means the counter
/// is untracked: its usage percentage is always 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostLimits {
    /// Monthly Lambda invocation ceiling.
    pub lambda_invocations: u64,
    /// Monthly Lambda compute ceiling in GB-seconds.
    pub lambda_gb_seconds: f64,
    /// Lambda code storage ceiling in MB.
    pub lambda_storage_mb: f64,
    /// Monthly CloudWatch API call ceiling.
    pub cloudwatch_api_calls: u64,
    /// Custom CloudWatch metric ceiling.
    pub cloudwatch_custom_metrics: u64,
    /// Monthly CloudWatch Logs ingest ceiling in bytes.
    pub cloudwatch_logs_bytes: u64,
    /// Monthly SSM API call ceiling.
    pub ssm_api_calls: u64,
    /// SSM advanced parameter ceiling. 0 = untracked (standard tier only).
    pub ssm_advanced_params: u64,

    /// Warning threshold, percent.
    pub warning_percent: f64,
    /// Critical threshold, percent. Crossing it enters `Protection`.
    pub critical_percent: f64,
    /// Emergency threshold, percent. Crossing it latches `Emergency`.
    pub emergency_percent: f64,
}

impl Default for CostLimits {
    fn default() -> Self {
        Self {
            lambda_invocations: 1_000_000,
            lambda_gb_seconds: 400_000.0,
            lambda_storage_mb: 75_000.0,
            cloudwatch_api_calls: 1_000_000,
            cloudwatch_custom_metrics: 10,
            cloudwatch_logs_bytes: 5 * 1024 * 1024 * 1024,
            ssm_api_calls: 1_000_000,
            ssm_advanced_params: 0,
            warning_percent: 75.0,
            critical_percent: 90.0,
            emergency_percent: 95.0,
        }
    }
}

impl CostLimits {
    /// Build a quota table from configuration overrides.
    ///
    /// Starts from the free-tier defaults, applies every override present
    /// in the config, then validates. Invalid overrides are rejected as a
    /// whole so a typo cannot silently disarm the guard.
    pub fn from_config(config: &GuardConfig) -> Result<Self, GuardError> {
        let mut limits = Self::default();
        let o = &config.limits;
        if let Some(v) = o.lambda_invocations {
            limits.lambda_invocations = v;
        }
        if let Some(v) = o.lambda_gb_seconds {
            limits.lambda_gb_seconds = v;
        }
        if let Some(v) = o.lambda_storage_mb {
            limits.lambda_storage_mb = v;
        }
        if let Some(v) = o.cloudwatch_api_calls {
            limits.cloudwatch_api_calls = v;
        }
        if let Some(v) = o.cloudwatch_custom_metrics {
            limits.cloudwatch_custom_metrics = v;
        }
        if let Some(v) = o.cloudwatch_logs_bytes {
            limits.cloudwatch_logs_bytes = v;
        }
        if let Some(v) = o.ssm_api_calls {
            limits.ssm_api_calls = v;
        }
        if let Some(v) = o.ssm_advanced_params {
            limits.ssm_advanced_params = v;
        }
        if let Some(v) = o.warning_percent {
            limits.warning_percent = v;
        }
        if let Some(v) = o.critical_percent {
            limits.critical_percent = v;
        }
        if let Some(v) = o.emergency_percent {
            limits.emergency_percent = v;
        }
        limits.validate()?;
        Ok(limits)
    }

    /// Check threshold ordering and ranges.
    ///
    /// Thresholds must satisfy `0 < warning < critical < emergency <= 100`.
    pub fn validate(&self) -> Result<(), GuardError> {
        let (w, c, e) = (
            self.warning_percent,
            self.critical_percent,
            self.emergency_percent,
        );
        if !(w.is_finite() && c.is_finite() && e.is_finite()) {
            return Err(GuardError::ConfigInvalid {
                reason: "thresholds must be finite".into(),
            });
        }
        if !(0.0 < w && w < c && c < e && e <= 100.0) {
            return Err(GuardError::ConfigInvalid {
                reason: format!(
                    "thresholds must satisfy 0 < warning ({w}) < critical ({c}) < emergency ({e}) <= 100"
                ),
            });
        }
        if self.lambda_gb_seconds < 0.0 || self.lambda_storage_mb < 0.0 {
            return Err(GuardError::ConfigInvalid {
                reason: "ceilings must be non-negative".into(),
            });
        }
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use hearthgate_types::GuardConfig;

    #[test]
    fn defaults_validate() {
        CostLimits::default().validate().expect("defaults must be valid");
    }

    #[test]
    fn default_thresholds_match_policy() {
        let limits = CostLimits::default();
        assert_eq!(limits.warning_percent, 75.0);
        assert_eq!(limits.critical_percent, 90.0);
        assert_eq!(limits.emergency_percent, 95.0);
    }

    #[test]
    fn from_config_applies_overrides() {
        let mut config = GuardConfig::default();
        config.limits.lambda_invocations = Some(100);
        config.limits.warning_percent = Some(50.0);
        let limits = CostLimits::from_config(&config).unwrap();
        assert_eq!(limits.lambda_invocations, 100);
        assert_eq!(limits.warning_percent, 50.0);
        // Untouched fields keep their defaults.
        assert_eq!(limits.ssm_api_calls, 1_000_000);
    }

    #[test]
    fn from_config_rejects_unordered_thresholds() {
        let mut config = GuardConfig::default();
        config.limits.warning_percent = Some(95.0);
        config.limits.critical_percent = Some(80.0);
        let err = CostLimits::from_config(&config).unwrap_err();
        assert!(matches!(err, GuardError::ConfigInvalid { .. }));
    }

    #[test]
    fn validate_rejects_out_of_range_emergency() {
        let mut limits = CostLimits::default();
        limits.emergency_percent = 150.0;
        assert!(limits.validate().is_err());
    }

    #[test]
    fn validate_rejects_nan_threshold() {
        let mut limits = CostLimits::default();
        limits.warning_percent = f64::NAN;
        assert!(limits.validate().is_err());
    }
}
