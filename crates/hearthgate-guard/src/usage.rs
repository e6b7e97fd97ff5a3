//! The usage ledger: mutable consumption counters per metered service.
//!
//! Counters are monotonically non-decreasing within an epoch; they are
//! reset only by the epoch manager (month rollover) or an explicit test
//! reset. Call-count counters are `u64` so decrements are unrepresentable;
//! the `f64` counters (compute seconds, storage) reject negative deltas
//! with [`GuardError::NegativeDelta`] without mutating state.

use chrono::{DateTime, Utc};
use hearthgate_types::{GuardError, ServiceType};
use serde::{Deserialize, Serialize};

use crate::limits::CostLimits;

// ── UsageMetrics ─────────────────────────────────────────────────────────

/// Consumption counters since the last epoch reset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageMetrics {
    /// Lambda invocations.
    pub lambda_invocations: u64,
    /// Lambda compute in GB-seconds.
    pub lambda_gb_seconds: f64,
    /// Lambda code storage in MB.
    pub lambda_storage_mb: f64,
    /// CloudWatch API calls.
    pub cloudwatch_api_calls: u64,
    /// Custom CloudWatch metrics published.
    pub cloudwatch_custom_metrics: u64,
    /// CloudWatch Logs bytes ingested.
    pub cloudwatch_logs_bytes: u64,
    /// SSM API calls.
    pub ssm_api_calls: u64,
    /// SSM advanced parameters in use.
    pub ssm_advanced_params: u64,

    /// Start of the current accounting epoch.
    pub last_reset: DateTime<Utc>,
    /// When any counter last moved.
    pub last_updated: DateTime<Utc>,
}

impl UsageMetrics {
    /// Fresh ledger with all counters at zero and both timestamps at `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            lambda_invocations: 0,
            lambda_gb_seconds: 0.0,
            lambda_storage_mb: 0.0,
            cloudwatch_api_calls: 0,
            cloudwatch_custom_metrics: 0,
            cloudwatch_logs_bytes: 0,
            ssm_api_calls: 0,
            ssm_advanced_params: 0,
            last_reset: now,
            last_updated: now,
        }
    }

    // ── Recording ───────────────────────────────────────────────────

    /// Add Lambda invocations.
    pub fn add_lambda_invocations(&mut self, count: u64, now: DateTime<Utc>) {
        self.lambda_invocations += count;
        self.last_updated = now;
    }

    /// Add Lambda compute time in GB-seconds. Negative or non-finite
    /// deltas are rejected without mutating state.
    pub fn add_lambda_gb_seconds(
        &mut self,
        gb_seconds: f64,
        now: DateTime<Utc>,
    ) -> Result<(), GuardError> {
        if !gb_seconds.is_finite() || gb_seconds < 0.0 {
            return Err(GuardError::NegativeDelta {
                counter: "lambda_gb_seconds",
                delta: gb_seconds,
            });
        }
        self.lambda_gb_seconds += gb_seconds;
        self.last_updated = now;
        Ok(())
    }

    /// Add to the Lambda code storage footprint in MB. Storage is sampled
    /// by the caller; it may only grow within an epoch.
    pub fn add_lambda_storage_mb(
        &mut self,
        mb: f64,
        now: DateTime<Utc>,
    ) -> Result<(), GuardError> {
        if !mb.is_finite() || mb < 0.0 {
            return Err(GuardError::NegativeDelta {
                counter: "lambda_storage_mb",
                delta: mb,
            });
        }
        self.lambda_storage_mb += mb;
        self.last_updated = now;
        Ok(())
    }

    /// Add CloudWatch API calls.
    pub fn add_cloudwatch_api_calls(&mut self, count: u64, now: DateTime<Utc>) {
        self.cloudwatch_api_calls += count;
        self.last_updated = now;
    }

    /// Add published custom CloudWatch metrics.
    pub fn add_cloudwatch_custom_metrics(&mut self, count: u64, now: DateTime<Utc>) {
        self.cloudwatch_custom_metrics += count;
        self.last_updated = now;
    }

    /// Add CloudWatch Logs ingest bytes.
    pub fn add_cloudwatch_logs_bytes(&mut self, bytes: u64, now: DateTime<Utc>) {
        self.cloudwatch_logs_bytes += bytes;
        self.last_updated = now;
    }

    /// Add SSM API calls.
    pub fn add_ssm_api_calls(&mut self, count: u64, now: DateTime<Utc>) {
        self.ssm_api_calls += count;
        self.last_updated = now;
    }

    /// Add SSM advanced parameters.
    pub fn add_ssm_advanced_params(&mut self, count: u64, now: DateTime<Utc>) {
        self.ssm_advanced_params += count;
        self.last_updated = now;
    }

    // ── Percent-of-quota ────────────────────────────────────────────

    /// Percentage of quota consumed for a service.
    ///
    /// A service can own more than one counter (Lambda has invocations,
    /// compute and storage); the reported figure is the most-consumed
    /// counter, since any single counter hitting its ceiling starts
    /// billing.
    pub fn usage_percent(&self, service: ServiceType, limits: &CostLimits) -> f64 {
        match service {
            ServiceType::Lambda => max3(
                percent(self.lambda_invocations as f64, limits.lambda_invocations as f64),
                percent(self.lambda_gb_seconds, limits.lambda_gb_seconds),
                percent(self.lambda_storage_mb, limits.lambda_storage_mb),
            ),
            ServiceType::CloudWatch => max3(
                percent(
                    self.cloudwatch_api_calls as f64,
                    limits.cloudwatch_api_calls as f64,
                ),
                percent(
                    self.cloudwatch_custom_metrics as f64,
                    limits.cloudwatch_custom_metrics as f64,
                ),
                0.0,
            ),
            ServiceType::CloudWatchLogs => percent(
                self.cloudwatch_logs_bytes as f64,
                limits.cloudwatch_logs_bytes as f64,
            ),
            ServiceType::Ssm => max3(
                percent(self.ssm_api_calls as f64, limits.ssm_api_calls as f64),
                percent(
                    self.ssm_advanced_params as f64,
                    limits.ssm_advanced_params as f64,
                ),
                0.0,
            ),
        }
    }

    /// Zero all counters and open a new epoch at `now`.
    pub fn reset(&mut self, now: DateTime<Utc>) {
        *self = Self::new(now);
    }
}

/// `100 * current / limit`, with untracked (zero) limits reporting 0.
pub(crate) fn percent(current: f64, limit: f64) -> f64 {
    if limit <= 0.0 {
        return 0.0;
    }
    100.0 * current / limit
}

fn max3(a: f64, b: f64, c: f64) -> f64 {
    a.max(b).max(c)
}

// ── Tests ────────────────────────────────────────────────────────────────
