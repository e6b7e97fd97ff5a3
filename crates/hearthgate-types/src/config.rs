//! Configuration schema for the guard engine.
//!
//! All fields are optional with serde defaults; unknown fields are
//! silently ignored for forward compatibility. Loading never fails: a
//! missing or unparsable file falls back to defaults with a warning,
//! because the protection system must not itself block startup.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

// ── Root config ──────────────────────────────────────────────────────────

/// Root configuration for the cost-protection engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Master switch. `false` pins the engine at the `Disabled` level:
    /// usage is still recorded but nothing escalates and nothing blocks.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Monthly ceiling and threshold overrides.
    #[serde(default)]
    pub limits: LimitOverrides,

    /// State persistence settings.
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

fn default_enabled() -> bool {
    true
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            limits: LimitOverrides::default(),
            persistence: PersistenceConfig::default(),
        }
    }
}

impl GuardConfig {
    /// Load configuration from a TOML file.
    ///
    /// A missing file is normal (defaults apply silently). A file that
    /// exists but fails to read or parse also yields defaults, with a
    /// warning -- config problems must never prevent the guard from
    /// coming up.
    pub fn load(path: &Path) -> Self {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Self::default();
            }
            Err(err) => {
                warn!(path = %path.display(), %err, "failed to read guard config, using defaults");
                return Self::default();
            }
        };
        match toml::from_str(&raw) {
            Ok(config) => config,
            Err(err) => {
                warn!(path = %path.display(), %err, "failed to parse guard config, using defaults");
                Self::default()
            }
        }
    }
}

// ── Limit overrides ──────────────────────────────────────────────────────

/// Optional overrides for the quota table. `None` keeps the built-in
/// free-tier default for that counter.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LimitOverrides {
    /// Monthly Lambda invocation ceiling.
    pub lambda_invocations: Option<u64>,
    /// Monthly Lambda compute ceiling in GB-seconds.
    pub lambda_gb_seconds: Option<f64>,
    /// Lambda code storage ceiling in MB.
    pub lambda_storage_mb: Option<f64>,
    /// Monthly CloudWatch API call ceiling.
    pub cloudwatch_api_calls: Option<u64>,
    /// Custom CloudWatch metric ceiling.
    pub cloudwatch_custom_metrics: Option<u64>,
    /// Monthly CloudWatch Logs ingest ceiling in bytes.
    pub cloudwatch_logs_bytes: Option<u64>,
    /// Monthly SSM API call ceiling.
    pub ssm_api_calls: Option<u64>,
    /// SSM advanced parameter ceiling. 0 = untracked.
    pub ssm_advanced_params: Option<u64>,
    /// Warning threshold as a percentage of any ceiling.
    pub warning_percent: Option<f64>,
    /// Critical threshold as a percentage of any ceiling.
    pub critical_percent: Option<f64>,
    /// Emergency threshold as a percentage of any ceiling.
    pub emergency_percent: Option<f64>,
}

// ── Persistence ──────────────────────────────────────────────────────────

/// State persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Where the state document is written. Defaults to
    /// `hearthgate_state.json` under the OS temp dir (the only writable
    /// path on a stock serverless instance).
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Write the document every Nth save request. High-frequency counter
    /// updates are coalesced to bound I/O; emergency transitions always
    /// force an immediate write regardless of this interval.
    #[serde(default = "default_save_interval")]
    pub save_interval: u32,
}

fn default_save_interval() -> u32 {
    10
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            path: None,
            save_interval: default_save_interval(),
        }
    }
}

impl PersistenceConfig {
    /// Resolved persistence path (configured path or the temp-dir default).
    pub fn resolved_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("hearthgate_state.json"))
    }
}

// ── Tests ────────────────────────────────────────────────────────────────
