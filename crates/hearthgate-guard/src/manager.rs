//! The cost-protection manager: composition root and public API.
//!
//! [`CostGuard`] owns the protection state behind a single lock, wires
//! the ledger, epoch manager, state machine, admission gate, callback
//! registry and store together, and exposes the API the rest of the
//! gateway calls. Admission checks take the read lock only; every
//! mutation path (recording, overrides, resets) runs under the write
//! lock, with callbacks fired and persistence performed after the lock
//! is released so neither can stall the critical section.
//!
//! Persistence is best-effort and throttled: recording calls request a
//! save on every mutation but only every Nth request hits the store;
//! emergency transitions force an immediate write. A store failure is
//! logged and swallowed -- the guard must never become the outage.
//!
//! A process-wide instance is available through [`guard`], created
//! lazily under a module-level lock and torn down by [`cleanup`]
//! (which tests use between cases). Embedding callers can equally
//! construct a [`CostGuard`] themselves and pass it around.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use hearthgate_types::{CostCategory, GuardConfig, ProtectionLevel, ServiceType};
use tracing::{debug, info, warn};

use crate::callbacks::{CallbackRegistry, LevelCallback};
use crate::epoch;
use crate::gate::{self, Verdict};
use crate::limits::CostLimits;
use crate::report::{self, UsageSummary};
use crate::state::ProtectionState;
use crate::store::{FileStore, StateDocument, StateStore, load_validated};
use crate::telemetry::{MetricsSink, TracingMetrics};
use crate::usage::UsageMetrics;

// ── CostGuard ────────────────────────────────────────────────────────────

/// Quota-aware admission-control engine.
pub struct CostGuard {
    /// The aggregate, mutated only under the write lock.
    state: RwLock<ProtectionState>,
    /// Level-transition subscriptions.
    callbacks: RwLock<CallbackRegistry>,
    /// Durable slot for cold-start survival.
    store: Box<dyn StateStore>,
    /// Fire-and-forget metrics boundary.
    metrics: Box<dyn MetricsSink>,
    /// Physical write every Nth save request (emergency forces through).
    save_interval: u32,
    /// Save requests since startup.
    save_counter: AtomicU32,
}

impl CostGuard {
    /// Engine with the given quota table and store, starting from
    /// persisted state when the slot holds a valid document.
    pub fn new(limits: CostLimits, store: Box<dyn StateStore>) -> Self {
        Self::build(limits, store, true)
    }

    /// Engine pinned at the `Disabled` level (config master switch off).
    pub fn new_disabled(limits: CostLimits, store: Box<dyn StateStore>) -> Self {
        Self::build(limits, store, false)
    }

    fn build(limits: CostLimits, store: Box<dyn StateStore>, enabled: bool) -> Self {
        let now = Utc::now();
        let mut state = match load_validated(store.as_ref()) {
            Some(doc) => {
                info!(saved_at = %doc.saved_at, "restored guard state from store");
                let mut state = doc.state;
                // The configured quota table wins over the persisted one:
                // reconfiguration takes effect on the next cold start.
                state.limits = limits;
                state
            }
            None => ProtectionState::new(limits, now),
        };
        if !enabled {
            // Keep the loaded ledger; pin the level.
            state.clear_emergency();
            state.protection_level = ProtectionLevel::Disabled;
        } else if state.protection_level == ProtectionLevel::Disabled {
            // The pin is config-derived, not usage-derived: a document
            // written by a disabled run must not keep a re-enabled guard
            // disarmed.
            state.protection_level = ProtectionLevel::Monitoring;
        }
        epoch::maybe_reset(&mut state, now);

        Self {
            state: RwLock::new(state),
            callbacks: RwLock::new(CallbackRegistry::new()),
            store,
            metrics: Box::new(TracingMetrics),
            save_interval: 10,
            save_counter: AtomicU32::new(0),
        }
    }

    /// Engine from configuration: quota overrides, file store, throttle.
    ///
    /// Invalid limit overrides are rejected as a whole (defaults used)
    /// rather than partially applied; a config problem must not leave the
    /// guard half-armed or prevent startup.
    pub fn from_config(config: &GuardConfig) -> Self {
        let limits = match CostLimits::from_config(config) {
            Ok(limits) => limits,
            Err(err) => {
                warn!(%err, "invalid limit overrides, using free-tier defaults");
                CostLimits::default()
            }
        };
        let store = Box::new(FileStore::new(config.persistence.resolved_path()));
        let mut manager = if config.enabled {
            Self::new(limits, store)
        } else {
            Self::new_disabled(limits, store)
        };
        manager.save_interval = config.persistence.save_interval.max(1);
        manager
    }

    /// Builder: replace the metrics sink.
    pub fn with_metrics(mut self, metrics: Box<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Builder: physical write every `interval`th save request.
    pub fn with_save_interval(mut self, interval: u32) -> Self {
        self.save_interval = interval.max(1);
        self
    }

    // ── Admission checks (read path) ────────────────────────────────

    /// `true` when the engine is actively shedding work
    /// (`Protection` or `Emergency`).
    pub fn is_active(&self) -> bool {
        let state = self.state.read().expect("guard state lock poisoned");
        match state.protection_level {
            ProtectionLevel::Protection | ProtectionLevel::Emergency => true,
            ProtectionLevel::Disabled
            | ProtectionLevel::Monitoring
            | ProtectionLevel::Warning => false,
        }
    }

    /// `true` while emergency mode is latched.
    pub fn is_emergency(&self) -> bool {
        self.state
            .read()
            .expect("guard state lock poisoned")
            .emergency_mode
    }

    /// Current protection level.
    pub fn level(&self) -> ProtectionLevel {
        self.state
            .read()
            .expect("guard state lock poisoned")
            .protection_level
    }

    /// Fine-grained admission check: should a unit of work in `category`,
    /// targeting `service`, be blocked?
    ///
    /// A blocked answer bumps the denial tally under
    /// `"{service}_request"` and emits a metric sample.
    pub fn should_block(&self, category: CostCategory, service: Option<ServiceType>) -> bool {
        let decision = {
            let state = self.state.read().expect("guard state lock poisoned");
            gate::verdict(&state, category)
        };
        match decision {
            Verdict::Allowed => false,
            Verdict::Blocked { reason } => {
                self.note_blocked(category, service, reason);
                true
            }
        }
    }

    /// Bump the denial tally and emit a metric for a blocked request.
    fn note_blocked(
        &self,
        category: CostCategory,
        service: Option<ServiceType>,
        reason: &'static str,
    ) {
        let key = gate::blocked_key(service);
        {
            let mut state = self.state.write().expect("guard state lock poisoned");
            state.note_blocked(&key);
        }
        let service_tag = service.map_or("unknown", ServiceType::wire_name);
        debug!(service = service_tag, %category, reason, "request blocked");
        self.metrics.record(
            "hearthgate.blocked_operations",
            1.0,
            &[("service", service_tag), ("category", category_name(category))],
        );
    }

    /// Coarse service-level gate for callers without a [`CostCategory`].
    /// Unknown service names are allowed (fail-open).
    pub fn can_use(&self, service_name: &str) -> bool {
        let state = self.state.read().expect("guard state lock poisoned");
        gate::service_allowed(&state, service_name)
    }

    // ── Operator overrides ──────────────────────────────────────────

    /// Force protection (`active`) or emergency mode on or off,
    /// bypassing all percentage checks.
    pub fn set_state(&self, active: bool, emergency: bool) {
        let now = Utc::now();
        let entered = {
            let mut state = self.state.write().expect("guard state lock poisoned");
            state.set_levels(active, emergency, now)
        };
        self.after_transition(entered);
        // Operator actions are rare and important: always hit the store.
        self.persist(true);
    }

    /// Clear a latched emergency. Returns `false` when there was nothing
    /// to reset.
    ///
    /// Operator actions fire the `Monitoring` callbacks, same as
    /// [`CostGuard::set_state`]. Epoch-driven de-escalation does not.
    pub fn reset_emergency(&self) -> bool {
        {
            let mut state = self.state.write().expect("guard state lock poisoned");
            if !state.emergency_mode {
                return false;
            }
            state.clear_emergency();
        }
        info!("emergency mode cleared by operator");
        self.after_transition(Some(ProtectionLevel::Monitoring));
        self.persist(true);
        true
    }

    // ── Usage recording ─────────────────────────────────────────────

    /// Record one Lambda invocation. Returns `false` when the recording
    /// call itself was blocked by admission control before being counted.
    pub fn record_lambda_invocation(&self) -> bool {
        self.record(ServiceType::Lambda, |usage, now| {
            usage.add_lambda_invocations(1, now);
            Ok(())
        })
    }

    /// Record Lambda compute time in GB-seconds. Negative deltas are
    /// rejected (counters are monotonic) and return `false`.
    pub fn record_lambda_compute_seconds(&self, gb_seconds: f64) -> bool {
        self.record(ServiceType::Lambda, |usage, now| {
            usage.add_lambda_gb_seconds(gb_seconds, now)
        })
    }

    /// Record CloudWatch API calls.
    pub fn record_cloudwatch_api_call(&self, count: u64) -> bool {
        self.record(ServiceType::CloudWatch, |usage, now| {
            usage.add_cloudwatch_api_calls(count, now);
            Ok(())
        })
    }

    /// Record published custom CloudWatch metrics.
    pub fn record_cloudwatch_metric(&self, count: u64) -> bool {
        self.record(ServiceType::CloudWatch, |usage, now| {
            usage.add_cloudwatch_custom_metrics(count, now);
            Ok(())
        })
    }

    /// Record CloudWatch Logs ingest bytes.
    pub fn record_cloudwatch_logs_bytes(&self, bytes: u64) -> bool {
        self.record(ServiceType::CloudWatchLogs, |usage, now| {
            usage.add_cloudwatch_logs_bytes(bytes, now);
            Ok(())
        })
    }

    /// Record SSM API calls.
    pub fn record_ssm_api_call(&self, count: u64) -> bool {
        self.record(ServiceType::Ssm, |usage, now| {
            usage.add_ssm_api_calls(count, now);
            Ok(())
        })
    }

    /// Shared recording path: epoch check, admission check, ledger
    /// update, re-evaluation, then callbacks and a throttled save.
    fn record<F>(&self, service: ServiceType, apply: F) -> bool
    where
        F: FnOnce(&mut UsageMetrics, DateTime<Utc>) -> Result<(), hearthgate_types::GuardError>,
    {
        self.record_at(service, Utc::now(), apply)
    }

    fn record_at<F>(&self, service: ServiceType, now: DateTime<Utc>, apply: F) -> bool
    where
        F: FnOnce(&mut UsageMetrics, DateTime<Utc>) -> Result<(), hearthgate_types::GuardError>,
    {
        let (entered, emergency_toggled) = {
            let mut state = self.state.write().expect("guard state lock poisoned");
            // Captured before the epoch check: a rollover that clears a
            // stale emergency is itself an emergency-mode transition and
            // must force the save below.
            let was_emergency = state.emergency_mode;
            epoch::maybe_reset(&mut state, now);

            // The recording call is itself a unit of (normal) work.
            match gate::verdict(&state, CostCategory::Normal) {
                Verdict::Allowed => {}
                Verdict::Blocked { reason } => {
                    state.note_blocked(&gate::blocked_key(Some(service)));
                    drop(state);
                    debug!(%service, reason, "usage recording blocked by admission control");
                    self.metrics.record(
                        "hearthgate.blocked_operations",
                        1.0,
                        &[("service", service.wire_name()), ("category", "normal")],
                    );
                    return false;
                }
            }

            if let Err(err) = apply(&mut state.usage, now) {
                warn!(%service, %err, "rejected usage delta");
                return false;
            }

            let entered = state.reevaluate(service, now);
            (entered, state.emergency_mode != was_emergency)
        };

        self.after_transition(entered);
        self.persist(emergency_toggled);
        true
    }

    // ── Summary / report ────────────────────────────────────────────

    /// Structured usage summary.
    pub fn usage_summary(&self) -> UsageSummary {
        let state = self.state.read().expect("guard state lock poisoned");
        report::summarize(&state)
    }

    /// Plain-text operator report.
    pub fn report(&self) -> String {
        report::render(&self.usage_summary())
    }

    // ── Callbacks ───────────────────────────────────────────────────

    /// Subscribe `callback` (under `name`, for log attribution) to
    /// transitions into `level`.
    pub fn register_callback(
        &self,
        level: ProtectionLevel,
        name: impl Into<String>,
        callback: LevelCallback,
    ) {
        self.callbacks
            .write()
            .expect("guard callback lock poisoned")
            .register(level, name, callback);
    }

    /// Drop all registered callbacks (teardown).
    pub fn clear_callbacks(&self) {
        self.callbacks
            .write()
            .expect("guard callback lock poisoned")
            .clear();
    }

    fn after_transition(&self, entered: Option<ProtectionLevel>) {
        let Some(level) = entered else {
            return;
        };
        self.metrics.record(
            "hearthgate.protection_level",
            level_sample(level),
            &[("level", level_name(level))],
        );
        self.callbacks
            .read()
            .expect("guard callback lock poisoned")
            .fire(level);
    }

    // ── Persistence ─────────────────────────────────────────────────

    /// Request a save. Throttled to every Nth request unless `force`.
    /// Failures are logged and swallowed.
    fn persist(&self, force: bool) {
        let n = self.save_counter.fetch_add(1, Ordering::Relaxed);
        if !force && n % self.save_interval != 0 {
            return;
        }
        let doc = {
            let state = self.state.read().expect("guard state lock poisoned");
            StateDocument::new(&state, Utc::now())
        };
        if let Err(err) = self.store.put(&doc) {
            warn!(%err, "failed to persist guard state");
        }
    }

    /// Write the current state out unconditionally (teardown path).
    pub fn flush(&self) {
        self.persist(true);
    }
}

impl std::fmt::Debug for CostGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read().expect("guard state lock poisoned");
        f.debug_struct("CostGuard")
            .field("level", &state.protection_level)
            .field("emergency_mode", &state.emergency_mode)
            .field("save_interval", &self.save_interval)
            .finish()
    }
}

fn category_name(category: CostCategory) -> &'static str {
    match category {
        CostCategory::Critical => "critical",
        CostCategory::Normal => "normal",
        CostCategory::Optional => "optional",
        CostCategory::LowPriority => "low_priority",
    }
}

fn level_name(level: ProtectionLevel) -> &'static str {
    match level {
        ProtectionLevel::Disabled => "disabled",
        ProtectionLevel::Monitoring => "monitoring",
        ProtectionLevel::Warning => "warning",
        ProtectionLevel::Protection => "protection",
        ProtectionLevel::Emergency => "emergency",
    }
}

fn level_sample(level: ProtectionLevel) -> f64 {
    match level {
        ProtectionLevel::Disabled => 0.0,
        ProtectionLevel::Monitoring => 1.0,
        ProtectionLevel::Warning => 2.0,
        ProtectionLevel::Protection => 3.0,
        ProtectionLevel::Emergency => 4.0,
    }
}

// ── Process-wide instance ────────────────────────────────────────────────

static GLOBAL: Mutex<Option<Arc<CostGuard>>> = Mutex::new(None);

/// Path of the config file consulted by [`guard`]: the
/// `HEARTHGATE_CONFIG` environment variable, or `hearthgate.toml` in the
/// working directory.
fn config_path() -> PathBuf {
    std::env::var_os("HEARTHGATE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("hearthgate.toml"))
}

/// The process-wide guard, created lazily under a module-level lock.
///
/// Call sites that can take a `&CostGuard` by injection should prefer
/// that; this accessor exists for entry points (the Lambda handler) that
/// have nowhere to thread a context through.
pub fn guard() -> Arc<CostGuard> {
    let mut slot = GLOBAL.lock().expect("global guard lock poisoned");
    if let Some(existing) = slot.as_ref() {
        return Arc::clone(existing);
    }
    let config = GuardConfig::load(&config_path());
    let created = Arc::new(CostGuard::from_config(&config));
    *slot = Some(Arc::clone(&created));
    created
}

/// Tear down the process-wide guard: flush a final save, drop all
/// callbacks, release the instance. Used by tests between cases.
pub fn cleanup() {
    let taken = GLOBAL.lock().expect("global guard lock poisoned").take();
    if let Some(existing) = taken {
        existing.flush();
        existing.clear_callbacks();
    }
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::sync::atomic::AtomicU32;

    fn small_limits() -> CostLimits {
        CostLimits {
            lambda_invocations: 100,
            cloudwatch_api_calls: 100,
            ssm_api_calls: 100,
            cloudwatch_logs_bytes: 1000,
            ..CostLimits::default()
        }
    }

    fn guard_with_memory_store() -> CostGuard {
        CostGuard::new(small_limits(), Box::new(MemoryStore::new())).with_save_interval(1)
    }

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    /// Store handle that can outlive the guard, for cold-start tests.
    struct SharedStore(Arc<MemoryStore>);

    impl StateStore for SharedStore {
        fn put(&self, doc: &StateDocument) -> Result<(), hearthgate_types::GuardError> {
            self.0.put(doc)
        }
        fn get(&self) -> Result<Option<StateDocument>, hearthgate_types::GuardError> {
            self.0.get()
        }
    }

    // ── Recording and escalation ────────────────────────────────────

    #[test]
    fn fresh_guard_is_monitoring_and_inactive() {
        let guard = guard_with_memory_store();
        assert_eq!(guard.level(), ProtectionLevel::Monitoring);
        assert!(!guard.is_active());
        assert!(!guard.is_emergency());
    }

    #[test]
    fn recording_returns_true_while_admitted() {
        let guard = guard_with_memory_store();
        assert!(guard.record_lambda_invocation());
        assert!(guard.record_cloudwatch_api_call(5));
        assert!(guard.record_ssm_api_call(1));
        assert!(guard.record_cloudwatch_logs_bytes(100));
    }

    #[test]
    fn recording_blocked_during_emergency_returns_false() {
        let guard = guard_with_memory_store();
        guard.set_state(false, true);
        assert!(guard.is_emergency());

        assert!(!guard.record_lambda_invocation());
        // The denied recording shows up in the tally.
        let summary = guard.usage_summary();
        assert_eq!(summary.blocked_operations["lambda_request"], 1);
        // And the counter did not move.
        let row = summary
            .counters
            .iter()
            .find(|r| r.counter == "lambda_invocations")
            .unwrap();
        assert_eq!(row.current, 0.0);
    }

    #[test]
    fn negative_compute_delta_returns_false_without_mutation() {
        let guard = guard_with_memory_store();
        assert!(!guard.record_lambda_compute_seconds(-2.0));
        let summary = guard.usage_summary();
        let row = summary
            .counters
            .iter()
            .find(|r| r.counter == "lambda_gb_seconds")
            .unwrap();
        assert_eq!(row.current, 0.0);
    }

    #[test]
    fn escalation_walk_up_matches_policy() {
        let guard = guard_with_memory_store();

        for _ in 0..74 {
            assert!(guard.record_lambda_invocation());
        }
        assert_eq!(guard.level(), ProtectionLevel::Monitoring);
        assert!(!guard.should_block(CostCategory::Normal, Some(ServiceType::Lambda)));

        assert!(guard.record_lambda_invocation()); // 75
        assert_eq!(guard.level(), ProtectionLevel::Warning);

        for _ in 0..16 {
            guard.record_lambda_invocation(); // 91
        }
        assert_eq!(guard.level(), ProtectionLevel::Protection);
        assert!(guard.is_active());
        assert!(guard.should_block(CostCategory::Optional, Some(ServiceType::Lambda)));

        for _ in 0..5 {
            guard.record_lambda_invocation(); // up to 96 (blocked past 95)
        }
        assert!(guard.is_emergency());
        assert!(guard.should_block(CostCategory::Normal, Some(ServiceType::Lambda)));
        assert!(!guard.should_block(CostCategory::Critical, Some(ServiceType::Lambda)));
    }

    #[test]
    fn should_block_bumps_tally_with_service_key() {
        let guard = guard_with_memory_store();
        guard.set_state(true, false);

        assert!(guard.should_block(CostCategory::Optional, Some(ServiceType::Ssm)));
        assert!(guard.should_block(CostCategory::Optional, None));

        let summary = guard.usage_summary();
        assert_eq!(summary.blocked_operations["ssm_request"], 1);
        assert_eq!(summary.blocked_operations["unknown_request"], 1);
    }

    #[test]
    fn can_use_respects_protection_level() {
        let guard = guard_with_memory_store();
        assert!(guard.can_use("ssm"));
        guard.set_state(true, false);
        assert!(guard.can_use("lambda"));
        assert!(!guard.can_use("ssm"));
        assert!(guard.can_use("some_future_service"));
    }

    // ── Operator overrides ──────────────────────────────────────────

    #[test]
    fn manual_emergency_and_stand_down() {
        let guard = guard_with_memory_store();
        guard.set_state(false, true);
        assert!(guard.is_emergency());
        assert_eq!(guard.level(), ProtectionLevel::Emergency);

        guard.set_state(false, false);
        assert!(!guard.is_emergency());
        assert_eq!(guard.level(), ProtectionLevel::Monitoring);
        assert!(guard.usage_summary().blocked_services.is_empty());

        // Nothing left to reset.
        assert!(!guard.reset_emergency());
    }

    #[test]
    fn reset_emergency_clears_latched_state() {
        let guard = guard_with_memory_store();
        guard.set_state(false, true);
        assert!(guard.reset_emergency());
        assert!(!guard.is_emergency());
        assert_eq!(guard.level(), ProtectionLevel::Monitoring);
        assert!(!guard.reset_emergency());
    }

    // ── Callbacks ───────────────────────────────────────────────────

    #[test]
    fn callbacks_fire_on_newly_entered_level_only() {
        let guard = guard_with_memory_store();
        let hits = Arc::new(AtomicU32::new(0));
        let hits_cb = Arc::clone(&hits);
        guard.register_callback(
            ProtectionLevel::Warning,
            "test-warning",
            Box::new(move || {
                hits_cb.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );

        for _ in 0..75 {
            guard.record_lambda_invocation();
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        // Staying at Warning fires nothing further.
        guard.record_lambda_invocation();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reset_emergency_fires_monitoring_callbacks() {
        let guard = guard_with_memory_store();
        let hits = Arc::new(AtomicU32::new(0));
        let hits_cb = Arc::clone(&hits);
        guard.register_callback(
            ProtectionLevel::Monitoring,
            "stand-down",
            Box::new(move || {
                hits_cb.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );

        guard.set_state(false, true);
        assert!(guard.reset_emergency());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failing_callback_does_not_poison_recording() {
        let guard = guard_with_memory_store();
        guard.register_callback(
            ProtectionLevel::Warning,
            "broken",
            Box::new(|| anyhow::bail!("alerting down")),
        );
        for _ in 0..75 {
            assert!(guard.record_lambda_invocation());
        }
        assert_eq!(guard.level(), ProtectionLevel::Warning);
    }

    // ── Persistence ─────────────────────────────────────────────────

    #[test]
    fn state_survives_cold_start_through_store() {
        let store = Arc::new(MemoryStore::new());

        {
            let guard = CostGuard::new(small_limits(), Box::new(SharedStore(Arc::clone(&store))))
                .with_save_interval(1);
            for _ in 0..80 {
                guard.record_lambda_invocation();
            }
            assert_eq!(guard.level(), ProtectionLevel::Warning);
            guard.flush();
        }

        // Simulated cold start: a new manager over the same slot.
        let revived = CostGuard::new(small_limits(), Box::new(SharedStore(store)));
        assert_eq!(revived.level(), ProtectionLevel::Warning);
        let row_current = revived
            .usage_summary()
            .counters
            .iter()
            .find(|r| r.counter == "lambda_invocations")
            .unwrap()
            .current;
        assert_eq!(row_current, 80.0);
    }

    #[test]
    fn disabled_pin_does_not_leak_through_persistence() {
        let store = Arc::new(MemoryStore::new());

        {
            let guard =
                CostGuard::new_disabled(small_limits(), Box::new(SharedStore(Arc::clone(&store))));
            for _ in 0..80 {
                guard.record_lambda_invocation();
            }
            assert_eq!(guard.level(), ProtectionLevel::Disabled);
            guard.flush();
        }

        // Re-enabled restart over the same slot: the pin is config-derived
        // and must not keep the guard disarmed.
        let revived = CostGuard::new(small_limits(), Box::new(SharedStore(store)));
        assert_eq!(revived.level(), ProtectionLevel::Monitoring);

        // The ledger carried over and escalation is armed again.
        assert!(revived.record_lambda_invocation());
        assert_eq!(revived.level(), ProtectionLevel::Warning);
    }

    #[test]
    fn rollover_clearing_emergency_forces_a_save() {
        use hearthgate_types::EmergencyTrigger;

        let store = Arc::new(MemoryStore::new());
        let guard = CostGuard::new(small_limits(), Box::new(SharedStore(Arc::clone(&store))))
            .with_save_interval(1000);

        // Stale state: emergency latched last month.
        {
            let mut state = guard.state.write().unwrap();
            let may = ts("2025-05-20T00:00:00Z");
            *state = ProtectionState::new(small_limits(), ts("2025-05-01T00:00:00Z"));
            state.usage.add_lambda_invocations(96, may);
            state.enter_emergency(
                EmergencyTrigger::LimitBreach,
                Some(ServiceType::Lambda),
                "may breach".into(),
                may,
            );
        }
        // Move the throttle off its initial slot so only a forced save
        // can reach the store.
        guard.save_counter.store(5, Ordering::Relaxed);

        // First record of the new month clears the stale emergency; that
        // transition must hit the store despite the throttle.
        assert!(guard.record_at(
            ServiceType::Lambda,
            ts("2025-06-01T08:00:00Z"),
            |usage, now| {
                usage.add_lambda_invocations(1, now);
                Ok(())
            }
        ));
        assert!(!guard.is_emergency());
        let doc = store.get().unwrap().unwrap();
        assert!(!doc.state.emergency_mode);
    }

    #[test]
    fn corrupt_store_falls_back_to_fresh_state() {
        struct BrokenStore;
        impl StateStore for BrokenStore {
            fn put(&self, _doc: &StateDocument) -> Result<(), hearthgate_types::GuardError> {
                Err(hearthgate_types::GuardError::InvalidState {
                    reason: "write refused".into(),
                })
            }
            fn get(&self) -> Result<Option<StateDocument>, hearthgate_types::GuardError> {
                Err(hearthgate_types::GuardError::InvalidState {
                    reason: "read refused".into(),
                })
            }
        }

        // Construction must not fail, and the engine keeps working even
        // though every save fails.
        let guard = CostGuard::new(small_limits(), Box::new(BrokenStore)).with_save_interval(1);
        assert_eq!(guard.level(), ProtectionLevel::Monitoring);
        assert!(guard.record_lambda_invocation());
    }

    #[test]
    fn disabled_guard_never_escalates_or_blocks() {
        let guard = CostGuard::new_disabled(small_limits(), Box::new(MemoryStore::new()));
        for _ in 0..100 {
            guard.record_lambda_invocation();
        }
        assert_eq!(guard.level(), ProtectionLevel::Disabled);
        assert!(!guard.is_active());
        assert!(!guard.should_block(CostCategory::LowPriority, Some(ServiceType::Lambda)));
        assert!(guard.can_use("ssm"));
    }

    // ── Process-wide instance ───────────────────────────────────────

    #[test]
    fn global_guard_initializes_and_cleans_up() {
        cleanup();
        let first = guard();
        let second = guard();
        assert!(Arc::ptr_eq(&first, &second));
        cleanup();
        let third = guard();
        assert!(!Arc::ptr_eq(&first, &third));
        cleanup();
    }
}
