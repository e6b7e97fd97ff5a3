//! Level-transition callback registry.
//!
//! Collaborators (alerting, cache flushing, degraded-mode switches in the
//! translation layers) subscribe to protection levels. When the state
//! machine newly enters a level, every callback registered for that level
//! runs once. A failing callback is logged under its registered name and
//! skipped -- it can neither stop the remaining callbacks nor propagate
//! to the caller whose usage event triggered the transition.

use std::collections::HashMap;

use hearthgate_types::ProtectionLevel;
use tracing::{debug, warn};

/// A level-transition callback. Errors are opaque to the engine.
pub type LevelCallback = Box<dyn Fn() -> anyhow::Result<()> + Send + Sync>;

// ── CallbackRegistry ─────────────────────────────────────────────────────

/// Per-level lists of named callbacks, fired in registration order.
#[derive(Default)]
pub struct CallbackRegistry {
    callbacks: HashMap<ProtectionLevel, Vec<(String, LevelCallback)>>,
}

impl CallbackRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` under `name` for transitions into `level`.
    pub fn register(&mut self, level: ProtectionLevel, name: impl Into<String>, callback: LevelCallback) {
        self.callbacks
            .entry(level)
            .or_default()
            .push((name.into(), callback));
    }

    /// Fire every callback registered for `level`.
    ///
    /// Errors and panics are logged with the callback's name and
    /// swallowed; the remaining callbacks still run.
    pub fn fire(&self, level: ProtectionLevel) {
        let Some(entries) = self.callbacks.get(&level) else {
            return;
        };
        debug!(%level, count = entries.len(), "firing level-transition callbacks");
        for (name, callback) in entries {
            match std::panic::catch_unwind(std::panic::AssertUnwindSafe(callback)) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    warn!(callback = %name, %level, %err, "level-transition callback failed");
                }
                Err(_) => {
                    warn!(callback = %name, %level, "level-transition callback panicked");
                }
            }
        }
    }

    /// Number of callbacks registered for `level`.
    pub fn count(&self, level: ProtectionLevel) -> usize {
        self.callbacks.get(&level).map_or(0, Vec::len)
    }

    /// Drop every registered callback (manager teardown).
    pub fn clear(&mut self) {
        self.callbacks.clear();
    }
}

impl std::fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: HashMap<_, _> = self
            .callbacks
            .iter()
            .map(|(level, entries)| (*level, entries.len()))
            .collect();
        f.debug_struct("CallbackRegistry")
            .field("registered", &counts)
            .finish()
    }
}

// ── Tests ────────────────────────────────────────────────────────────────
