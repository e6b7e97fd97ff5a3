//! State persistence: make [`ProtectionState`] durable across cold starts.
//!
//! A serverless instance loses all in-memory state on every cold start,
//! so the manager saves the full aggregate to a single durable slot. The
//! slot is abstracted behind [`StateStore`] so tests (and alternative
//! backends) can substitute an in-memory implementation; the JSON file
//! adapter is one concrete store, not the contract.
//!
//! Loading is defensive by design: a missing slot, a parse failure or a
//! document that fails invariant validation all yield `None`, and the
//! manager falls back to a fresh `Monitoring` state. Corruption must
//! never crash startup.

use std::path::PathBuf;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use hearthgate_types::GuardError;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::state::ProtectionState;

// ── StateDocument ────────────────────────────────────────────────────────

/// The persisted form of the aggregate: the full state plus a write
/// timestamp. Round-trips losslessly (`load(save(s)) == s`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateDocument {
    /// The protection state at save time.
    #[serde(flatten)]
    pub state: ProtectionState,
    /// When this document was written.
    pub saved_at: DateTime<Utc>,
}

impl StateDocument {
    /// Snapshot `state` for writing.
    pub fn new(state: &ProtectionState, saved_at: DateTime<Utc>) -> Self {
        Self {
            state: state.clone(),
            saved_at,
        }
    }
}

// ── StateStore ───────────────────────────────────────────────────────────

/// A single durable slot for the state document.
pub trait StateStore: Send + Sync {
    /// Write the document to the slot, replacing any previous content.
    fn put(&self, doc: &StateDocument) -> Result<(), GuardError>;

    /// Read the slot. `Ok(None)` when the slot is empty.
    fn get(&self) -> Result<Option<StateDocument>, GuardError>;
}

/// Load and validate a document from a store.
///
/// This is the one catch-all boundary in the engine: every failure mode
/// (I/O, parse, invariant violation) degrades to `None` with a warning so
/// the caller can start fresh.
pub fn load_validated(store: &dyn StateStore) -> Option<StateDocument> {
    let doc = match store.get() {
        Ok(Some(doc)) => doc,
        Ok(None) => return None,
        Err(err) => {
            warn!(%err, "failed to read persisted guard state, starting fresh");
            return None;
        }
    };
    if let Err(err) = doc.state.validate() {
        warn!(%err, "persisted guard state failed validation, starting fresh");
        return None;
    }
    Some(doc)
}

// ── FileStore ────────────────────────────────────────────────────────────

/// JSON-file store adapter.
///
/// Writes atomically (temp file + rename) so a crash mid-write cannot
/// corrupt the slot, and restricts the file to owner read/write on Unix.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Store backed by the given file path. The parent directory is
    /// created on first write.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// The backing file path.
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl StateStore for FileStore {
    fn put(&self, doc: &StateDocument) -> Result<(), GuardError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(doc)?;

        // Write to temp file then rename for atomic replacement.
        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &json)?;
        std::fs::rename(&tmp_path, &self.path)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&self.path, perms)?;
        }

        debug!(path = %self.path.display(), "saved guard state");
        Ok(())
    }

    fn get(&self) -> Result<Option<StateDocument>, GuardError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let doc: StateDocument = serde_json::from_str(&raw)?;
        debug!(path = %self.path.display(), "loaded guard state");
        Ok(Some(doc))
    }
}

// ── MemoryStore ──────────────────────────────────────────────────────────

/// In-memory store for tests and embedded use.
#[derive(Default)]
pub struct MemoryStore {
    slot: RwLock<Option<StateDocument>>,
}

impl MemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStore {
    fn put(&self, doc: &StateDocument) -> Result<(), GuardError> {
        *self.slot.write().expect("memory store lock poisoned") = Some(doc.clone());
        Ok(())
    }

    fn get(&self) -> Result<Option<StateDocument>, GuardError> {
        Ok(self.slot.read().expect("memory store lock poisoned").clone())
    }
}

// ── Tests ────────────────────────────────────────────────────────────────
