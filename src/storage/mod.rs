//! Snapshot store and state persistence.
//!
//! `SnapshotStore` is the seam between the pipeline (writer) and whatever
//! serves snapshots (readers). `MemoryStore` publishes by replacing an
//! `Arc<Snapshot>` under a write lock, so a reader holds either the old
//! snapshot or the new one, never a half-built list.
//!
//! Published snapshots and tracker baselines are saved to a JSON state
//! file between passes and restored on startup.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::engine::tracker::TrackerState;
use crate::types::Snapshot;

/// Default state file path.
const DEFAULT_STATE_FILE: &str = "steamer_state.json";

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Latest published snapshot per event.
pub trait SnapshotStore: Send + Sync {
    fn get(&self, event_id: &str) -> Option<Arc<Snapshot>>;

    /// Replace the event's snapshot wholesale.
    fn put(&self, snapshot: Arc<Snapshot>);

    fn all(&self) -> Vec<Arc<Snapshot>>;
}

/// What a reader gets for an event.
#[derive(Debug, Clone)]
pub enum SnapshotView {
    Available(Arc<Snapshot>),
    /// No cycle has succeeded for this event yet.
    NotYetAvailable,
}

impl SnapshotView {
    pub fn is_available(&self) -> bool {
        matches!(self, SnapshotView::Available(_))
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        match self {
            SnapshotView::Available(s) => Some(s.as_ref()),
            SnapshotView::NotYetAvailable => None,
        }
    }
}

impl From<Option<Arc<Snapshot>>> for SnapshotView {
    fn from(snapshot: Option<Arc<Snapshot>>) -> Self {
        snapshot.map_or(SnapshotView::NotYetAvailable, SnapshotView::Available)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    snapshots: RwLock<HashMap<String, Arc<Snapshot>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshots(snapshots: Vec<Snapshot>) -> Self {
        let store = Self::new();
        for s in snapshots {
            store.put(Arc::new(s));
        }
        store
    }

    pub fn len(&self) -> usize {
        self.snapshots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.read().is_empty()
    }
}

impl SnapshotStore for MemoryStore {
    fn get(&self, event_id: &str) -> Option<Arc<Snapshot>> {
        self.snapshots.read().get(event_id).cloned()
    }

    fn put(&self, snapshot: Arc<Snapshot>) {
        debug!(
            event_id = %snapshot.event_id,
            entrants = snapshot.entrants.len(),
            "Snapshot published"
        );
        self.snapshots
            .write()
            .insert(snapshot.event_id.clone(), snapshot);
    }

    fn all(&self) -> Vec<Arc<Snapshot>> {
        let mut all: Vec<_> = self.snapshots.read().values().cloned().collect();
        all.sort_by(|a, b| a.event_id.cmp(&b.event_id));
        all
    }
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

/// Everything that survives a restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedState {
    pub saved_at: DateTime<Utc>,
    #[serde(default)]
    pub snapshots: Vec<Snapshot>,
    #[serde(default)]
    pub tracker: TrackerState,
}

impl PersistedState {
    pub fn capture(store: &dyn SnapshotStore, tracker: TrackerState) -> Self {
        Self {
            saved_at: Utc::now(),
            snapshots: store.all().iter().map(|s| (**s).clone()).collect(),
            tracker,
        }
    }
}

/// Save state to a JSON file.
pub fn save_state(state: &PersistedState, path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_STATE_FILE);
    let json = serde_json::to_string_pretty(state).context("Failed to serialise state")?;

    std::fs::write(path, &json).with_context(|| format!("Failed to write state to {path}"))?;

    debug!(
        path,
        snapshots = state.snapshots.len(),
        baselines = state.tracker.baselines.len(),
        "State saved"
    );
    Ok(())
}

/// Load state from a JSON file.
/// Returns None if the file doesn't exist (fresh start).
pub fn load_state(path: Option<&str>) -> Result<Option<PersistedState>> {
    let path = path.unwrap_or(DEFAULT_STATE_FILE);

    if !Path::new(path).exists() {
        info!(path, "No saved state found, starting fresh");
        return Ok(None);
    }

    let json =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read state from {path}"))?;

    let state: PersistedState =
        serde_json::from_str(&json).with_context(|| format!("Failed to parse state from {path}"))?;

    info!(
        path,
        saved_at = %state.saved_at,
        snapshots = state.snapshots.len(),
        baselines = state.tracker.baselines.len(),
        "State loaded from disk"
    );

    Ok(Some(state))
}

/// Delete the state file (for testing or reset).
pub fn delete_state(path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_STATE_FILE);
    if Path::new(path).exists() {
        std::fs::remove_file(path).with_context(|| format!("Failed to delete state file {path}"))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
