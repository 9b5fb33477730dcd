//! Change source traits and the collaborators a source depends on

use async_trait::async_trait;
use livemeta_foundation::{ChangeListener, Entity, ListenerId, Result, Tick};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

// ============================================================================
// ChangeSource - leaf of every registry tree
// ============================================================================

/// Turns source unit reloads into entity-level change events.
#[async_trait]
pub trait ChangeSource: Send + Sync {
    fn name(&self) -> &str;

    /// Initial full scan. Every entity found is emitted as `added`.
    async fn init(&self) -> Result<()>;

    /// Forget all remembered state without emitting anything
    fn reset(&self);

    fn on(&self, listener: ChangeListener) -> ListenerId;

    fn off(&self, id: ListenerId) -> bool;

    /// Dispatch tick shared with every registry fed by this source
    fn tick(&self) -> Arc<Tick>;
}

// ============================================================================
// Collaborators
// ============================================================================

/// Lists the currently relevant source units. Output is stable and
/// duplicate-free.
#[async_trait]
pub trait UnitEnumerator: Send + Sync {
    async fn enumerate(&self) -> Result<Vec<String>>;
}

/// Evaluates one source unit and returns the entities it declares.
///
/// Errors are reported here and never reach the diff engine: the change
/// source treats a failed unit as declaring nothing.
#[async_trait]
pub trait UnitLoader: Send + Sync {
    async fn load(&self, unit: &str) -> anyhow::Result<Vec<Entity>>;
}

/// What happened to a source unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchKind {
    Added,
    Changed,
    Removed,
}

/// Watch notification for one source unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchEvent {
    pub kind: WatchKind,
    pub unit: String,
}

impl WatchEvent {
    pub fn added(unit: impl Into<String>) -> Self {
        Self {
            kind: WatchKind::Added,
            unit: unit.into(),
        }
    }

    pub fn changed(unit: impl Into<String>) -> Self {
        Self {
            kind: WatchKind::Changed,
            unit: unit.into(),
        }
    }

    pub fn removed(unit: impl Into<String>) -> Self {
        Self {
            kind: WatchKind::Removed,
            unit: unit.into(),
        }
    }
}

/// Delivers unit added/changed/removed notifications.
///
/// A change source calls `watch` exactly once, during its first `init()`.
pub trait UnitWatcher: Send + Sync {
    fn watch(&self, capacity: usize) -> Result<mpsc::Receiver<WatchEvent>>;
}
