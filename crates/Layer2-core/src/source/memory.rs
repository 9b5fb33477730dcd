//! In-memory source units
//!
//! Enumerator, loader and watcher over a map held in memory. Embedders use it
//! for generated code; tests use it to drive a change source by hand.

use super::traits::{UnitEnumerator, UnitLoader, UnitWatcher, WatchEvent};
use async_trait::async_trait;
use livemeta_foundation::{Entity, Error, Result};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
enum UnitState {
    Loaded(Vec<Entity>),
    Failing(String),
}

/// Source units kept in memory
pub struct InMemoryUnits {
    units: Mutex<BTreeMap<String, UnitState>>,

    /// Set while `enumerate()` should fail
    enumerate_error: Mutex<Option<String>>,

    /// Loads wait while this is `true`
    paused: watch::Sender<bool>,

    notify: Mutex<Option<mpsc::Sender<WatchEvent>>>,

    loads: AtomicUsize,
    enumerations: AtomicUsize,
}

impl InMemoryUnits {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            units: Mutex::new(BTreeMap::new()),
            enumerate_error: Mutex::new(None),
            paused: watch::Sender::new(false),
            notify: Mutex::new(None),
            loads: AtomicUsize::new(0),
            enumerations: AtomicUsize::new(0),
        })
    }

    // ========================================================================
    // Content
    // ========================================================================

    /// Replace a unit's content without notifying watchers
    pub fn set_unit(&self, unit: impl Into<String>, entities: Vec<Entity>) {
        self.units.lock().insert(unit.into(), UnitState::Loaded(entities));
    }

    /// Make every load of `unit` fail
    pub fn fail_unit(&self, unit: impl Into<String>, message: impl Into<String>) {
        self.units
            .lock()
            .insert(unit.into(), UnitState::Failing(message.into()));
    }

    /// Replace a unit's content and notify watchers
    pub fn update_unit(&self, unit: impl Into<String>, entities: Vec<Entity>) {
        let unit = unit.into();
        let existed = self
            .units
            .lock()
            .insert(unit.clone(), UnitState::Loaded(entities))
            .is_some();

        self.send(if existed {
            WatchEvent::changed(unit)
        } else {
            WatchEvent::added(unit)
        });
    }

    /// Drop a unit and notify watchers
    pub fn remove_unit(&self, unit: &str) {
        if self.units.lock().remove(unit).is_some() {
            self.send(WatchEvent::removed(unit));
        }
    }

    /// Notify watchers that `unit` changed without touching its content
    pub fn touch(&self, unit: impl Into<String>) {
        self.send(WatchEvent::changed(unit));
    }

    /// Make `enumerate()` fail until cleared with `None`
    pub fn fail_enumerate(&self, message: Option<&str>) {
        *self.enumerate_error.lock() = message.map(str::to_string);
    }

    // ========================================================================
    // Load gate
    // ========================================================================

    /// Hold every load until `resume_loads`
    pub fn pause_loads(&self) {
        self.paused.send_replace(true);
    }

    pub fn resume_loads(&self) {
        self.paused.send_replace(false);
    }

    // ========================================================================
    // Counters
    // ========================================================================

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn enumerate_count(&self) -> usize {
        self.enumerations.load(Ordering::SeqCst)
    }

    fn send(&self, event: WatchEvent) {
        let Some(tx) = self.notify.lock().clone() else {
            return;
        };
        if let Err(e) = tx.try_send(event) {
            warn!(error = %e, "Dropped watch notification");
        }
    }
}

#[async_trait]
impl UnitEnumerator for InMemoryUnits {
    async fn enumerate(&self) -> Result<Vec<String>> {
        self.enumerations.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.enumerate_error.lock().clone() {
            return Err(Error::Internal(message));
        }
        Ok(self.units.lock().keys().cloned().collect())
    }
}

#[async_trait]
impl UnitLoader for InMemoryUnits {
    async fn load(&self, unit: &str) -> anyhow::Result<Vec<Entity>> {
        let mut paused = self.paused.subscribe();
        // Sender lives in self, so this only fails if self is gone
        let _ = paused.wait_for(|p| !*p).await;

        self.loads.fetch_add(1, Ordering::SeqCst);
        debug!(unit = %unit, "Loading in-memory unit");

        match self.units.lock().get(unit) {
            Some(UnitState::Loaded(entities)) => Ok(entities.clone()),
            Some(UnitState::Failing(message)) => Err(anyhow::anyhow!("{}: {}", unit, message)),
            None => Err(Error::UnitNotFound(unit.to_string()).into()),
        }
    }
}

impl UnitWatcher for InMemoryUnits {
    fn watch(&self, capacity: usize) -> Result<mpsc::Receiver<WatchEvent>> {
        let mut notify = self.notify.lock();
        if notify.as_ref().is_some_and(|tx| !tx.is_closed()) {
            return Err(Error::Watch("in-memory units are already watched".to_string()));
        }

        let (tx, rx) = mpsc::channel(capacity.max(1));
        *notify = Some(tx);
        Ok(rx)
    }
}

impl std::fmt::Debug for InMemoryUnits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryUnits")
            .field("units", &self.units.lock().len())
            .field("loads", &self.load_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_enumerate_and_load() {
        let units = InMemoryUnits::new();
        units.set_unit("b.rs", vec![Entity::new("b#B", "b.rs", 1)]);
        units.set_unit("a.rs", vec![]);

        assert_eq!(units.enumerate().await.unwrap(), vec!["a.rs", "b.rs"]);
        assert_eq!(units.load("b.rs").await.unwrap().len(), 1);
        assert!(units.load("missing.rs").await.is_err());
        assert_eq!(units.load_count(), 2);
    }

    #[tokio::test]
    async fn test_watch_notifications() {
        let units = InMemoryUnits::new();
        let mut rx = units.watch(8).unwrap();

        units.update_unit("a.rs", vec![]);
        units.update_unit("a.rs", vec![]);
        units.remove_unit("a.rs");

        assert_eq!(rx.recv().await, Some(WatchEvent::added("a.rs")));
        assert_eq!(rx.recv().await, Some(WatchEvent::changed("a.rs")));
        assert_eq!(rx.recv().await, Some(WatchEvent::removed("a.rs")));

        assert!(matches!(units.watch(8), Err(Error::Watch(_))));
        drop(rx);
        assert!(units.watch(8).is_ok());
    }

    #[tokio::test]
    async fn test_enumerate_failure_toggle() {
        let units = InMemoryUnits::new();
        units.fail_enumerate(Some("disk gone"));
        assert!(units.enumerate().await.is_err());

        units.fail_enumerate(None);
        assert!(units.enumerate().await.is_ok());
    }
}
