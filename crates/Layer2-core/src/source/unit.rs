//! Unit Change Source - per-unit identity + hash diffing

use super::traits::{ChangeSource, UnitEnumerator, UnitLoader, UnitWatcher, WatchEvent, WatchKind};
use async_trait::async_trait;
use livemeta_foundation::{
    ChangeEmitter, ChangeEvent, ChangeListener, Entity, EntityRef, Error, ListenerId,
    RegistrySettings, Result, Tick,
};
use parking_lot::{Mutex, ReentrantMutex};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error, info, warn};

/// Remembered entities of one source unit, by id
type UnitEntities = HashMap<String, EntityRef>;

// ============================================================================
// UnitChangeSource
// ============================================================================

/// Change source over a set of source units.
///
/// Remembers the entities each unit declared at its last load and emits the
/// minimal `added` / `changed` / `removing` sequence on every reload.
pub struct UnitChangeSource {
    name: String,

    enumerator: Arc<dyn UnitEnumerator>,
    loader: Arc<dyn UnitLoader>,
    watcher: Option<Arc<dyn UnitWatcher>>,

    /// unit → {id → entity}
    units: Mutex<HashMap<String, UnitEntities>>,

    /// Held from diff until the last listener returns, so overlapping
    /// reloads reach listeners in the order they updated `units`.
    /// Reentrant: a listener may reload on the same thread.
    dispatch_lock: ReentrantMutex<()>,

    emitter: ChangeEmitter,
    tick: Arc<Tick>,

    /// Serializes `init()` callers
    init_lock: tokio::sync::Mutex<()>,
    initialized: AtomicBool,
    watching: AtomicBool,
    watch_capacity: usize,

    self_ref: Weak<UnitChangeSource>,
}

impl UnitChangeSource {
    pub fn new(
        name: impl Into<String>,
        enumerator: Arc<dyn UnitEnumerator>,
        loader: Arc<dyn UnitLoader>,
        watcher: Option<Arc<dyn UnitWatcher>>,
    ) -> Arc<Self> {
        Self::with_settings(name, enumerator, loader, watcher, &RegistrySettings::default())
    }

    pub fn with_settings(
        name: impl Into<String>,
        enumerator: Arc<dyn UnitEnumerator>,
        loader: Arc<dyn UnitLoader>,
        watcher: Option<Arc<dyn UnitWatcher>>,
        settings: &RegistrySettings,
    ) -> Arc<Self> {
        let name = name.into();
        Arc::new_cyclic(|weak| Self {
            emitter: ChangeEmitter::new(name.clone()),
            name,
            enumerator,
            loader,
            watcher,
            units: Mutex::new(HashMap::new()),
            dispatch_lock: ReentrantMutex::new(()),
            tick: Tick::new(),
            init_lock: tokio::sync::Mutex::new(()),
            initialized: AtomicBool::new(false),
            watching: AtomicBool::new(false),
            watch_capacity: settings.channel_capacity.max(1),
            self_ref: weak.clone(),
        })
    }

    // ========================================================================
    // Diff engine
    // ========================================================================

    /// Diff a freshly loaded entity list against what `unit` declared before
    /// and emit the resulting events. Returns the number of events emitted.
    pub fn handle_unit_change(&self, unit: &str, entities: Vec<Entity>) -> usize {
        let next = self.index_entities(unit, entities);

        let _ordered = self.dispatch_lock.lock();
        let events = self.diff_and_remember(unit, next);
        self.dispatch(unit, &events);
        events.len()
    }

    fn index_entities(&self, unit: &str, entities: Vec<Entity>) -> UnitEntities {
        let mut next = UnitEntities::with_capacity(entities.len());
        for entity in entities {
            if let Some(dup) = next.insert(entity.id.clone(), Arc::new(entity)) {
                error!(
                    source = %self.name,
                    unit = %unit,
                    id = %dup.id,
                    "Entity id declared twice in one source unit; keeping the last"
                );
            }
        }
        next
    }

    /// Compute the events for one unit and update remembered state
    fn diff_and_remember(&self, unit: &str, next: UnitEntities) -> Vec<ChangeEvent> {
        let mut units = self.units.lock();

        let Some(prev) = units.get(unit) else {
            // Unseen unit that declares nothing gets no entry at all
            if next.is_empty() {
                return Vec::new();
            }
            let mut events: Vec<ChangeEvent> =
                next.values().cloned().map(ChangeEvent::added).collect();
            events.sort_by(|a, b| a.id().cmp(b.id()));
            units.insert(unit.to_string(), next);
            return events;
        };

        let keys: BTreeSet<&String> = prev.keys().chain(next.keys()).collect();
        let mut events = Vec::new();

        for key in keys {
            match (prev.get(key), next.get(key)) {
                (Some(old), None) => events.push(ChangeEvent::removing(old.clone())),
                (None, Some(new)) => events.push(ChangeEvent::added(new.clone())),
                (Some(old), Some(new)) if !new.same_content(old) => {
                    events.push(ChangeEvent::changed(new.clone(), old.clone()))
                }
                // Unchanged hash: state is still refreshed below
                _ => {}
            }
        }

        units.insert(unit.to_string(), next);
        events
    }

    fn dispatch(&self, unit: &str, events: &[ChangeEvent]) {
        if events.is_empty() {
            debug!(source = %self.name, unit = %unit, "Reload produced no changes");
            return;
        }

        self.tick.batch(|| {
            for event in events {
                debug!(source = %self.name, unit = %unit, event = %event, "Emitting change");
                self.emitter.emit(event);
            }
        });
    }

    // ========================================================================
    // Loading
    // ========================================================================

    /// Load a unit through the loader. A failure means "declares nothing".
    async fn load_unit(&self, unit: &str) -> Vec<Entity> {
        match self.loader.load(unit).await {
            Ok(entities) => entities,
            Err(e) => {
                let err = Error::load(unit, format!("{:#}", e));
                warn!(source = %self.name, error = %err, "Source unit defines nothing");
                Vec::new()
            }
        }
    }

    /// Reload one unit and diff it. Returns the number of events emitted.
    pub async fn reload(&self, unit: &str) -> usize {
        let entities = self.load_unit(unit).await;
        self.handle_unit_change(unit, entities)
    }

    /// React to one watch notification
    pub async fn handle_watch_event(&self, event: WatchEvent) -> usize {
        debug!(source = %self.name, unit = %event.unit, kind = ?event.kind, "Watch notification");
        match event.kind {
            WatchKind::Removed => self.handle_unit_change(&event.unit, Vec::new()),
            WatchKind::Added | WatchKind::Changed => self.reload(&event.unit).await,
        }
    }

    fn start_watching(&self) -> Result<()> {
        let Some(watcher) = &self.watcher else {
            return Ok(());
        };
        if self.watching.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let mut rx = match watcher.watch(self.watch_capacity) {
            Ok(rx) => rx,
            Err(e) => {
                self.watching.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };

        let weak = self.self_ref.clone();
        let name = self.name.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let Some(source) = weak.upgrade() else {
                    break;
                };
                source.handle_watch_event(event).await;
            }
            debug!(source = %name, "Watch loop finished");
        });

        Ok(())
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Units with a remembered entry
    pub fn units(&self) -> Vec<String> {
        let mut units: Vec<String> = self.units.lock().keys().cloned().collect();
        units.sort();
        units
    }

    /// Entities a unit declared at its last load
    pub fn entities_of(&self, unit: &str) -> Vec<EntityRef> {
        let units = self.units.lock();
        let mut entities: Vec<EntityRef> = units
            .get(unit)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default();
        entities.sort_by(|a, b| a.id.cmp(&b.id));
        entities
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn listener_count(&self) -> usize {
        self.emitter.listener_count()
    }
}

#[async_trait]
impl ChangeSource for UnitChangeSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn init(&self) -> Result<()> {
        let _guard = self.init_lock.lock().await;
        if self.initialized.load(Ordering::SeqCst) {
            return Ok(());
        }

        let units = self.enumerator.enumerate().await?;
        info!(source = %self.name, units = units.len(), "Scanning source units");

        let mut total = 0;
        for unit in &units {
            let entities = self.load_unit(unit).await;
            total += self.handle_unit_change(unit, entities);
        }

        self.start_watching()?;
        self.initialized.store(true, Ordering::SeqCst);

        info!(source = %self.name, entities = total, "Change source initialized");
        Ok(())
    }

    fn reset(&self) {
        let _ordered = self.dispatch_lock.lock();
        self.units.lock().clear();
        self.initialized.store(false, Ordering::SeqCst);
        info!(source = %self.name, "Change source reset");
    }

    fn on(&self, listener: ChangeListener) -> ListenerId {
        self.emitter.on_shared(listener)
    }

    fn off(&self, id: ListenerId) -> bool {
        self.emitter.off(id)
    }

    fn tick(&self) -> Arc<Tick> {
        Arc::clone(&self.tick)
    }
}

impl std::fmt::Debug for UnitChangeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitChangeSource")
            .field("name", &self.name)
            .field("units", &self.units.lock().len())
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
