//! Registry - installed entity set and one node of the registry tree
//!
//! ```text
//!   ChangeSource ──events──▶ Registry(root) ──events──▶ Registry(child) ──▶ ...
//!        ▲                        │  ▲                        │
//!        └──── init (pull) ───────┘  └── installed() (wait) ──┘
//! ```
//!
//! A registry subscribes to its upstream on construction, applies every event
//! through its hooks and re-emits the events its hooks forward. `init()` is
//! single-flight: concurrent callers share one attempt, a failed attempt
//! leaves the registry re-initializable.

use super::traits::{HookContext, Propagation, RegistryHooks, RegistryNode, Upstream};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::{self, BoxFuture, FutureExt, Shared};
use livemeta_foundation::{
    ChangeEmitter, ChangeEvent, ChangeListener, EntityRef, Error, ListenerId, RegistrySettings,
    Result, Tick,
};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

type InitFuture = Shared<BoxFuture<'static, std::result::Result<(), Arc<Error>>>>;

enum InitState {
    Uninitialized,
    Initializing(InitFuture),
    Initialized,
}

/// Progress of the initial install, watched by descendants
#[derive(Debug, Clone)]
enum InstallSignal {
    Waiting,
    Installed,
    Failed(Arc<Error>),
}

// ============================================================================
// InstalledEntity / RegistryStats
// ============================================================================

/// One row of the installed set
#[derive(Debug, Clone)]
pub struct InstalledEntity {
    pub entity: EntityRef,
    pub installed_at: DateTime<Utc>,
}

/// Registry counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    /// Currently installed entities
    pub installed: usize,
    pub installs: u64,
    pub uninstalls: u64,
    /// Events received from upstream or applied during init
    pub events: u64,
    /// Installs of an id already installed from another source unit
    pub collisions: u64,
}

#[derive(Default)]
struct Counters {
    installs: AtomicU64,
    uninstalls: AtomicU64,
    events: AtomicU64,
    collisions: AtomicU64,
}

// ============================================================================
// Registry
// ============================================================================

pub struct Registry<H: RegistryHooks = ()> {
    name: String,
    hooks: H,

    upstream: Upstream,
    upstream_listener: ListenerId,

    installed: RwLock<HashMap<String, InstalledEntity>>,
    descendants: RwLock<Vec<Weak<dyn RegistryNode>>>,

    emitter: ChangeEmitter,
    tick: Arc<Tick>,

    init_state: Mutex<InitState>,
    install_signal: watch::Sender<InstallSignal>,

    counters: Counters,
    log_events: bool,

    self_ref: Weak<Registry<H>>,
}

impl<H: RegistryHooks> Registry<H> {
    /// Create a registry fed by `upstream` and subscribe to it
    pub fn new(name: impl Into<String>, upstream: Upstream, hooks: H) -> Arc<Self> {
        Self::with_settings(name, upstream, hooks, &RegistrySettings::default())
    }

    pub fn with_settings(
        name: impl Into<String>,
        upstream: Upstream,
        hooks: H,
        settings: &RegistrySettings,
    ) -> Arc<Self> {
        let name = name.into();

        let registry = Arc::new_cyclic(|weak: &Weak<Self>| {
            let listener_ref = weak.clone();
            let upstream_listener = upstream.subscribe(Arc::new(move |event: &ChangeEvent| {
                if let Some(registry) = listener_ref.upgrade() {
                    registry.on_event(event);
                }
            }));

            if let Upstream::Registry(parent) = &upstream {
                let node: Weak<dyn RegistryNode> = weak.clone();
                parent.add_descendant(node);
            }

            Self {
                emitter: ChangeEmitter::new(name.clone()),
                tick: upstream.tick(),
                name,
                hooks,
                upstream,
                upstream_listener,
                installed: RwLock::new(HashMap::new()),
                descendants: RwLock::new(Vec::new()),
                init_state: Mutex::new(InitState::Uninitialized),
                install_signal: watch::Sender::new(InstallSignal::Waiting),
                counters: Counters::default(),
                log_events: settings.log_events,
                self_ref: weak.clone(),
            }
        });

        debug!(
            registry = %registry.name,
            upstream = %registry.upstream.name(),
            "Registry created"
        );
        registry
    }

    /// Create a registry below `parent`
    pub fn child_of<P: RegistryHooks>(
        name: impl Into<String>,
        parent: &Arc<Registry<P>>,
        hooks: H,
    ) -> Arc<Self> {
        let node: Arc<dyn RegistryNode> = parent.clone();
        Self::new(name, Upstream::Registry(node), hooks)
    }

    // ========================================================================
    // Initialization
    // ========================================================================

    /// Initialize this registry and, after its initial install, every
    /// descendant.
    ///
    /// Concurrent and repeated calls share one attempt. On failure the error
    /// reaches every caller of that attempt and the next call starts over.
    pub async fn init(&self) -> Result<()> {
        let Some(attempt) = self.begin_init() else {
            return Ok(());
        };

        attempt.await.map_err(|source| Error::Init {
            registry: self.name.clone(),
            source,
        })
    }

    pub fn is_initialized(&self) -> bool {
        matches!(*self.init_state.lock(), InitState::Initialized)
    }

    /// Running or new attempt; `None` when already initialized
    fn begin_init(&self) -> Option<InitFuture> {
        let mut state = self.init_state.lock();
        match &*state {
            InitState::Initialized => None,
            InitState::Initializing(attempt) => Some(attempt.clone()),
            InitState::Uninitialized => {
                let this = self.self_ref.upgrade()?;
                self.install_signal.send_replace(InstallSignal::Waiting);

                let attempt = async move { this.run_init().await }.boxed().shared();
                *state = InitState::Initializing(attempt.clone());
                Some(attempt)
            }
        }
    }

    async fn run_init(&self) -> std::result::Result<(), Arc<Error>> {
        info!(registry = %self.name, "Initializing registry");

        let result = self.init_steps().await.map_err(Arc::new);

        *self.init_state.lock() = match &result {
            Ok(()) => InitState::Initialized,
            Err(_) => InitState::Uninitialized,
        };

        match &result {
            Ok(()) => {
                info!(
                    registry = %self.name,
                    installed = self.installed.read().len(),
                    "Registry initialized"
                );
            }
            Err(e) => {
                error!(registry = %self.name, error = %e, "Registry initialization failed");
                if matches!(*self.install_signal.borrow(), InstallSignal::Waiting) {
                    self.install_signal.send_replace(InstallSignal::Failed(e.clone()));
                }
            }
        }

        result
    }

    async fn init_steps(&self) -> Result<()> {
        // 1. Upstream first: pull a source, wait for a parent registry
        match &self.upstream {
            Upstream::Source(source) => source.init().await?,
            Upstream::Registry(parent) => parent.installed().await?,
        }

        // 2. Initial batch, through the live install path
        let batch = self.hooks.initial_install();
        debug!(registry = %self.name, entities = batch.len(), "Applying initial install");
        self.tick.batch(|| {
            for entity in batch {
                self.on_event(&ChangeEvent::init(entity));
            }
        });
        self.install_signal.send_replace(InstallSignal::Installed);

        // 3. Descendants, in parallel
        let children = self.live_descendants();
        if !children.is_empty() {
            debug!(registry = %self.name, descendants = children.len(), "Initializing descendants");
            future::try_join_all(children.iter().map(|child| child.init())).await?;
        }

        Ok(())
    }

    /// Wait until the initial install has been applied
    async fn wait_installed(&self) -> Result<()> {
        let mut signal = self.install_signal.subscribe();

        if let Some(attempt) = self.begin_init() {
            // Drive the attempt even if nobody else awaits it
            tokio::spawn(async move {
                let _ = attempt.await;
            });
        } else {
            return Ok(());
        }

        let outcome = signal
            .wait_for(|s| !matches!(s, InstallSignal::Waiting))
            .await
            .map(|s| s.clone());

        match outcome {
            Ok(InstallSignal::Failed(source)) => Err(Error::Init {
                registry: self.name.clone(),
                source,
            }),
            Ok(_) => Ok(()),
            Err(_) => Err(Error::RegistryDropped {
                registry: self.name.clone(),
            }),
        }
    }

    // ========================================================================
    // Event application
    // ========================================================================

    /// Apply one event and re-emit it if any hook forwards it
    pub fn on_event(&self, event: &ChangeEvent) {
        self.counters.events.fetch_add(1, Ordering::Relaxed);
        if self.log_events {
            debug!(registry = %self.name, event = %event, "Applying event");
        }

        self.tick.batch(|| {
            if self.apply(event).is_forward() {
                self.emitter.emit(event);
            }
        });
    }

    fn apply(&self, event: &ChangeEvent) -> Propagation {
        match event {
            ChangeEvent::Removing { prev } => self.uninstall(std::slice::from_ref(prev), event),
            ChangeEvent::Added { curr } | ChangeEvent::Init { curr } => {
                self.install(std::slice::from_ref(curr), event)
            }
            ChangeEvent::Changed { curr, prev } => {
                let removed = self.uninstall(std::slice::from_ref(prev), event);
                let added = self.install(std::slice::from_ref(curr), event);
                removed.or(added)
            }
        }
    }

    /// Install entities and run `on_install` for each
    pub fn install(&self, entities: &[EntityRef], event: &ChangeEvent) -> Propagation {
        let ctx = self.hook_context();
        let mut verdict = Propagation::Suppress;

        for entity in entities {
            self.record_install(entity);
            verdict = verdict.or(self.hooks.on_install(&ctx, entity, event));
        }

        verdict
    }

    /// Uninstall entities and run `on_uninstall` for each
    pub fn uninstall(&self, entities: &[EntityRef], event: &ChangeEvent) -> Propagation {
        let ctx = self.hook_context();
        let mut verdict = Propagation::Suppress;

        for entity in entities {
            if self.installed.write().remove(&entity.id).is_some() {
                self.counters.uninstalls.fetch_add(1, Ordering::Relaxed);
            }
            verdict = verdict.or(self.hooks.on_uninstall(&ctx, entity, event));
        }

        verdict
    }

    fn record_install(&self, entity: &EntityRef) {
        let mut installed = self.installed.write();

        if let Some(existing) = installed.get(&entity.id) {
            if existing.entity.source_unit != entity.source_unit {
                self.counters.collisions.fetch_add(1, Ordering::Relaxed);
                let err = Error::DuplicateId {
                    id: entity.id.clone(),
                    existing: existing.entity.source_unit.clone(),
                    incoming: entity.source_unit.clone(),
                };
                error!(registry = %self.name, error = %err, "Replacing the installed entity");
            }
        }

        installed.insert(
            entity.id.clone(),
            InstalledEntity {
                entity: entity.clone(),
                installed_at: Utc::now(),
            },
        );
        self.counters.installs.fetch_add(1, Ordering::Relaxed);
    }

    fn hook_context(&self) -> HookContext<'_> {
        HookContext {
            registry: &self.name,
            tick: &self.tick,
        }
    }

    // ========================================================================
    // Subscription
    // ========================================================================

    /// Subscribe to the events this registry forwards
    pub fn on<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        self.emitter.on(listener)
    }

    pub fn on_shared(&self, listener: ChangeListener) -> ListenerId {
        self.emitter.on_shared(listener)
    }

    pub fn off(&self, id: ListenerId) -> bool {
        self.emitter.off(id)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    pub fn upstream(&self) -> &Upstream {
        &self.upstream
    }

    pub fn tick(&self) -> &Arc<Tick> {
        &self.tick
    }

    pub fn is_installed(&self, id: &str) -> bool {
        self.installed.read().contains_key(id)
    }

    /// Installed entity by id
    pub fn entity(&self, id: &str) -> Option<EntityRef> {
        self.installed.read().get(id).map(|row| row.entity.clone())
    }

    /// When `id` was last installed
    pub fn installed_at(&self, id: &str) -> Option<DateTime<Utc>> {
        self.installed.read().get(id).map(|row| row.installed_at)
    }

    /// Installed entities, sorted by id
    pub fn entities(&self) -> Vec<EntityRef> {
        let mut entities: Vec<EntityRef> = self
            .installed
            .read()
            .values()
            .map(|row| row.entity.clone())
            .collect();
        entities.sort_by(|a, b| a.id.cmp(&b.id));
        entities
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            installed: self.installed.read().len(),
            installs: self.counters.installs.load(Ordering::Relaxed),
            uninstalls: self.counters.uninstalls.load(Ordering::Relaxed),
            events: self.counters.events.load(Ordering::Relaxed),
            collisions: self.counters.collisions.load(Ordering::Relaxed),
        }
    }

    pub fn descendant_count(&self) -> usize {
        self.descendants
            .read()
            .iter()
            .filter(|d| d.strong_count() > 0)
            .count()
    }

    fn live_descendants(&self) -> Vec<Arc<dyn RegistryNode>> {
        let mut descendants = self.descendants.write();
        descendants.retain(|d| d.strong_count() > 0);
        descendants.iter().filter_map(Weak::upgrade).collect()
    }

    // ========================================================================
    // Reset
    // ========================================================================

    /// Forget everything without emitting: descendants first, then this
    /// registry's tables, then a source upstream. `init()` may run again.
    pub fn reset(&self) {
        for child in self.live_descendants() {
            child.reset();
        }

        self.installed.write().clear();
        self.hooks.on_reset();

        *self.init_state.lock() = InitState::Uninitialized;
        self.install_signal.send_replace(InstallSignal::Waiting);

        if let Upstream::Source(source) = &self.upstream {
            source.reset();
        }

        info!(registry = %self.name, "Registry reset");
    }
}

#[async_trait]
impl<H: RegistryHooks> RegistryNode for Registry<H> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn init(&self) -> Result<()> {
        Registry::init(self).await
    }

    async fn installed(&self) -> Result<()> {
        self.wait_installed().await
    }

    fn reset(&self) {
        Registry::reset(self)
    }

    fn subscribe(&self, listener: ChangeListener) -> ListenerId {
        self.on_shared(listener)
    }

    fn unsubscribe(&self, id: ListenerId) -> bool {
        self.off(id)
    }

    fn tick(&self) -> Arc<Tick> {
        Arc::clone(&self.tick)
    }

    fn add_descendant(&self, child: Weak<dyn RegistryNode>) {
        self.descendants.write().push(child);
    }
}

impl<H: RegistryHooks> Drop for Registry<H> {
    fn drop(&mut self) {
        if !self.upstream.unsubscribe(self.upstream_listener) {
            warn!(registry = %self.name, "Upstream listener was already gone");
        }
    }
}

impl<H: RegistryHooks> std::fmt::Debug for Registry<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("name", &self.name)
            .field("upstream", &self.upstream)
            .field("installed", &self.installed.read().len())
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
