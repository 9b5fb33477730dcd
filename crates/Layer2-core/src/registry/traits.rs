//! Registry Traits - hooks, tree nodes and upstream wiring

use crate::source::ChangeSource;
use async_trait::async_trait;
use livemeta_foundation::{ChangeEvent, ChangeListener, EntityRef, ListenerId, Result, Tick};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};

// ============================================================================
// Propagation - hook verdict
// ============================================================================

/// Whether a hook wants the triggering event re-emitted downstream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Propagation {
    Forward,
    Suppress,
}

impl Propagation {
    /// Forward if either side forwards
    pub fn or(self, other: Propagation) -> Propagation {
        if self.is_forward() || other.is_forward() {
            Propagation::Forward
        } else {
            Propagation::Suppress
        }
    }

    pub fn is_forward(&self) -> bool {
        matches!(self, Propagation::Forward)
    }
}

// ============================================================================
// RegistryHooks - per-registry behaviour
// ============================================================================

/// What a hook sees besides the entity and the event
pub struct HookContext<'a> {
    /// Name of the registry running the hook
    pub registry: &'a str,

    /// Dispatch tick of the running pipeline
    pub tick: &'a Arc<Tick>,
}

/// Lifecycle hooks of a registry.
///
/// The defaults install nothing up front, keep nothing besides the installed
/// set and forward every event, which is a plain pass-through registry.
pub trait RegistryHooks: Send + Sync + 'static {
    /// Entities applied as `init` events during `init()`
    fn initial_install(&self) -> Vec<EntityRef> {
        Vec::new()
    }

    fn on_install(
        &self,
        _ctx: &HookContext<'_>,
        _entity: &EntityRef,
        _event: &ChangeEvent,
    ) -> Propagation {
        Propagation::Forward
    }

    fn on_uninstall(
        &self,
        _ctx: &HookContext<'_>,
        _entity: &EntityRef,
        _event: &ChangeEvent,
    ) -> Propagation {
        Propagation::Forward
    }

    /// Drop every table the hooks own. Must not emit.
    fn on_reset(&self) {}
}

impl RegistryHooks for () {}

// ============================================================================
// RegistryNode - object-safe view of a registry in the tree
// ============================================================================

#[async_trait]
pub trait RegistryNode: Send + Sync {
    fn name(&self) -> &str;

    /// Single-flight initialization, see [`crate::registry::Registry::init`]
    async fn init(&self) -> Result<()>;

    /// Resolves once this registry's initial install has been applied.
    /// Starts initialization if nobody has.
    async fn installed(&self) -> Result<()>;

    fn reset(&self);

    fn subscribe(&self, listener: ChangeListener) -> ListenerId;

    fn unsubscribe(&self, id: ListenerId) -> bool;

    fn tick(&self) -> Arc<Tick>;

    /// Attach a registry fed by this one
    fn add_descendant(&self, child: Weak<dyn RegistryNode>);
}

// ============================================================================
// Upstream
// ============================================================================

/// Where a registry receives its events from
#[derive(Clone)]
pub enum Upstream {
    Source(Arc<dyn ChangeSource>),
    Registry(Arc<dyn RegistryNode>),
}

impl Upstream {
    pub fn source(source: Arc<dyn ChangeSource>) -> Self {
        Upstream::Source(source)
    }

    pub fn registry(parent: Arc<dyn RegistryNode>) -> Self {
        Upstream::Registry(parent)
    }

    pub fn name(&self) -> &str {
        match self {
            Upstream::Source(s) => s.name(),
            Upstream::Registry(r) => r.name(),
        }
    }

    pub fn tick(&self) -> Arc<Tick> {
        match self {
            Upstream::Source(s) => s.tick(),
            Upstream::Registry(r) => r.tick(),
        }
    }

    pub(crate) fn subscribe(&self, listener: ChangeListener) -> ListenerId {
        match self {
            Upstream::Source(s) => s.on(listener),
            Upstream::Registry(r) => r.subscribe(listener),
        }
    }

    pub(crate) fn unsubscribe(&self, id: ListenerId) -> bool {
        match self {
            Upstream::Source(s) => s.off(id),
            Upstream::Registry(r) => r.unsubscribe(id),
        }
    }

    pub fn is_source(&self) -> bool {
        matches!(self, Upstream::Source(_))
    }
}

impl std::fmt::Debug for Upstream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Upstream::Source(s) => f.debug_tuple("Source").field(&s.name()).finish(),
            Upstream::Registry(r) => f.debug_tuple("Registry").field(&r.name()).finish(),
        }
    }
}

impl<S: ChangeSource + 'static> From<Arc<S>> for Upstream {
    fn from(source: Arc<S>) -> Self {
        Upstream::Source(source)
    }
}
