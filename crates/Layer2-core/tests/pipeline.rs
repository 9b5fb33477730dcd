//! Pipeline integration tests - source → root → metadata registries
//!
//! `cargo test -p livemeta-core --test pipeline`

use livemeta_core::{
    HookContext, InstalledView, MetadataKind, MetadataRegistry, Propagation, Registry,
    RegistryHooks, RootRegistry, UnitChangeSource, Upstream,
};
use livemeta_core::InMemoryUnits;
use livemeta_foundation::{ChangeEvent, ChangeKind, Entity, EntityRef, Error};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_test::assert_pending;

// ============================================================================
// Fixtures
// ============================================================================

/// Finalized config is the merged pending config plus member configs
struct JsonKind {
    finalized: Mutex<Vec<Value>>,
}

impl JsonKind {
    fn new() -> Self {
        Self {
            finalized: Mutex::new(Vec::new()),
        }
    }
}

impl MetadataKind for JsonKind {
    type Config = Value;
    type MemberConfig = Value;
    type Final = Value;

    fn create_pending(&self, entity: &EntityRef) -> Value {
        json!({ "name": entity.name() })
    }

    fn on_install_finalize(
        &self,
        _entity: &EntityRef,
        pending: Value,
        members: BTreeMap<String, Value>,
        _installed: &InstalledView<'_, Value>,
    ) -> Value {
        let mut config = pending;
        if !members.is_empty() {
            config["members"] = json!(members);
        }
        self.finalized.lock().push(config.clone());
        config
    }
}

type EventLog = Arc<Mutex<Vec<(ChangeKind, String, u64)>>>;

fn record<H: RegistryHooks>(registry: &Registry<H>) -> EventLog {
    let log = EventLog::default();
    let sink = log.clone();
    registry.on(move |e: &ChangeEvent| {
        let hash = e.curr().or(e.prev()).map(|x| x.content_hash).unwrap_or_default();
        sink.lock().push((e.kind(), e.id().to_string(), hash));
    });
    log
}

fn x(hash: u64) -> Entity {
    Entity::new("a.rs#X", "a.rs", hash)
}

struct Pipeline {
    units: Arc<InMemoryUnits>,
    source: Arc<UnitChangeSource>,
    root: Arc<RootRegistry>,
    meta: Arc<MetadataRegistry<JsonKind>>,
}

fn pipeline() -> Pipeline {
    let units = InMemoryUnits::new();
    let source = UnitChangeSource::new("units", units.clone(), units.clone(), None);
    let root = RootRegistry::root(source.clone());
    let meta = MetadataRegistry::with_kind("meta", Upstream::registry(root.clone()), JsonKind::new());
    Pipeline {
        units,
        source,
        root,
        meta,
    }
}

// ============================================================================
// End-to-end scenarios
// ============================================================================

#[tokio::test]
async fn test_unit_lifecycle_scenarios() {
    let p = pipeline();
    let source_log = EventLog::default();
    {
        let sink = source_log.clone();
        livemeta_core::ChangeSource::on(
            p.source.as_ref(),
            Arc::new(move |e: &ChangeEvent| {
                let hash = e.curr().or(e.prev()).map(|x| x.content_hash).unwrap_or_default();
                sink.lock().push((e.kind(), e.id().to_string(), hash));
            }),
        );
    }
    let meta_log = record(&p.meta);

    // 1. First load: one added, finalized entry
    p.units.set_unit("a.rs", vec![x(1)]);
    p.meta.register(&x(1).into_ref(), json!({ "table": "xs" }));
    p.root.init().await.unwrap();

    assert_eq!(*source_log.lock(), vec![(ChangeKind::Added, "a.rs#X".to_string(), 1)]);
    assert_eq!(p.meta.get("a.rs#X").unwrap().config["table"], "xs");

    // 2. Same hash: nothing, and no table moves
    let root_stats = p.root.stats();
    let meta_stats = p.meta.stats();
    let row = p.meta.get("a.rs#X").unwrap();

    assert_eq!(p.source.reload("a.rs").await, 0);
    assert_eq!(source_log.lock().len(), 1);
    assert_eq!(meta_log.lock().len(), 1);
    assert_eq!(p.root.stats(), root_stats);
    assert_eq!(p.meta.stats(), meta_stats);
    assert!(Arc::ptr_eq(&row, &p.meta.get("a.rs#X").unwrap()));
    assert!(!p.meta.has_expired("a.rs#X"));

    // 3. New hash: changed, old metadata uninstalled, new one installed
    p.units.set_unit("a.rs", vec![x(2)]);
    p.meta.register(&x(2).into_ref(), json!({ "table": "xs2" }));
    assert_eq!(p.source.reload("a.rs").await, 1);

    assert_eq!(source_log.lock()[1], (ChangeKind::Changed, "a.rs#X".to_string(), 2));
    let meta = p.meta.get("a.rs#X").unwrap();
    assert_eq!(meta.config["table"], "xs2");
    assert_eq!(meta.entity.content_hash, 2);

    // 4. Empty unit: removing; expired only within the tick
    let expired_seen = Arc::new(Mutex::new(false));
    {
        let flag = expired_seen.clone();
        let weak = Arc::downgrade(&p.meta);
        p.meta.on(move |e| {
            if let (true, Some(meta)) = (e.is_removing(), weak.upgrade()) {
                *flag.lock() = meta.has_expired(e.id()) && !meta.has(e.id());
            }
        });
    }
    p.units.set_unit("a.rs", vec![]);
    assert_eq!(p.source.reload("a.rs").await, 1);

    assert!(*expired_seen.lock());
    assert!(!p.meta.has("a.rs#X"));
    assert!(!p.meta.has_expired("a.rs#X"));
    assert!(!p.root.is_installed("a.rs#X"));

    assert_eq!(
        meta_log
            .lock()
            .iter()
            .map(|(kind, _, hash)| (*kind, *hash))
            .collect::<Vec<_>>(),
        vec![
            (ChangeKind::Added, 1),
            (ChangeKind::Changed, 2),
            (ChangeKind::Removing, 2),
        ]
    );
}

#[tokio::test]
async fn test_partial_configs_merge_before_install() {
    let p = pipeline();
    let e = x(1).into_ref();

    p.meta.register(&e, json!({ "a": 1 }));
    p.meta.register(&e, json!({ "b": 2 }));
    p.meta.register_method(&e, "save", json!({ "route": "/x" }));
    p.meta.register_method(&e, "save", json!({ "verb": "POST" }));

    p.units.set_unit("a.rs", vec![x(1)]);
    p.root.init().await.unwrap();

    let finalized = p.meta.kind().finalized.lock().clone();
    assert_eq!(
        finalized,
        vec![json!({
            "name": "X",
            "a": 1,
            "b": 2,
            "members": { "save": { "route": "/x", "verb": "POST" } }
        })]
    );
}

#[tokio::test]
async fn test_load_failure_defines_nothing() {
    let p = pipeline();
    p.units.set_unit("a.rs", vec![x(1)]);
    p.units.fail_unit("broken.rs", "unexpected token");

    p.root.init().await.unwrap();

    assert!(p.root.is_installed("a.rs#X"));
    assert_eq!(p.source.units(), vec!["a.rs"]);
}

// ============================================================================
// Initialization protocol
// ============================================================================

/// Logs initial install and init-event installs into a shared log
struct Ordered {
    tag: &'static str,
    log: Arc<Mutex<Vec<String>>>,
    initial: Vec<EntityRef>,
}

impl RegistryHooks for Ordered {
    fn initial_install(&self) -> Vec<EntityRef> {
        self.log.lock().push(format!("{} initial_install", self.tag));
        self.initial.clone()
    }

    fn on_install(&self, _ctx: &HookContext<'_>, entity: &EntityRef, event: &ChangeEvent) -> Propagation {
        self.log.lock().push(format!("{} {} {}", self.tag, event.kind(), entity.id));
        Propagation::Forward
    }
}

#[tokio::test]
async fn test_descendant_waits_for_parent_initial_install() {
    let units = InMemoryUnits::new();
    units.set_unit("a.rs", vec![x(1)]);
    let source = UnitChangeSource::new("units", units.clone(), units.clone(), None);

    let log = Arc::new(Mutex::new(Vec::new()));
    let parent = Registry::new(
        "parent",
        Upstream::Source(source.clone()),
        Ordered {
            tag: "parent",
            log: log.clone(),
            initial: vec![Entity::new("gen#Seed", "gen", 7).into_ref()],
        },
    );
    let child = Registry::child_of(
        "child",
        &parent,
        Ordered {
            tag: "child",
            log: log.clone(),
            initial: vec![],
        },
    );

    units.pause_loads();

    // Initializing the child first starts the parent and waits for it
    let mut child_init = tokio_test::task::spawn(child.init());
    assert_pending!(child_init.poll());
    tokio::task::yield_now().await;
    assert_pending!(child_init.poll());
    assert!(log.lock().is_empty());

    units.resume_loads();
    drop(child_init);
    child.init().await.unwrap();

    assert!(parent.is_initialized());
    assert!(child.is_initialized());

    let log = log.lock().clone();
    let position = |line: &str| log.iter().position(|l| l == line).unwrap();

    // Live events reach the child as they happen
    assert!(position("parent added a.rs#X") < position("child added a.rs#X"));
    // The child sees the parent's init events
    assert!(position("parent init gen#Seed") < position("child init gen#Seed"));
    // The child's own initial install comes after the parent's batch
    assert!(position("parent init gen#Seed") < position("child initial_install"));
    assert!(position("parent initial_install") < position("child initial_install"));
}

#[tokio::test]
async fn test_parent_failure_reaches_child_and_retry_succeeds() {
    let p = pipeline();
    p.units.set_unit("a.rs", vec![x(1)]);
    p.meta.register(&x(1).into_ref(), json!({}));
    p.units.fail_enumerate(Some("permission denied"));

    let err = p.meta.init().await.unwrap_err();
    assert!(matches!(&err, Error::Init { registry, .. } if registry == "meta"));
    assert!(matches!(err.root_cause(), Error::Internal(m) if m == "permission denied"));
    assert!(!p.meta.is_initialized());

    p.units.fail_enumerate(None);
    p.root.init().await.unwrap();

    assert!(p.meta.is_initialized());
    assert!(p.meta.has("a.rs#X"));
}

#[tokio::test]
async fn test_init_twice_installs_once() {
    let p = pipeline();
    p.units.set_unit("a.rs", vec![x(1)]);
    p.meta.register(&x(1).into_ref(), json!({}));

    let (a, b, c) = tokio::join!(p.root.init(), p.meta.init(), p.root.init());
    a.unwrap();
    b.unwrap();
    c.unwrap();
    p.root.init().await.unwrap();

    assert_eq!(p.units.enumerate_count(), 1);
    assert_eq!(p.units.load_count(), 1);
    assert_eq!(p.meta.kind().finalized.lock().len(), 1);
}

#[tokio::test]
async fn test_reset_then_reinit_rebuilds_tree() {
    let p = pipeline();
    p.units.set_unit("a.rs", vec![x(1)]);
    p.meta.register(&x(1).into_ref(), json!({ "v": 1 }));
    p.root.init().await.unwrap();
    assert!(p.meta.has("a.rs#X"));

    p.root.reset();
    assert!(!p.meta.has("a.rs#X"));
    assert!(p.root.entities().is_empty());

    p.meta.register(&x(1).into_ref(), json!({ "v": 2 }));
    p.root.init().await.unwrap();

    assert_eq!(p.meta.get("a.rs#X").unwrap().config["v"], 2);
    assert_eq!(p.root.stats().installed, 1);
}
