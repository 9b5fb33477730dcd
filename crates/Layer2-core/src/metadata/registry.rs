//! Metadata Registry - pending → entries → expired

use super::kind::{InstalledView, Metadata, MetadataKind};
use super::merge::Merge;
use crate::registry::{HookContext, Propagation, Registry, RegistryHooks, Upstream};
use livemeta_foundation::{AsEntityId, ChangeEvent, EntityRef, RegistrySettings};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, trace};

type Rows<F> = HashMap<String, Arc<Metadata<F>>>;

/// Registry that finalizes contributed configuration into metadata rows
pub type MetadataRegistry<K> = Registry<MetadataStore<K>>;

struct PendingEntry<C> {
    entity: EntityRef,
    /// Locked on its own so callers can edit it without holding the table
    config: Arc<Mutex<C>>,
}

// ============================================================================
// MetadataStore - the hooks and tables of a MetadataRegistry
// ============================================================================

pub struct MetadataStore<K: MetadataKind> {
    kind: K,

    /// id → accumulating entity config
    pending: RwLock<HashMap<String, PendingEntry<K::Config>>>,

    /// id → member → accumulating member config
    pending_members: RwLock<HashMap<String, BTreeMap<String, K::MemberConfig>>>,

    /// id → finalized metadata
    entries: RwLock<Rows<K::Final>>,

    /// id → metadata uninstalled during the current tick
    expired: Arc<RwLock<Rows<K::Final>>>,
}

impl<K: MetadataKind> MetadataStore<K> {
    pub fn new(kind: K) -> Self {
        Self {
            kind,
            pending: RwLock::new(HashMap::new()),
            pending_members: RwLock::new(HashMap::new()),
            entries: RwLock::new(HashMap::new()),
            expired: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn kind(&self) -> &K {
        &self.kind
    }

    fn pending_slot(&self, entity: &EntityRef) -> Arc<Mutex<K::Config>> {
        let slot = {
            let mut pending = self.pending.write();
            let entry = pending
                .entry(entity.id.clone())
                .or_insert_with(|| PendingEntry {
                    entity: entity.clone(),
                    config: Arc::new(Mutex::new(self.kind.create_pending(entity))),
                });
            entry.entity = entity.clone();
            Arc::clone(&entry.config)
        };

        self.pending_members
            .write()
            .entry(entity.id.clone())
            .or_default();

        slot
    }

    /// Runs `f` with only this entity's pending slot locked
    fn with_pending<R>(&self, entity: &EntityRef, f: impl FnOnce(&mut K::Config) -> R) -> R {
        let slot = self.pending_slot(entity);
        let mut config = slot.lock();
        f(&mut config)
    }

    fn with_pending_member<R>(
        &self,
        entity: &EntityRef,
        member: &str,
        f: impl FnOnce(&mut K::MemberConfig) -> R,
    ) -> R {
        self.pending_slot(entity);

        let mut members = self.pending_members.write();
        let config = members
            .entry(entity.id.clone())
            .or_default()
            .entry(member.to_string())
            .or_insert_with(|| self.kind.create_pending_member(entity, member));
        f(config)
    }
}

impl<K: MetadataKind> RegistryHooks for MetadataStore<K> {
    fn initial_install(&self) -> Vec<EntityRef> {
        let mut entities: Vec<EntityRef> = self
            .pending
            .read()
            .values()
            .map(|p| p.entity.clone())
            .collect();
        entities.sort_by(|a, b| a.id.cmp(&b.id));
        entities
    }

    fn on_install(&self, ctx: &HookContext<'_>, entity: &EntityRef, _event: &ChangeEvent) -> Propagation {
        let pending = self.pending.write().remove(&entity.id);
        let members = self.pending_members.write().remove(&entity.id);

        if pending.is_none() && members.is_none() {
            trace!(registry = %ctx.registry, id = %entity.id, "No pending config; not installed");
            return Propagation::Suppress;
        }

        let config = match pending {
            Some(p) => Arc::try_unwrap(p.config)
                .map(Mutex::into_inner)
                .unwrap_or_else(|shared| shared.lock().clone()),
            None => self.kind.create_pending(entity),
        };

        let finalized = {
            let entries = self.entries.read();
            let view = InstalledView::new(&entries);
            self.kind
                .on_install_finalize(entity, config, members.unwrap_or_default(), &view)
        };

        self.entries.write().insert(
            entity.id.clone(),
            Arc::new(Metadata::new(entity.clone(), finalized)),
        );

        debug!(registry = %ctx.registry, id = %entity.id, "Metadata finalized");
        Propagation::Forward
    }

    fn on_uninstall(&self, ctx: &HookContext<'_>, entity: &EntityRef, event: &ChangeEvent) -> Propagation {
        let Some(row) = self.entries.write().remove(&entity.id) else {
            return Propagation::Suppress;
        };

        self.expired.write().insert(entity.id.clone(), row.clone());
        self.kind.on_uninstall_finalize(entity, &row);
        debug!(registry = %ctx.registry, id = %entity.id, "Metadata expired");

        // Evict at the end of the tick unless a newer row took the slot
        let expired = Arc::clone(&self.expired);
        let id = entity.id.clone();
        ctx.tick.defer(move || {
            let mut expired = expired.write();
            if expired.get(&id).is_some_and(|current| Arc::ptr_eq(current, &row)) {
                expired.remove(&id);
            }
        });

        if event.is_removing() {
            Propagation::Forward
        } else {
            Propagation::Suppress
        }
    }

    fn on_reset(&self) {
        self.pending.write().clear();
        self.pending_members.write().clear();
        self.entries.write().clear();
        self.expired.write().clear();
    }
}

// ============================================================================
// MetadataRegistry API
// ============================================================================

impl<K: MetadataKind> Registry<MetadataStore<K>> {
    /// Metadata registry of kind `K` fed by `upstream`
    pub fn with_kind(name: impl Into<String>, upstream: Upstream, kind: K) -> Arc<Self> {
        Registry::new(name, upstream, MetadataStore::new(kind))
    }

    pub fn with_kind_and_settings(
        name: impl Into<String>,
        upstream: Upstream,
        kind: K,
        settings: &RegistrySettings,
    ) -> Arc<Self> {
        Registry::with_settings(name, upstream, MetadataStore::new(kind), settings)
    }

    pub fn kind(&self) -> &K {
        self.hooks().kind()
    }

    // ========================================================================
    // Contribution
    // ========================================================================

    /// Current pending config of `entity`, created on first access
    pub fn get_or_create_pending(&self, entity: &EntityRef) -> K::Config {
        self.hooks().with_pending(entity, |config| config.clone())
    }

    /// Edit the pending config of `entity` in place.
    ///
    /// `f` may read this registry, but must not touch the pending config of
    /// the same entity again (that slot is locked while `f` runs).
    pub fn update_pending<R>(&self, entity: &EntityRef, f: impl FnOnce(&mut K::Config) -> R) -> R {
        self.hooks().with_pending(entity, f)
    }

    /// Deep-merge a partial config into the pending config of `entity`
    pub fn register(&self, entity: &EntityRef, partial: K::Config) {
        trace!(registry = %self.name(), id = %entity.id, "Registering config");
        self.hooks().with_pending(entity, |config| config.merge(partial));
    }

    /// Current pending config of one member, created on first access
    pub fn get_or_create_pending_method(&self, entity: &EntityRef, member: &str) -> K::MemberConfig {
        self.hooks()
            .with_pending_member(entity, member, |config| config.clone())
    }

    /// Deep-merge a partial config into the pending config of one member
    pub fn register_method(&self, entity: &EntityRef, member: &str, partial: K::MemberConfig) {
        trace!(registry = %self.name(), id = %entity.id, member = %member, "Registering member config");
        self.hooks()
            .with_pending_member(entity, member, |config| config.merge(partial));
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn has<I: AsEntityId + ?Sized>(&self, id: &I) -> bool {
        self.hooks().entries.read().contains_key(id.entity_id())
    }

    pub fn get<I: AsEntityId + ?Sized>(&self, id: &I) -> Option<Arc<Metadata<K::Final>>> {
        self.hooks().entries.read().get(id.entity_id()).cloned()
    }

    pub fn has_expired<I: AsEntityId + ?Sized>(&self, id: &I) -> bool {
        self.hooks().expired.read().contains_key(id.entity_id())
    }

    pub fn get_expired<I: AsEntityId + ?Sized>(&self, id: &I) -> Option<Arc<Metadata<K::Final>>> {
        self.hooks().expired.read().get(id.entity_id()).cloned()
    }

    pub fn has_pending<I: AsEntityId + ?Sized>(&self, id: &I) -> bool {
        self.hooks().pending.read().contains_key(id.entity_id())
    }

    /// Entities with finalized metadata, sorted by id
    pub fn get_classes(&self) -> Vec<EntityRef> {
        let mut entities: Vec<EntityRef> = self
            .hooks()
            .entries
            .read()
            .values()
            .map(|row| row.entity.clone())
            .collect();
        entities.sort_by(|a, b| a.id.cmp(&b.id));
        entities
    }

    /// Finalized metadata of the parent declaration of `id`
    pub fn get_parent<I: AsEntityId + ?Sized>(&self, id: &I) -> Option<Arc<Metadata<K::Final>>> {
        let entries = self.hooks().entries.read();
        let parent_id = entries.get(id.entity_id())?.entity.parent_id.clone()?;
        entries.get(&parent_id).cloned()
    }

    /// Ids with pending config, sorted
    pub fn pending_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.hooks().pending.read().keys().cloned().collect();
        ids.sort();
        ids
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::UnitChangeSource;
    use crate::source::InMemoryUnits;
    use livemeta_foundation::{ChangeKind, Entity};
    use serde_json::{json, Value};

    /// Final config: merged fields, parent fields underneath
    #[derive(Debug, PartialEq)]
    struct Schema {
        fields: Value,
        members: BTreeMap<String, Value>,
    }

    #[derive(Default)]
    struct SchemaKind {
        uninstalled: Mutex<Vec<String>>,
    }

    impl MetadataKind for SchemaKind {
        type Config = Value;
        type MemberConfig = Value;
        type Final = Schema;

        fn create_pending(&self, _entity: &EntityRef) -> Value {
            json!({ "fields": {} })
        }

        fn on_install_finalize(
            &self,
            entity: &EntityRef,
            pending: Value,
            members: BTreeMap<String, Value>,
            installed: &InstalledView<'_, Schema>,
        ) -> Schema {
            let mut fields = match installed.parent_of(entity) {
                Some(parent) => parent.fields.clone(),
                None => json!({}),
            };
            fields.merge(pending["fields"].clone());
            Schema { fields, members }
        }

        fn on_uninstall_finalize(&self, entity: &EntityRef, _metadata: &Metadata<Schema>) {
            self.uninstalled.lock().push(entity.id.clone());
        }
    }

    struct Fixture {
        source: Arc<UnitChangeSource>,
        registry: Arc<MetadataRegistry<SchemaKind>>,
        seen: Arc<Mutex<Vec<(ChangeKind, String)>>>,
    }

    fn fixture() -> Fixture {
        let units = InMemoryUnits::new();
        let source = UnitChangeSource::new("source", units.clone(), units, None);
        let registry = MetadataRegistry::with_kind(
            "schema",
            Upstream::Source(source.clone()),
            SchemaKind::default(),
        );

        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = seen.clone();
            registry.on(move |e| seen.lock().push((e.kind(), e.id().to_string())));
        }

        Fixture { source, registry, seen }
    }

    fn user(hash: u64) -> EntityRef {
        Entity::new("user#User", "user.rs", hash).into_ref()
    }

    #[test]
    fn test_register_accumulates() {
        let f = fixture();
        let e = user(1);

        f.registry.register(&e, json!({ "fields": { "a": 1 } }));
        f.registry.register(&e, json!({ "fields": { "b": 2, "a": 3 } }));

        assert!(f.registry.has_pending(&e));
        assert_eq!(
            f.registry.get_or_create_pending(&e),
            json!({ "fields": { "a": 3, "b": 2 } })
        );
    }

    #[test]
    fn test_update_pending_can_read_registry() {
        let f = fixture();
        let e = user(1);
        let other = Entity::new("user#Admin", "user.rs", 1).into_ref();
        f.registry.register(&other, json!({ "fields": { "role": "admin" } }));

        let seen = f.registry.update_pending(&e, |config| {
            config["fields"]["id"] = json!("int");
            (
                f.registry.has_pending(&e),
                f.registry.get_or_create_pending(&other),
                f.registry.pending_ids(),
            )
        });

        assert!(seen.0);
        assert_eq!(seen.1["fields"]["role"], "admin");
        assert_eq!(seen.2, vec!["user#Admin", "user#User"]);
        assert_eq!(f.registry.get_or_create_pending(&e)["fields"]["id"], "int");
    }

    #[test]
    fn test_install_finalizes_and_consumes_pending() {
        let f = fixture();
        let e = user(1);
        f.registry.register(&e, json!({ "fields": { "a": 1 } }));
        f.registry.register(&e, json!({ "fields": { "b": 2 } }));
        f.registry.register_method(&e, "save", json!({ "route": "/save" }));

        f.source.handle_unit_change("user.rs", vec![(*e).clone()]);

        let meta = f.registry.get("user#User").unwrap();
        assert_eq!(meta.fields, json!({ "a": 1, "b": 2 }));
        assert_eq!(meta.members["save"], json!({ "route": "/save" }));
        assert!(!f.registry.has_pending(&e));
        assert_eq!(*f.seen.lock(), vec![(ChangeKind::Added, "user#User".to_string())]);
    }

    #[test]
    fn test_entity_without_config_is_never_installed() {
        let f = fixture();
        f.source.handle_unit_change("user.rs", vec![(*user(1)).clone()]);

        assert!(!f.registry.has("user#User"));
        assert!(f.registry.is_installed("user#User"));
        assert!(f.seen.lock().is_empty());
    }

    #[test]
    fn test_member_config_alone_creates_pending() {
        let f = fixture();
        let e = user(1);
        assert_eq!(f.registry.get_or_create_pending_method(&e, "save"), Value::Null);
        assert!(f.registry.has_pending(&e));

        f.source.handle_unit_change("user.rs", vec![(*e).clone()]);
        assert!(f.registry.has(&e));
    }

    #[test]
    fn test_removal_is_readable_until_tick_end() {
        let f = fixture();
        let e = user(1);
        f.registry.register(&e, json!({ "fields": { "a": 1 } }));
        f.source.handle_unit_change("user.rs", vec![(*e).clone()]);

        let observed = Arc::new(Mutex::new(None));
        {
            let observed = observed.clone();
            let weak = Arc::downgrade(&f.registry);
            f.registry.on(move |event| {
                if let Some(registry) = weak.upgrade() {
                    if event.is_removing() {
                        *observed.lock() = registry.get_expired(event.id()).map(|m| m.fields.clone());
                    }
                }
            });
        }

        f.source.handle_unit_change("user.rs", vec![]);

        assert_eq!(*observed.lock(), Some(json!({ "a": 1 })));
        assert!(!f.registry.has("user#User"));
        assert!(!f.registry.has_expired("user#User"));
        assert_eq!(*f.registry.kind().uninstalled.lock(), vec!["user#User"]);
        assert_eq!(f.seen.lock().last().unwrap().0, ChangeKind::Removing);
    }

    #[test]
    fn test_expired_stays_until_flush_outside_batch() {
        let f = fixture();
        let e = user(1);
        f.registry.register(&e, json!({ "fields": {} }));
        f.source.handle_unit_change("user.rs", vec![(*e).clone()]);

        // Applied directly, outside any source batch, the registry still
        // closes its own batch and evicts
        f.registry.on_event(&ChangeEvent::removing(e.clone()));
        assert!(!f.registry.has_expired(&e));

        // Inside a caller's batch eviction waits for the batch to end
        f.registry.register(&e, json!({ "fields": {} }));
        f.registry.on_event(&ChangeEvent::added(e.clone()));
        f.registry.tick().clone().batch(|| {
            f.registry.on_event(&ChangeEvent::removing(e.clone()));
            assert!(f.registry.has_expired(&e));
        });
        assert!(!f.registry.has_expired(&e));
    }

    #[test]
    fn test_changed_reinstalls_with_fresh_config() {
        let f = fixture();
        f.registry.register(&user(1), json!({ "fields": { "a": 1 } }));
        f.source.handle_unit_change("user.rs", vec![(*user(1)).clone()]);

        f.registry.register(&user(2), json!({ "fields": { "a": 2 } }));
        f.source.handle_unit_change("user.rs", vec![(*user(2)).clone()]);

        let meta = f.registry.get("user#User").unwrap();
        assert_eq!(meta.fields, json!({ "a": 2 }));
        assert_eq!(meta.entity.content_hash, 2);
        assert_eq!(
            *f.seen.lock(),
            vec![
                (ChangeKind::Added, "user#User".to_string()),
                (ChangeKind::Changed, "user#User".to_string()),
            ]
        );
    }

    #[test]
    fn test_changed_without_config_drops_entry_silently() {
        let f = fixture();
        f.registry.register(&user(1), json!({ "fields": { "a": 1 } }));
        f.source.handle_unit_change("user.rs", vec![(*user(1)).clone()]);
        f.seen.lock().clear();

        f.source.handle_unit_change("user.rs", vec![(*user(2)).clone()]);

        assert!(!f.registry.has("user#User"));
        assert!(f.seen.lock().is_empty());
    }

    #[test]
    fn test_parent_metadata_is_inherited() {
        let f = fixture();
        let base = Entity::new("base#Base", "base.rs", 1).into_ref();
        let derived = Entity::new("user#User", "user.rs", 1)
            .with_parent("base#Base")
            .into_ref();

        f.registry.register(&base, json!({ "fields": { "id": "int" } }));
        f.registry.register(&derived, json!({ "fields": { "name": "str" } }));
        f.source.handle_unit_change("base.rs", vec![(*base).clone()]);
        f.source.handle_unit_change("user.rs", vec![(*derived).clone()]);

        let meta = f.registry.get(&derived).unwrap();
        assert_eq!(meta.fields, json!({ "id": "int", "name": "str" }));
        assert_eq!(f.registry.get_parent(&derived).unwrap().id(), "base#Base");
        assert_eq!(f.registry.get_classes().len(), 2);
    }

    #[tokio::test]
    async fn test_init_installs_pending_entities() {
        let f = fixture();
        let e = Entity::new("gen#Generated", "generated", 1).into_ref();
        f.registry.register(&e, json!({ "fields": { "x": true } }));

        f.registry.init().await.unwrap();

        assert!(f.registry.has(&e));
        assert_eq!(*f.seen.lock(), vec![(ChangeKind::Init, "gen#Generated".to_string())]);
    }

    #[test]
    fn test_reset_clears_all_tables() {
        let f = fixture();
        f.registry.register(&user(1), json!({ "fields": {} }));
        f.source.handle_unit_change("user.rs", vec![(*user(1)).clone()]);
        f.registry.register(&user(2), json!({ "fields": {} }));

        f.registry.reset();

        assert!(!f.registry.has("user#User"));
        assert!(!f.registry.has_pending("user#User"));
        assert!(f.registry.pending_ids().is_empty());
        assert!(f.registry.get_classes().is_empty());
    }
}
