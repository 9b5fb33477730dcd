//! Metadata kinds and finalized metadata

use super::merge::Merge;
use chrono::{DateTime, Utc};
use livemeta_foundation::{AsEntityId, EntityRef};
use std::collections::{BTreeMap, HashMap};
use std::ops::Deref;
use std::sync::Arc;

// ============================================================================
// MetadataKind
// ============================================================================

/// One kind of metadata a [`super::MetadataRegistry`] collects.
///
/// Declarations contribute partial `Config` (entity level) and
/// `MemberConfig` (per member) values while a source unit loads. At install
/// time the kind folds them into one immutable `Final`.
pub trait MetadataKind: Send + Sync + 'static {
    type Config: Merge + Clone + Send + Sync + 'static;
    type MemberConfig: Merge + Default + Clone + Send + Sync + 'static;
    type Final: Send + Sync + 'static;

    /// Starting point of an entity's pending config
    fn create_pending(&self, entity: &EntityRef) -> Self::Config;

    /// Starting point of a member's pending config
    fn create_pending_member(&self, _entity: &EntityRef, _member: &str) -> Self::MemberConfig {
        Self::MemberConfig::default()
    }

    /// Combine an entity with everything contributed for it.
    ///
    /// `installed` shows the metadata already finalized by this registry,
    /// e.g. to inherit from the parent entity.
    fn on_install_finalize(
        &self,
        entity: &EntityRef,
        pending: Self::Config,
        members: BTreeMap<String, Self::MemberConfig>,
        installed: &InstalledView<'_, Self::Final>,
    ) -> Self::Final;

    /// Cleanup after an entity's metadata moved to the expired table
    fn on_uninstall_finalize(&self, _entity: &EntityRef, _metadata: &Metadata<Self::Final>) {}
}

// ============================================================================
// Metadata
// ============================================================================

/// Finalized metadata row
#[derive(Debug)]
pub struct Metadata<F> {
    /// Entity the metadata was finalized for
    pub entity: EntityRef,
    pub config: F,
    pub finalized_at: DateTime<Utc>,
}

impl<F> Metadata<F> {
    pub fn new(entity: EntityRef, config: F) -> Self {
        Self {
            entity,
            config,
            finalized_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.entity.id
    }
}

impl<F> Deref for Metadata<F> {
    type Target = F;

    fn deref(&self) -> &F {
        &self.config
    }
}

// ============================================================================
// InstalledView
// ============================================================================

/// Read-only view of a registry's finalized metadata
pub struct InstalledView<'a, F> {
    entries: &'a HashMap<String, Arc<Metadata<F>>>,
}

impl<'a, F> InstalledView<'a, F> {
    pub(crate) fn new(entries: &'a HashMap<String, Arc<Metadata<F>>>) -> Self {
        Self { entries }
    }

    pub fn get<K: AsEntityId + ?Sized>(&self, id: &K) -> Option<&'a Arc<Metadata<F>>> {
        self.entries.get(id.entity_id())
    }

    pub fn has<K: AsEntityId + ?Sized>(&self, id: &K) -> bool {
        self.entries.contains_key(id.entity_id())
    }

    /// Finalized metadata of the entity's parent declaration
    pub fn parent_of(&self, entity: &EntityRef) -> Option<&'a Arc<Metadata<F>>> {
        entity
            .parent_id
            .as_deref()
            .and_then(|parent| self.entries.get(parent))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
