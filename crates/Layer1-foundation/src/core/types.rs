//! Core Types - shared by every layer

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

// ============================================================================
// Entity - an addressable declared unit
// ============================================================================

/// Shared handle to an entity. Events and registries pass these around; two
/// handles may point at different objects with the same id and hash.
pub type EntityRef = Arc<Entity>;

/// A declared unit of program structure discovered in a source unit.
///
/// `id` is derived from the source unit path plus the declared name and stays
/// stable across reloads of the same logical declaration. `content_hash`
/// changes iff the declaration's observable content changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    /// Globally unique id
    pub id: String,

    /// Source unit that currently defines this entity
    pub source_unit: String,

    /// Hash of the full declared body
    pub content_hash: u64,

    /// Per-member content hash
    #[serde(default)]
    pub member_hashes: BTreeMap<String, u64>,

    /// Id of the parent declaration (superclass), filled in at declaration time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl Entity {
    pub fn new(id: impl Into<String>, source_unit: impl Into<String>, content_hash: u64) -> Self {
        Self {
            id: id.into(),
            source_unit: source_unit.into(),
            content_hash,
            member_hashes: BTreeMap::new(),
            parent_id: None,
        }
    }

    /// Id built from a source unit and a declared name (`unit#Name`)
    pub fn derive_id(source_unit: &str, name: &str) -> String {
        format!("{}#{}", source_unit, name)
    }

    /// Add a member hash
    pub fn with_member(mut self, name: impl Into<String>, hash: u64) -> Self {
        self.member_hashes.insert(name.into(), hash);
        self
    }

    /// Set the parent declaration id
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn into_ref(self) -> EntityRef {
        Arc::new(self)
    }

    /// Declared name (the part after `#`), or the whole id if it has none
    pub fn name(&self) -> &str {
        self.id.rsplit_once('#').map(|(_, name)| name).unwrap_or(&self.id)
    }

    /// Same declaration content as `other`
    pub fn same_content(&self, other: &Entity) -> bool {
        self.content_hash == other.content_hash
    }

    /// Members added, removed or rehashed relative to `prev`, sorted by name
    pub fn changed_members(&self, prev: &Entity) -> Vec<String> {
        let mut changed: Vec<String> = self
            .member_hashes
            .iter()
            .filter(|(name, hash)| prev.member_hashes.get(*name) != Some(*hash))
            .map(|(name, _)| name.clone())
            .collect();

        changed.extend(
            prev.member_hashes
                .keys()
                .filter(|name| !self.member_hashes.contains_key(*name))
                .cloned(),
        );

        changed.sort();
        changed
    }
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({:x})", self.id, self.content_hash)
    }
}

// ============================================================================
// AsEntityId - lookup key
// ============================================================================

/// Anything a registry lookup accepts in place of an id
pub trait AsEntityId {
    fn entity_id(&self) -> &str;
}

impl AsEntityId for str {
    fn entity_id(&self) -> &str {
        self
    }
}

impl AsEntityId for String {
    fn entity_id(&self) -> &str {
        self
    }
}

impl AsEntityId for Entity {
    fn entity_id(&self) -> &str {
        &self.id
    }
}

impl<T: AsEntityId + ?Sized> AsEntityId for &T {
    fn entity_id(&self) -> &str {
        (**self).entity_id()
    }
}

impl<T: AsEntityId + ?Sized> AsEntityId for Arc<T> {
    fn entity_id(&self) -> &str {
        (**self).entity_id()
    }
}
