//! livemeta-core: live entity registries
//!
//! Layer2 - change sources, the registry tree and metadata registries
//!
//! # Modules
//!
//! - `source`: turns source unit reloads into `added` / `changed` / `removing`
//! - `registry`: installed entity sets composed into a tree
//! - `metadata`: registries that finalize contributed configuration
//! - `root`: the registry at the top of a tree
//!
//! # Usage
//!
//! ```ignore
//! use livemeta_core::{MetadataRegistry, RootRegistry, Upstream};
//! use livemeta_foundation::LivemetaConfig;
//!
//! let config = LivemetaConfig::load()?;
//! let root = RootRegistry::from_config(".", loader, Some(watcher), &config);
//! let schema = MetadataRegistry::with_kind("schema", Upstream::registry(root.clone()), SchemaKind);
//!
//! // Declarations contribute while their units load
//! schema.register(&entity, json!({ "fields": { "name": "str" } }));
//!
//! root.init().await?;
//! assert!(schema.has(&entity));
//! ```

pub mod metadata;
pub mod registry;
pub mod root;
pub mod source;

// Re-exports: Source
pub use source::{
    ChangeSource, InMemoryUnits, UnitChangeSource, UnitEnumerator, UnitLoader, UnitWatcher,
    WalkEnumerator, WatchEvent, WatchKind,
};

// Re-exports: Registry
pub use registry::{
    HookContext, InstalledEntity, Propagation, Registry, RegistryHooks, RegistryNode,
    RegistryStats, Upstream,
};

// Re-exports: Metadata
pub use metadata::{
    deep_merge, is_primitive, IndexMerge, InstalledView, Merge, Metadata, MetadataKind,
    MetadataRegistry, MetadataStore,
};

// Re-exports: Root
pub use root::{RootRegistry, ROOT_REGISTRY_NAME};
