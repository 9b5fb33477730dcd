//! # Metadata Registries
//!
//! Declarations contribute configuration against an entity id before the
//! entity is installed. The registry accumulates it, freezes it once at
//! install time and keeps a short-lived copy after removal:
//!
//! ```text
//!  register / register_method          install              uninstall
//! ───────────────────────────▶ pending ────────▶ entries ────────────▶ expired ──(tick end)──▶ ∅
//!        (deep merge)                  (finalize once)     (readable this tick)
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! let schema = MetadataRegistry::with_kind("schema", Upstream::Registry(root), SchemaKind);
//!
//! schema.register(&entity, json!({ "fields": { "name": "str" } }));
//! schema.register_method(&entity, "save", json!({ "route": "/save" }));
//!
//! schema.init().await?;
//! let meta = schema.get(&entity);
//! ```

mod kind;
mod merge;
mod registry;

pub use kind::{InstalledView, Metadata, MetadataKind};
pub use merge::{deep_merge, is_primitive, IndexMerge, Merge};
pub use registry::{MetadataRegistry, MetadataStore};
