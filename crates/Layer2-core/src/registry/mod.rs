//! # Registry Tree
//!
//! A [`Registry`] keeps the set of currently installed entities and runs its
//! [`RegistryHooks`] for every install and uninstall. Registries compose into
//! a tree rooted at a change source:
//!
//! ```text
//! UnitChangeSource
//!        │
//!        ▼
//!  Registry<()>  (root)
//!        │
//!        ├──▶ MetadataRegistry<Schema>
//!        │           └──▶ MetadataRegistry<Routes>
//!        └──▶ Registry<Custom>
//! ```
//!
//! ## Event application
//!
//! | event      | registry action                  |
//! |------------|----------------------------------|
//! | `added`    | install(curr)                    |
//! | `init`     | install(curr)                    |
//! | `changed`  | uninstall(prev) then install(curr) |
//! | `removing` | uninstall(prev)                  |
//!
//! An event is re-emitted downstream once if any hook it ran returned
//! [`Propagation::Forward`].
//!
//! ## Initialization order
//!
//! A registry over a change source pulls `source.init()` first. A registry
//! below another registry waits until the parent applied its own initial
//! install, so a descendant never starts its initial install early.

mod traits;
mod tree;

pub use traits::{HookContext, Propagation, RegistryHooks, RegistryNode, Upstream};
pub use tree::{InstalledEntity, Registry, RegistryStats};
