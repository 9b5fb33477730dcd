//! Core - shared entity types

mod types;

pub use types::{AsEntityId, Entity, EntityRef};
