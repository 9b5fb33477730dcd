//! Config - settings management
//!
//! - `livemeta.rs` - LivemetaConfig unified settings
//! - `store.rs` - JSON file store

mod livemeta;
mod store;

pub use livemeta::{LivemetaConfig, RegistrySettings, SourceConfig, LIVEMETA_CONFIG_FILE};
pub use store::ConfigStore;
