//! # livemeta-foundation
//!
//! Foundation layer for livemeta:
//! - Core: `Entity`, the unit every registry tracks
//! - Event: `ChangeEvent`, listener lists and the dispatch tick
//! - Config: `LivemetaConfig` and its JSON store
//! - Logging: `tracing` subscriber bootstrap
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  livemeta-core                                          │
//! │  ChangeSource ──▶ Registry ──▶ MetadataRegistry ...     │
//! │                     │                                   │
//! │                     ▼                                   │
//! │  livemeta-foundation                                    │
//! │  Entity · ChangeEvent · ChangeEmitter · Tick · Error    │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod event;
pub mod logging;

// ============================================================================
// Error
// ============================================================================
pub use error::{Error, Result};

// ============================================================================
// Core
// ============================================================================
pub use core::{AsEntityId, Entity, EntityRef};

// ============================================================================
// Event
// ============================================================================
pub use event::{ChangeEmitter, ChangeEvent, ChangeKind, ChangeListener, ListenerId, Tick};

// ============================================================================
// Config
// ============================================================================
pub use config::{ConfigStore, LivemetaConfig, RegistrySettings, SourceConfig, LIVEMETA_CONFIG_FILE};

// ============================================================================
// Logging
// ============================================================================
pub use logging::init_logging;
