//! Change Sources
//!
//! A change source watches source units, re-evaluates the ones that change
//! and turns each reload into entity-level events:
//!
//! ```text
//! UnitEnumerator ──▶ UnitLoader ──▶ UnitChangeSource ──▶ added / changed / removing
//!                        ▲                  │
//! UnitWatcher ───────────┘                  └── remembered {unit → {id → entity}}
//! ```

pub mod discovery;
pub mod memory;
pub mod traits;
pub mod unit;

pub use discovery::WalkEnumerator;
pub use memory::InMemoryUnits;
pub use traits::{ChangeSource, UnitEnumerator, UnitLoader, UnitWatcher, WatchEvent, WatchKind};
pub use unit::UnitChangeSource;
