//! Event System - change events and their synchronous dispatch
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  emit(ChangeEvent)  ┌──────────────┐  emit  ┌──────────────┐
//! │ ChangeSource │ ──────────────────▶ │   Registry   │ ─────▶ │  Descendant  │
//! └──────────────┘                     └──────────────┘        └──────────────┘
//!        │                                    │                       │
//!        └──────────── Tick::batch ───────────┴──── Tick::defer ──────┘
//! ```
//!
//! Every component owns a [`ChangeEmitter`]. A [`Tick`] shared by one pipeline
//! collects deferred work and runs it when the outermost dispatch returns.
//!
//! ## Usage
//!
//! ```ignore
//! use livemeta_foundation::event::{ChangeEmitter, ChangeEvent, Tick};
//!
//! let tick = Tick::new();
//! let emitter = ChangeEmitter::new("source");
//! let id = emitter.on(|e| println!("{}", e));
//!
//! tick.batch(|| emitter.emit(&ChangeEvent::added(entity)));
//! emitter.off(id);
//! ```

pub mod emitter;
pub mod tick;
pub mod types;

pub use emitter::{ChangeEmitter, ChangeListener, ListenerId};
pub use tick::Tick;
pub use types::{ChangeEvent, ChangeKind};
