//! oaat-state: status model for one-at-a-time groups.
//!
//! A group's status holds the running-pod bookkeeping plus a map of
//! string-valued fields per item. This crate provides typed access to
//! those fields.
//!
//! # Architecture
//!
//! ```text
//! Items (collection over the configured item names)
//!   └── &mut dyn StatusBackend
//!         ├── SnapshotBackend  (borrowed status + pending overlay)
//!         └── ResourceBackend  (owned status, updated in place)
//! ```
//!
//! Every write is also recorded into a `StatusPatch`, which the caller
//! merges with its own group-level changes and persists.

pub mod backend;
pub mod collection;
pub mod error;
pub mod fields;
pub mod item;
pub mod patch;
pub mod types;

pub use backend::{ResourceBackend, SnapshotBackend, StatusBackend};
pub use collection::{ItemSchedule, Items};
pub use error::{StateError, StateResult};
pub use item::{Item, ItemStatus, epoch, saturating_add};
pub use patch::StatusPatch;
pub use types::*;
