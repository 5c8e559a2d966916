//! Cascading soft deletes with a shared deletion timestamp.
//!
//! When an entity that opts into cascading is deleted, its declared
//! relationships are soft-deleted too (or hard-deleted when the root delete
//! is permanent), recursively, and every participating entity type that
//! opts into timestamp synchronization is stamped with the same instant.
//!
//! The engine is a library for a persistence layer to drive: either call
//! [`CascadeEngine::delete`] and let it run the whole depth-first traversal
//! including the row mutations (via [`EntityStore::apply_delete`]), or keep
//! the mutation in the host and bracket it with the two
//! [`DeleteLifecycle`] call sites. A ready-made SQLite store lives in
//! [`sqlite`].
//!
//! The engine never manages transactions and never retries: a failure
//! partway through a cascade propagates immediately and leaves earlier
//! deletions in place.

mod error;
mod executor;
mod hook;
mod model;
mod session;
pub mod sqlite;
mod store;
mod time;
mod validate;
mod walker;

pub use error::{CascadeError, Result};
pub use executor::CascadeEngine;
pub use hook::DeleteLifecycle;
pub use model::{CascadeConfig, DeleteMode, EntityRef, FetchMode, DEFAULT_CHUNK_SIZE};
pub use session::DeleteSession;
pub use store::{AccessorKind, EntityStore, RelationSet};
pub use time::{now_ms, Clock, SystemClock};
