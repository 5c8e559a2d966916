use async_trait::async_trait;

use crate::error::Result;
use crate::model::{CascadeConfig, DeleteMode, EntityRef};

/// What a declared accessor name resolves to on an entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessorKind {
    /// A relationship the cascade can traverse.
    Relation,
    /// A plain attribute or scalar accessor; not a valid cascade target.
    Attribute,
}

/// Persistence collaborator the engine drives.
///
/// Capability and relationship lookups go through a declared registry rather
/// than runtime name probing, so misconfiguration is caught by the validator
/// before any mutation.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Whether this entity type carries a soft-delete marker.
    fn supports_soft_delete(&self, entity_type: &str) -> bool;

    /// The type's cascade declaration, if it opted in.
    fn cascade_config(&self, entity_type: &str) -> Option<CascadeConfig>;

    /// Look a declared accessor name up in the type's registry.
    fn describe_accessor(&self, entity_type: &str, name: &str) -> Option<AccessorKind>;

    /// Resolve a relationship into a handle over its current related set.
    async fn resolve(&self, entity: &EntityRef, name: &str) -> Result<Box<dyn RelationSet>>;

    /// Mutate exactly one record: set its marker to `deleted_at` for a soft
    /// delete, remove it for a force delete. No event dispatch; the engine
    /// drives recursion itself.
    async fn apply_delete(
        &self,
        entity: &EntityRef,
        mode: DeleteMode,
        deleted_at: i64,
    ) -> Result<()>;
}

/// One resolved relationship, filtered to its currently live records.
///
/// Direct and through relations share this surface; for a through relation
/// the handle yields the pivot rows, which are the deletion units.
#[async_trait]
pub trait RelationSet: Send + Sync {
    /// Entity type of the records this set deletes (the pivot for through
    /// relations).
    fn deletion_target(&self) -> &str;

    fn is_through(&self) -> bool;

    async fn count(&self) -> Result<u64>;

    /// Every live deletion unit, in primary-key order.
    async fn fetch_all(&self) -> Result<Vec<EntityRef>>;

    /// One keyset page of live deletion-unit primary keys, ascending,
    /// strictly after `after` when given.
    async fn fetch_page(&self, after: Option<&str>, limit: usize) -> Result<Vec<String>>;

    /// Bulk-delete the given keys; returns affected rows.
    async fn bulk_delete(&self, ids: &[String], mode: DeleteMode, deleted_at: i64) -> Result<u64>;

    /// Bulk-delete the entire live set in one statement; returns affected
    /// rows.
    async fn delete_all(&self, mode: DeleteMode, deleted_at: i64) -> Result<u64>;
}
