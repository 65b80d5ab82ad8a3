//! Abstract object store contract.
//!
//! The core never dictates how entities are physically stored. A backend only
//! has to provide identity lookup, predicate queries, mutation, and a single
//! logical transaction that can be committed or rolled back.

use thiserror::Error;

use crate::entity::{Entity, EntityType, LocalId};
use crate::storage::Predicate;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Entity not found.
    #[error("Entity not found: {0}")]
    NotFound(LocalId),

    /// Query could not be evaluated.
    #[error("Invalid predicate: {0}")]
    InvalidPredicate(String),

    /// Store unreachable or internally inconsistent.
    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Storage contract for mapped entities.
///
/// # Transactions
/// Every mutation lands in one pending transaction shared by all callers of
/// the store. `commit` makes it durable; `rollback` discards it and restores
/// the last committed state. Reads observe pending changes.
pub trait ObjectStore: Send + Sync {
    /// Create and insert an empty entity of `entity_type`, uncommitted.
    fn insert(&self, entity_type: &EntityType) -> Result<Entity, StoreError>;

    /// Replace the stored value of an existing entity. Errors if not found.
    fn update(&self, entity: Entity) -> Result<(), StoreError>;

    /// First entity of `entity_type` matching `predicate`, in insertion order.
    fn find_one(
        &self,
        entity_type: &EntityType,
        predicate: &Predicate,
    ) -> Result<Option<Entity>, StoreError>;

    /// All entities of `entity_type` matching `predicate`, in insertion order.
    fn find_many(
        &self,
        entity_type: &EntityType,
        predicate: &Predicate,
    ) -> Result<Vec<Entity>, StoreError>;

    /// Get an entity by local ID.
    fn find_by_id(&self, id: LocalId) -> Result<Option<Entity>, StoreError>;

    /// Delete an entity by local ID. Errors if not found.
    ///
    /// References to the deleted entity held by other entities' relationships
    /// are cleared.
    fn delete(&self, id: LocalId) -> Result<(), StoreError>;

    /// Count entities of `entity_type` matching `predicate`.
    fn count(&self, entity_type: &EntityType, predicate: &Predicate) -> Result<usize, StoreError>;

    /// Make pending changes durable.
    fn commit(&self) -> Result<(), StoreError>;

    /// Discard pending changes.
    fn rollback(&self) -> Result<(), StoreError>;

    /// Whether there are uncommitted changes.
    fn has_changes(&self) -> Result<bool, StoreError>;

    /// All entities of `entity_type`.
    fn all_objects(&self, entity_type: &EntityType) -> Result<Vec<Entity>, StoreError> {
        self.find_many(entity_type, &Predicate::all())
    }

    /// Alias of [`ObjectStore::find_many`].
    fn objects_with_predicate(
        &self,
        entity_type: &EntityType,
        predicate: &Predicate,
    ) -> Result<Vec<Entity>, StoreError> {
        self.find_many(entity_type, predicate)
    }

    /// Alias of [`ObjectStore::find_one`].
    fn object_with_predicate(
        &self,
        entity_type: &EntityType,
        predicate: &Predicate,
    ) -> Result<Option<Entity>, StoreError> {
        self.find_one(entity_type, predicate)
    }
}
