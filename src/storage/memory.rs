//! In-memory object store.
//!
//! This module provides a thread-safe, transactional in-memory implementation
//! of [`ObjectStore`]. It is intended for embedded usage, tests, and as a
//! reference implementation for persistent backends.

use std::collections::HashMap;
use std::sync::RwLock;

use tracing::debug;

use crate::entity::{Entity, EntityType, LocalId};
use crate::storage::traits::{ObjectStore, StoreError};
use crate::storage::Predicate;

fn lock_err(context: &'static str) -> StoreError {
    StoreError::Backend(format!("poisoned lock: {context}"))
}

#[derive(Debug, Clone)]
struct Record {
    seq: u64,
    entity: Entity,
}

#[derive(Debug, Clone, Default)]
struct Snapshot {
    by_id: HashMap<LocalId, Record>,
}

impl Snapshot {
    fn query(&self, entity_type: &EntityType, predicate: &Predicate) -> Vec<Entity> {
        let mut hits: Vec<&Record> = self
            .by_id
            .values()
            .filter(|r| &r.entity.entity_type == entity_type && predicate.matches(&r.entity))
            .collect();
        hits.sort_by_key(|r| r.seq);
        hits.into_iter().map(|r| r.entity.clone()).collect()
    }
}

#[derive(Debug, Default)]
struct StoreState {
    committed: Snapshot,
    working: Snapshot,
    dirty: bool,
    next_seq: u64,
}

/// Thread-safe in-memory object store.
///
/// Mutations apply to a working snapshot; `commit` publishes it and
/// `rollback` reverts to the last published one.
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    state: RwLock<StoreState>,
}

impl InMemoryObjectStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fully formed entity, keeping its local ID. Uncommitted.
    ///
    /// Useful for seeding a store from an external source.
    pub fn insert_entity(&self, entity: Entity) -> Result<(), StoreError> {
        let mut state = self.state.write().map_err(|_| lock_err("store.insert_entity"))?;
        if state.working.by_id.contains_key(&entity.id) {
            return Err(StoreError::Backend(format!("duplicate local id: {}", entity.id)));
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        state.working.by_id.insert(entity.id, Record { seq, entity });
        state.dirty = true;
        Ok(())
    }

    /// Number of entities of any type, including uncommitted ones.
    pub fn len(&self) -> Result<usize, StoreError> {
        let state = self.state.read().map_err(|_| lock_err("store.len"))?;
        Ok(state.working.by_id.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn insert(&self, entity_type: &EntityType) -> Result<Entity, StoreError> {
        let entity = Entity::new(entity_type.clone());
        self.insert_entity(entity.clone())?;
        Ok(entity)
    }

    fn update(&self, entity: Entity) -> Result<(), StoreError> {
        let mut state = self.state.write().map_err(|_| lock_err("store.update"))?;
        let record = state
            .working
            .by_id
            .get_mut(&entity.id)
            .ok_or(StoreError::NotFound(entity.id))?;
        if record.entity.entity_type != entity.entity_type {
            return Err(StoreError::Backend(format!(
                "cannot change entity type of {}: {} -> {}",
                entity.id, record.entity.entity_type, entity.entity_type
            )));
        }
        record.entity = entity;
        state.dirty = true;
        Ok(())
    }

    fn find_one(
        &self,
        entity_type: &EntityType,
        predicate: &Predicate,
    ) -> Result<Option<Entity>, StoreError> {
        Ok(self.find_many(entity_type, predicate)?.into_iter().next())
    }

    fn find_many(
        &self,
        entity_type: &EntityType,
        predicate: &Predicate,
    ) -> Result<Vec<Entity>, StoreError> {
        predicate.validate()?;
        let state = self.state.read().map_err(|_| lock_err("store.find_many"))?;
        Ok(state.working.query(entity_type, predicate))
    }

    fn find_by_id(&self, id: LocalId) -> Result<Option<Entity>, StoreError> {
        let state = self.state.read().map_err(|_| lock_err("store.find_by_id"))?;
        Ok(state.working.by_id.get(&id).map(|r| r.entity.clone()))
    }

    fn delete(&self, id: LocalId) -> Result<(), StoreError> {
        let mut state = self.state.write().map_err(|_| lock_err("store.delete"))?;
        state
            .working
            .by_id
            .remove(&id)
            .ok_or(StoreError::NotFound(id))?;

        for record in state.working.by_id.values_mut() {
            for relationship in record.entity.relationships.values_mut() {
                relationship.remove(id);
            }
        }
        state.dirty = true;
        Ok(())
    }

    fn count(&self, entity_type: &EntityType, predicate: &Predicate) -> Result<usize, StoreError> {
        predicate.validate()?;
        let state = self.state.read().map_err(|_| lock_err("store.count"))?;
        Ok(state
            .working
            .by_id
            .values()
            .filter(|r| &r.entity.entity_type == entity_type && predicate.matches(&r.entity))
            .count())
    }

    fn commit(&self) -> Result<(), StoreError> {
        let mut state = self.state.write().map_err(|_| lock_err("store.commit"))?;
        if state.dirty {
            let snapshot = state.working.clone();
            state.committed = snapshot;
            state.dirty = false;
            debug!(entities = state.committed.by_id.len(), "store committed");
        }
        Ok(())
    }

    fn rollback(&self) -> Result<(), StoreError> {
        let mut state = self.state.write().map_err(|_| lock_err("store.rollback"))?;
        if state.dirty {
            let snapshot = state.committed.clone();
            state.working = snapshot;
            state.dirty = false;
            debug!(entities = state.working.by_id.len(), "store rolled back");
        }
        Ok(())
    }

    fn has_changes(&self) -> Result<bool, StoreError> {
        let state = self.state.read().map_err(|_| lock_err("store.has_changes"))?;
        Ok(state.dirty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::entity::Relationship;
    use crate::value::Value;

    fn user() -> EntityType {
        EntityType::new("User")
    }

    #[test]
    fn test_insert_update_find_delete() {
        let store = InMemoryObjectStore::new();

        let mut e = store.insert(&user()).unwrap();
        e.set_attribute("remote_id", Value::Int(1));
        store.update(e.clone()).unwrap();

        let got = store.find_by_id(e.id).unwrap().unwrap();
        assert_eq!(got, e);

        let found = store
            .find_one(&user(), &Predicate::eq("remote_id", 1))
            .unwrap()
            .unwrap();
        assert_eq!(found.id, e.id);
        assert_eq!(store.count(&user(), &Predicate::all()).unwrap(), 1);

        store.delete(e.id).unwrap();
        assert!(store.find_by_id(e.id).unwrap().is_none());
        assert!(matches!(store.delete(e.id), Err(StoreError::NotFound(_))));
        assert!(matches!(store.update(e), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_queries_are_scoped_by_type_and_ordered_by_insertion() {
        let store = InMemoryObjectStore::new();
        let a = store.insert(&user()).unwrap();
        let _post = store.insert(&EntityType::new("Post")).unwrap();
        let b = store.insert(&user()).unwrap();

        let all = store.all_objects(&user()).unwrap();
        assert_eq!(all.iter().map(|e| e.id).collect::<Vec<_>>(), vec![a.id, b.id]);
        assert_eq!(store.len().unwrap(), 3);
    }

    #[test]
    fn test_update_cannot_change_type() {
        let store = InMemoryObjectStore::new();
        let mut e = store.insert(&user()).unwrap();
        e.entity_type = EntityType::new("Post");
        assert!(matches!(store.update(e), Err(StoreError::Backend(_))));
    }

    #[test]
    fn test_invalid_predicate_is_rejected() {
        let store = InMemoryObjectStore::new();
        assert!(matches!(
            store.find_many(&user(), &Predicate::eq("", 1)),
            Err(StoreError::InvalidPredicate(_))
        ));
    }

    #[test]
    fn test_rollback_discards_uncommitted_changes() {
        let store = InMemoryObjectStore::new();
        let kept = store.insert(&user()).unwrap();
        store.commit().unwrap();
        assert!(!store.has_changes().unwrap());

        let dropped = store.insert(&user()).unwrap();
        store.delete(kept.id).unwrap();
        assert!(store.has_changes().unwrap());

        store.rollback().unwrap();
        assert!(store.find_by_id(kept.id).unwrap().is_some());
        assert!(store.find_by_id(dropped.id).unwrap().is_none());
        assert!(!store.has_changes().unwrap());
    }

    #[test]
    fn test_delete_clears_relationship_references() {
        let store = InMemoryObjectStore::new();
        let member = store.insert(&user()).unwrap();
        let mut group = store.insert(&EntityType::new("Group")).unwrap();
        group.set_relationship("users", Relationship::Many(vec![member.id]));
        group.set_relationship("owner", Relationship::One(Some(member.id)));
        store.update(group.clone()).unwrap();

        store.delete(member.id).unwrap();
        let group = store.find_by_id(group.id).unwrap().unwrap();
        assert!(group.related_ids("users").is_empty());
        assert_eq!(group.relationship("owner"), Some(&Relationship::One(None)));
    }

    #[test]
    fn test_insert_entity_rejects_duplicate_id() {
        let store = InMemoryObjectStore::new();
        let e = Entity::new(user());
        store.insert_entity(e.clone()).unwrap();
        assert!(matches!(store.insert_entity(e), Err(StoreError::Backend(_))));
    }
}
