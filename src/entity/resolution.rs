//! Primary-key identity resolution.
//!
//! [`IdentityResolver`] maps a remote primary-key value onto the unique local
//! entity carrying it, creating the entity when none exists. One resolver is
//! used per mapping pass: it remembers every identity it has fixed during the
//! pass, so the same key never yields two entities even before the store sees
//! a commit.

use std::collections::HashMap;

use tracing::trace;

use crate::entity::{Entity, EntityType, LocalId};
use crate::mapping::MappingDescriptor;
use crate::storage::{ObjectStore, Predicate, StoreError};
use crate::value::Value;

/// Pass-scoped find-or-create over an [`ObjectStore`].
pub struct IdentityResolver<'a> {
    store: &'a dyn ObjectStore,
    resolved: HashMap<(EntityType, String), LocalId>,
}

impl<'a> IdentityResolver<'a> {
    #[must_use]
    pub fn new(store: &'a dyn ObjectStore) -> Self {
        Self {
            store,
            resolved: HashMap::new(),
        }
    }

    /// Finds the entity of the descriptor's type whose primary key equals
    /// `value`. Null never matches.
    pub fn find_by_primary_key(
        &self,
        descriptor: &MappingDescriptor,
        value: &Value,
    ) -> Result<Option<Entity>, StoreError> {
        if value.is_null() {
            return Ok(None);
        }
        let predicate = Predicate::eq(descriptor.local_primary_key(), value.clone());
        self.store.find_one(descriptor.entity_type(), &predicate)
    }

    /// Returns the entity for `remote_value`, inserting a new uncommitted one
    /// with its primary key set when none exists.
    ///
    /// # Errors
    /// - `StoreError::InvalidPredicate` if `remote_value` is null
    /// - any error surfaced by the store
    pub fn resolve_or_create(
        &mut self,
        descriptor: &MappingDescriptor,
        remote_value: &Value,
    ) -> Result<Entity, StoreError> {
        let Some(key) = remote_value.identity_key() else {
            return Err(StoreError::InvalidPredicate(format!(
                "{}: cannot resolve identity from a null primary key",
                descriptor.entity_type()
            )));
        };
        let cache_key = (descriptor.entity_type().clone(), key);

        if let Some(id) = self.resolved.get(&cache_key).copied() {
            if let Some(entity) = self.store.find_by_id(id)? {
                return Ok(entity);
            }
            // Deleted behind our back; fall through and resolve again.
            self.resolved.remove(&cache_key);
        }

        let entity = match self.find_by_primary_key(descriptor, remote_value)? {
            Some(existing) => existing,
            None => {
                let mut created = self.store.insert(descriptor.entity_type())?;
                created.set_attribute(descriptor.local_primary_key(), remote_value.clone());
                self.store.update(created.clone())?;
                trace!(
                    entity_type = %descriptor.entity_type(),
                    primary_key = %remote_value,
                    id = %created.id,
                    "created entity"
                );
                created
            }
        };

        self.resolved.insert(cache_key, entity.id);
        Ok(entity)
    }

    /// Number of identities fixed so far in this pass.
    #[must_use]
    pub fn resolved_count(&self) -> usize {
        self.resolved.len()
    }
}

/// Local identifiers of `entities`, in order.
#[must_use]
pub fn ids_of(entities: &[Entity]) -> Vec<LocalId> {
    entities.iter().map(|e| e.id).collect()
}

/// Re-hydrates entities from their identifiers, in order.
///
/// Identifiers that no longer resolve are skipped.
pub fn entities_of(store: &dyn ObjectStore, ids: &[LocalId]) -> Result<Vec<Entity>, StoreError> {
    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(entity) = store.find_by_id(*id)? {
            out.push(entity);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::storage::InMemoryObjectStore;
    use crate::value::AttributeKind;

    fn post_descriptor() -> MappingDescriptor {
        MappingDescriptor::builder("Post")
            .primary_key("remote_id", "id")
            .attribute("id", "remote_id", AttributeKind::Int)
            .build()
            .unwrap()
    }

    #[test]
    fn test_resolve_or_create_twice_returns_same_entity() {
        let store = InMemoryObjectStore::new();
        let descriptor = post_descriptor();
        let mut resolver = IdentityResolver::new(&store);

        let first = resolver.resolve_or_create(&descriptor, &Value::Int(7)).unwrap();
        let second = resolver.resolve_or_create(&descriptor, &Value::Int(7)).unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(store.count(descriptor.entity_type(), &Predicate::all()).unwrap(), 1);
        assert_eq!(resolver.resolved_count(), 1);
    }

    #[test]
    fn test_resolve_or_create_treats_integral_float_as_same_key() {
        let store = InMemoryObjectStore::new();
        let descriptor = post_descriptor();
        let mut resolver = IdentityResolver::new(&store);

        let a = resolver.resolve_or_create(&descriptor, &Value::Int(3)).unwrap();
        let b = resolver.resolve_or_create(&descriptor, &Value::Float(3.0)).unwrap();
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn test_resolve_or_create_finds_committed_entity() {
        let store = InMemoryObjectStore::new();
        let descriptor = post_descriptor();

        let existing = {
            let mut resolver = IdentityResolver::new(&store);
            resolver.resolve_or_create(&descriptor, &Value::Int(1)).unwrap()
        };
        store.commit().unwrap();

        let mut fresh = IdentityResolver::new(&store);
        let again = fresh.resolve_or_create(&descriptor, &Value::Int(1)).unwrap();
        assert_eq!(again.id, existing.id);
    }

    #[test]
    fn test_resolve_or_create_rejects_null() {
        let store = InMemoryObjectStore::new();
        let descriptor = post_descriptor();
        let mut resolver = IdentityResolver::new(&store);
        assert!(matches!(
            resolver.resolve_or_create(&descriptor, &Value::Null),
            Err(StoreError::InvalidPredicate(_))
        ));
    }

    #[test]
    fn test_find_by_primary_key_absent() {
        let store = InMemoryObjectStore::new();
        let descriptor = post_descriptor();
        let resolver = IdentityResolver::new(&store);
        assert!(resolver
            .find_by_primary_key(&descriptor, &Value::Int(99))
            .unwrap()
            .is_none());
        assert!(resolver
            .find_by_primary_key(&descriptor, &Value::Null)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_ids_and_entities_round_trip_skipping_missing() {
        let store = InMemoryObjectStore::new();
        let descriptor = post_descriptor();
        let mut resolver = IdentityResolver::new(&store);

        let a = resolver.resolve_or_create(&descriptor, &Value::Int(1)).unwrap();
        let b = resolver.resolve_or_create(&descriptor, &Value::Int(2)).unwrap();
        let ids = ids_of(&[a.clone(), b.clone()]);
        assert_eq!(ids, vec![a.id, b.id]);

        store.delete(a.id).unwrap();
        let back = entities_of(&store, &ids).unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].id, b.id);
    }

    #[test]
    fn test_deleted_cached_identity_is_recreated() {
        let store = InMemoryObjectStore::new();
        let descriptor = post_descriptor();
        let mut resolver = IdentityResolver::new(&store);

        let a = resolver.resolve_or_create(&descriptor, &Value::Int(5)).unwrap();
        store.delete(a.id).unwrap();

        let b = resolver.resolve_or_create(&descriptor, &Value::Int(5)).unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(b.attribute("remote_id"), Some(&Value::Int(5)));
    }
}
