//! Process-wide descriptor registry.
//!
//! Descriptors are registered explicitly at startup, validated as a whole,
//! and then shared read-only (typically behind an `Arc`) by every load cycle.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::cache::{EmptyObjectCache, ObjectCache};
use crate::entity::EntityType;
use crate::error::MappingError;
use crate::mapping::MappingDescriptor;

struct Registration {
    descriptor: Arc<MappingDescriptor>,
    cache: Arc<dyn ObjectCache>,
}

/// Read-only lookup of mapping descriptors and object caches by entity type.
pub struct MappingRegistry {
    entries: HashMap<EntityType, Registration>,
}

impl MappingRegistry {
    #[must_use]
    pub fn builder() -> MappingRegistryBuilder {
        MappingRegistryBuilder::default()
    }

    /// Descriptor for `entity_type`.
    ///
    /// # Errors
    /// `MappingError::UnregisteredEntityType` if none was registered.
    pub fn descriptor(&self, entity_type: &EntityType) -> Result<&MappingDescriptor, MappingError> {
        self.entries
            .get(entity_type)
            .map(|r| r.descriptor.as_ref())
            .ok_or_else(|| MappingError::UnregisteredEntityType(entity_type.clone()))
    }

    /// Shared handle to the descriptor for `entity_type`.
    pub fn descriptor_arc(
        &self,
        entity_type: &EntityType,
    ) -> Result<Arc<MappingDescriptor>, MappingError> {
        self.entries
            .get(entity_type)
            .map(|r| Arc::clone(&r.descriptor))
            .ok_or_else(|| MappingError::UnregisteredEntityType(entity_type.clone()))
    }

    /// Object cache for `entity_type`; [`EmptyObjectCache`] when unregistered.
    #[must_use]
    pub fn object_cache(&self, entity_type: &EntityType) -> Arc<dyn ObjectCache> {
        self.entries
            .get(entity_type)
            .map_or_else(|| Arc::new(EmptyObjectCache) as Arc<dyn ObjectCache>, |r| {
                Arc::clone(&r.cache)
            })
    }

    #[must_use]
    pub fn contains(&self, entity_type: &EntityType) -> bool {
        self.entries.contains_key(entity_type)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for MappingRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<&EntityType> = self.entries.keys().collect();
        types.sort();
        f.debug_struct("MappingRegistry").field("types", &types).finish()
    }
}

/// Builder for [`MappingRegistry`].
#[derive(Default)]
pub struct MappingRegistryBuilder {
    entries: Vec<(MappingDescriptor, Arc<dyn ObjectCache>)>,
}

impl MappingRegistryBuilder {
    /// Registers a descriptor with the empty object cache.
    #[must_use]
    pub fn register(self, descriptor: MappingDescriptor) -> Self {
        self.register_with_cache(descriptor, Arc::new(EmptyObjectCache))
    }

    /// Registers a descriptor together with its resource-path cache strategy.
    #[must_use]
    pub fn register_with_cache(
        mut self,
        descriptor: MappingDescriptor,
        cache: Arc<dyn ObjectCache>,
    ) -> Self {
        self.entries.push((descriptor, cache));
        self
    }

    /// Freezes the registry.
    ///
    /// # Errors
    /// - `MappingError::InvalidDescriptor` if a type is registered twice
    /// - `MappingError::MalformedRelationship` if a relationship targets an
    ///   unregistered type
    pub fn build(self) -> Result<MappingRegistry, MappingError> {
        let mut entries = HashMap::with_capacity(self.entries.len());
        for (descriptor, cache) in self.entries {
            let entity_type = descriptor.entity_type().clone();
            if entries.contains_key(&entity_type) {
                return Err(MappingError::InvalidDescriptor {
                    entity_type,
                    reason: "registered more than once".to_string(),
                });
            }
            entries.insert(
                entity_type,
                Registration {
                    descriptor: Arc::new(descriptor),
                    cache,
                },
            );
        }

        for registration in entries.values() {
            let descriptor = &registration.descriptor;
            for (path, mapping) in descriptor.relationship_mappings() {
                if !entries.contains_key(&mapping.target) {
                    return Err(MappingError::MalformedRelationship {
                        entity_type: descriptor.entity_type().clone(),
                        path: path.clone(),
                        reason: format!("target type '{}' is not registered", mapping.target),
                    });
                }
            }
        }

        debug!(types = entries.len(), "mapping registry built");
        Ok(MappingRegistry { entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::cache::RoutedObjectCache;
    use crate::storage::{InMemoryObjectStore, Predicate};
    use crate::value::AttributeKind;

    fn user() -> MappingDescriptor {
        MappingDescriptor::builder("User")
            .attribute("id", "remote_id", AttributeKind::Int)
            .build()
            .unwrap()
    }

    fn group() -> MappingDescriptor {
        MappingDescriptor::builder("Group")
            .attribute("id", "remote_id", AttributeKind::Int)
            .has_many("memberships > user", "users", "User")
            .build()
            .unwrap()
    }

    #[test]
    fn test_lookup_registered_descriptor() {
        let registry = MappingRegistry::builder()
            .register(user())
            .register(group())
            .build()
            .unwrap();
        assert_eq!(registry.len(), 2);
        assert!(registry.contains(&EntityType::new("User")));
        assert_eq!(
            registry.descriptor(&EntityType::new("Group")).unwrap().entity_type(),
            &EntityType::new("Group")
        );
    }

    #[test]
    fn test_unknown_type_errors() {
        let registry = MappingRegistry::builder().register(user()).build().unwrap();
        assert!(matches!(
            registry.descriptor(&EntityType::new("Ghost")),
            Err(MappingError::UnregisteredEntityType(_))
        ));
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let err = MappingRegistry::builder()
            .register(user())
            .register(user())
            .build()
            .unwrap_err();
        assert!(matches!(err, MappingError::InvalidDescriptor { .. }));
    }

    #[test]
    fn test_dangling_relationship_target_rejected() {
        let err = MappingRegistry::builder().register(group()).build().unwrap_err();
        assert!(matches!(err, MappingError::MalformedRelationship { .. }));
    }

    #[test]
    fn test_object_cache_defaults_to_empty() {
        let cache = Arc::new(
            RoutedObjectCache::new("User")
                .route("/users", |_| Predicate::all())
                .unwrap(),
        );
        let registry = MappingRegistry::builder()
            .register_with_cache(user(), cache)
            .build()
            .unwrap();

        let store = InMemoryObjectStore::new();
        crate::storage::ObjectStore::insert(&store, &EntityType::new("User")).unwrap();

        let user_cache = registry.object_cache(&EntityType::new("User"));
        assert_eq!(
            user_cache.objects_for_resource_path("/users", &store).unwrap().len(),
            1
        );

        let other = registry.object_cache(&EntityType::new("Group"));
        assert!(other.objects_for_resource_path("/users", &store).unwrap().is_empty());
    }
}
