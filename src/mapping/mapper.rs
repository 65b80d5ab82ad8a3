//! Attribute tree → entity mapping.
//!
//! The mapper walks a decoded payload under the direction of a
//! [`MappingDescriptor`]. Identity is always fixed first, from the remote
//! primary-key element, before any attribute is written. Nested elements
//! named by relationship paths are mapped recursively with the target
//! type's descriptor.
//!
//! Elements absent from the payload leave the corresponding attribute or
//! relationship untouched. A present to-many relationship replaces the prior
//! membership for this pass rather than merging with it.

use std::collections::BTreeMap;

use tracing::trace;

use crate::entity::{Entity, IdentityResolver, LocalId, Relationship};
use crate::error::{MappingError, SyncResult};
use crate::mapping::{
    AttributeNode, AttributeTree, Cardinality, MappingDescriptor, MappingRegistry, PayloadFormat,
};
use crate::storage::ObjectStore;
use crate::value::{AttributeKind, Value};

const ROOT_ELEMENT: &str = "<root>";

/// One mapping pass over one or more attribute trees.
///
/// All trees mapped by the same mapper share one identity scope, so a
/// primary key seen twice resolves to the same entity.
pub struct PayloadMapper<'a> {
    registry: &'a MappingRegistry,
    store: &'a dyn ObjectStore,
    resolver: IdentityResolver<'a>,
    unwrap_root: bool,
}

impl<'a> PayloadMapper<'a> {
    #[must_use]
    pub fn new(registry: &'a MappingRegistry, store: &'a dyn ObjectStore) -> Self {
        Self {
            registry,
            store,
            resolver: IdentityResolver::new(store),
            unwrap_root: true,
        }
    }

    /// Whether a single `{ "<model_name>": ... }` wrapper around the payload
    /// (or around each collection item) is stripped. Default: true.
    #[must_use]
    pub const fn unwrap_root(mut self, unwrap: bool) -> Self {
        self.unwrap_root = unwrap;
        self
    }

    /// Maps a tree holding a single record.
    ///
    /// # Errors
    /// - `MappingError::TypeMismatch` if the root is not an object
    /// - any mapping or store error raised while mapping the record
    pub fn map(&mut self, tree: &AttributeTree, descriptor: &MappingDescriptor) -> SyncResult<Entity> {
        let root = self.strip_root(&tree.root, descriptor, tree.format);
        match root {
            AttributeNode::Object(object) => self.map_object(object, descriptor, tree.format),
            other => Err(MappingError::TypeMismatch {
                entity_type: descriptor.entity_type().clone(),
                element: ROOT_ELEMENT.to_string(),
                expected: "object",
                actual: other.type_name(),
            }
            .into()),
        }
    }

    /// Maps a tree holding one record or a collection of records.
    ///
    /// Entities are returned in payload order without duplicates. A null
    /// root or an empty array yields no entities.
    pub fn map_collection(
        &mut self,
        tree: &AttributeTree,
        descriptor: &MappingDescriptor,
    ) -> SyncResult<Vec<Entity>> {
        let root = self.strip_root(&tree.root, descriptor, tree.format);
        let items: Vec<&AttributeNode> = match root {
            AttributeNode::Array(items) => items.iter().collect(),
            AttributeNode::Scalar(Value::Null) => Vec::new(),
            other => vec![other],
        };

        let mut entities: Vec<Entity> = Vec::with_capacity(items.len());
        for item in items {
            let item = self.strip_root(item, descriptor, tree.format);
            let entity = match item {
                AttributeNode::Object(object) => self.map_object(object, descriptor, tree.format)?,
                other => {
                    return Err(MappingError::TypeMismatch {
                        entity_type: descriptor.entity_type().clone(),
                        element: ROOT_ELEMENT.to_string(),
                        expected: "object",
                        actual: other.type_name(),
                    }
                    .into())
                }
            };
            match entities.iter_mut().find(|e| e.id == entity.id) {
                Some(existing) => *existing = entity,
                None => entities.push(entity),
            }
        }

        trace!(
            entity_type = %descriptor.entity_type(),
            mapped = entities.len(),
            resolved = self.resolver.resolved_count(),
            "mapped collection"
        );
        Ok(entities)
    }

    fn strip_root<'n>(
        &self,
        node: &'n AttributeNode,
        descriptor: &MappingDescriptor,
        format: PayloadFormat,
    ) -> &'n AttributeNode {
        if !self.unwrap_root {
            return node;
        }
        let Some(model_name) = descriptor.model_name() else {
            return node;
        };
        let key = descriptor.format_element_name(model_name, format);
        match node.as_object() {
            Some(map) if map.len() == 1 => map
                .get(&key)
                .filter(|inner| !matches!(inner, AttributeNode::Scalar(_)))
                .unwrap_or(node),
            _ => node,
        }
    }

    fn map_object(
        &mut self,
        object: &BTreeMap<String, AttributeNode>,
        descriptor: &MappingDescriptor,
        format: PayloadFormat,
    ) -> SyncResult<Entity> {
        let primary_key = self.primary_key_of(object, descriptor, format)?;
        let mut entity = self.resolver.resolve_or_create(descriptor, &primary_key)?;

        for (element, mapping) in descriptor.attribute_mappings() {
            let key = descriptor.format_element_name(element, format);
            let Some(node) = object.get(&key) else {
                continue;
            };
            let value = match node {
                AttributeNode::Scalar(v) => mapping.kind.coerce(v.clone()),
                other if mapping.kind == AttributeKind::Json => Ok(Value::Json(other.to_json())),
                other => Err(other.type_name()),
            }
            .map_err(|actual| MappingError::TypeMismatch {
                entity_type: descriptor.entity_type().clone(),
                element: key.clone(),
                expected: mapping.kind.name(),
                actual,
            })?;
            entity.set_attribute(mapping.attribute.clone(), value);
        }

        let registry = self.registry;
        for (path, mapping) in descriptor.relationship_mappings() {
            let segments: Vec<String> = mapping
                .segments
                .iter()
                .map(|s| descriptor.format_element_name(s, format))
                .collect();
            let Some(first) = object.get(&segments[0]) else {
                continue;
            };
            let target = registry.descriptor(&mapping.target)?;

            let relationship = match mapping.cardinality {
                Cardinality::One => {
                    let related = match first {
                        AttributeNode::Scalar(Value::Null) => None,
                        AttributeNode::Scalar(reference) => {
                            Some(self.resolve_reference(target, reference, path)?)
                        }
                        AttributeNode::Object(nested) => {
                            Some(self.map_object(nested, target, format)?.id)
                        }
                        AttributeNode::Array(_) => {
                            return Err(MappingError::MalformedRelationship {
                                entity_type: descriptor.entity_type().clone(),
                                path: path.clone(),
                                reason: "expected a single element, found an array".to_string(),
                            }
                            .into());
                        }
                    };
                    Relationship::One(related)
                }
                Cardinality::Many => {
                    let mut ids: Vec<LocalId> = Vec::new();
                    for node in first.select(&segments[1..]) {
                        let id = match node {
                            AttributeNode::Object(nested) => self.map_object(nested, target, format)?.id,
                            AttributeNode::Scalar(Value::Null) => continue,
                            AttributeNode::Scalar(reference) => {
                                self.resolve_reference(target, reference, path)?
                            }
                            AttributeNode::Array(_) => continue,
                        };
                        if !ids.contains(&id) {
                            ids.push(id);
                        }
                    }
                    Relationship::Many(ids)
                }
            };
            entity.set_relationship(mapping.relationship.clone(), relationship);
        }

        self.store.update(entity.clone())?;
        Ok(entity)
    }

    fn primary_key_of(
        &self,
        object: &BTreeMap<String, AttributeNode>,
        descriptor: &MappingDescriptor,
        format: PayloadFormat,
    ) -> SyncResult<Value> {
        let element = descriptor.format_element_name(descriptor.remote_primary_key(), format);
        let kind = descriptor.primary_key_kind();
        let missing = || MappingError::MissingPrimaryKey {
            entity_type: descriptor.entity_type().clone(),
            field: element.clone(),
        };

        let value = match object.get(&element) {
            None => return Err(missing().into()),
            Some(AttributeNode::Scalar(v)) if v.is_null() => return Err(missing().into()),
            Some(AttributeNode::Scalar(v)) => kind.coerce(v.clone()),
            Some(other) => Err(other.type_name()),
        };
        value.map_err(|actual| {
            MappingError::TypeMismatch {
                entity_type: descriptor.entity_type().clone(),
                element: element.clone(),
                expected: if kind == AttributeKind::Any { "scalar" } else { kind.name() },
                actual,
            }
            .into()
        })
    }

    /// A bare scalar in relationship position is a primary-key reference.
    fn resolve_reference(
        &mut self,
        target: &MappingDescriptor,
        reference: &Value,
        path: &str,
    ) -> SyncResult<LocalId> {
        let kind = target.primary_key_kind();
        let key = kind.coerce(reference.clone()).map_err(|actual| {
            MappingError::TypeMismatch {
                entity_type: target.entity_type().clone(),
                element: path.to_string(),
                expected: kind.name(),
                actual,
            }
        })?;
        Ok(self.resolver.resolve_or_create(target, &key)?.id)
    }
}
