//! Entity types and local identity.
//!
//! An [`Entity`] is the locally persisted form of a remote record. Its
//! [`LocalId`] is assigned by the store and is the only handle that survives
//! across load cycles; the business primary key lives among its attributes
//! under the name chosen by the entity type's mapping descriptor.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::mapping::{MappingDescriptor, PayloadFormat};
use crate::value::Value;

/// Store-assigned, opaque entity identifier.
///
/// Never reused after the entity it names has been deleted.
///
/// # Examples
///
/// ```
/// use modelsync::LocalId;
///
/// let id = LocalId::new();
/// assert!(!id.is_nil());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalId(Uuid);

impl LocalId {
    /// Creates a new random local ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a local ID from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Returns true if this is a nil (all zeros) UUID.
    #[must_use]
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for LocalId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for LocalId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Name of an entity type, e.g. `"User"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityType(String);

impl EntityType {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityType {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for EntityType {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Membership of a named relationship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "ids", rename_all = "snake_case")]
pub enum Relationship {
    /// To-one; `None` when explicitly cleared.
    One(Option<LocalId>),
    /// To-many, in payload order, without duplicates.
    Many(Vec<LocalId>),
}

impl Relationship {
    /// All referenced IDs.
    #[must_use]
    pub fn ids(&self) -> Vec<LocalId> {
        match self {
            Self::One(id) => id.iter().copied().collect(),
            Self::Many(ids) => ids.clone(),
        }
    }

    #[must_use]
    pub fn contains(&self, id: LocalId) -> bool {
        match self {
            Self::One(current) => *current == Some(id),
            Self::Many(ids) => ids.contains(&id),
        }
    }

    /// Drops references to `id`. Returns true if anything changed.
    pub fn remove(&mut self, id: LocalId) -> bool {
        match self {
            Self::One(current) if *current == Some(id) => {
                *current = None;
                true
            }
            Self::One(_) => false,
            Self::Many(ids) => {
                let before = ids.len();
                ids.retain(|x| *x != id);
                ids.len() != before
            }
        }
    }
}

/// A typed, locally persisted record.
///
/// # Examples
///
/// ```
/// use modelsync::{Entity, EntityType, Value};
///
/// let mut user = Entity::new(EntityType::new("User"));
/// user.set_attribute("name", Value::from("alice"));
/// assert_eq!(user.attribute("name"), Some(&Value::from("alice")));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Store-assigned identifier.
    pub id: LocalId,

    /// Which mapping descriptor governs this entity.
    pub entity_type: EntityType,

    /// Scalar attributes keyed by local attribute name.
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,

    /// Relationships keyed by local relationship name.
    #[serde(default)]
    pub relationships: BTreeMap<String, Relationship>,
}

impl Entity {
    /// Creates an empty entity with a fresh local ID.
    #[must_use]
    pub fn new(entity_type: EntityType) -> Self {
        Self::with_id(LocalId::new(), entity_type)
    }

    #[must_use]
    pub fn with_id(id: LocalId, entity_type: EntityType) -> Self {
        Self {
            id,
            entity_type,
            attributes: BTreeMap::new(),
            relationships: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, value: Value) {
        self.attributes.insert(name.into(), value);
    }

    #[must_use]
    pub fn relationship(&self, name: &str) -> Option<&Relationship> {
        self.relationships.get(name)
    }

    pub fn set_relationship(&mut self, name: impl Into<String>, relationship: Relationship) {
        self.relationships.insert(name.into(), relationship);
    }

    /// IDs referenced by a relationship; empty when unset.
    #[must_use]
    pub fn related_ids(&self, name: &str) -> Vec<LocalId> {
        self.relationships
            .get(name)
            .map(Relationship::ids)
            .unwrap_or_default()
    }

    /// The primary-key value under the descriptor's local primary key field.
    ///
    /// Returns `None` when unset or null (not yet synced).
    #[must_use]
    pub fn primary_key(&self, descriptor: &MappingDescriptor) -> Option<&Value> {
        self.attributes
            .get(descriptor.local_primary_key())
            .filter(|v| !v.is_null())
    }

    /// Projects mapped attributes back onto formatted remote element names.
    ///
    /// Only attributes the entity actually holds are included. Used to build
    /// outgoing request bodies.
    #[must_use]
    pub fn property_values_by_element(
        &self,
        descriptor: &MappingDescriptor,
        format: PayloadFormat,
    ) -> BTreeMap<String, Value> {
        descriptor
            .attribute_mappings()
            .filter_map(|(element, mapping)| {
                self.attributes
                    .get(&mapping.attribute)
                    .map(|v| (descriptor.format_element_name(element, format), v.clone()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::AttributeKind;

    fn user_descriptor() -> MappingDescriptor {
        MappingDescriptor::builder("User")
            .primary_key("remote_id", "id")
            .attribute("id", "remote_id", AttributeKind::Int)
            .attribute("first_name", "first_name", AttributeKind::String)
            .build()
            .unwrap()
    }

    #[test]
    fn test_local_id_unique() {
        assert_ne!(LocalId::new(), LocalId::new());
    }

    #[test]
    fn test_relationship_remove() {
        let a = LocalId::new();
        let b = LocalId::new();

        let mut many = Relationship::Many(vec![a, b]);
        assert!(many.remove(a));
        assert!(!many.remove(a));
        assert_eq!(many.ids(), vec![b]);

        let mut one = Relationship::One(Some(b));
        assert!(one.contains(b));
        assert!(one.remove(b));
        assert_eq!(one, Relationship::One(None));
    }

    #[test]
    fn test_primary_key_ignores_null() {
        let descriptor = user_descriptor();
        let mut user = Entity::new(EntityType::new("User"));
        assert!(user.primary_key(&descriptor).is_none());

        user.set_attribute("remote_id", Value::Null);
        assert!(user.primary_key(&descriptor).is_none());

        user.set_attribute("remote_id", Value::Int(9));
        assert_eq!(user.primary_key(&descriptor), Some(&Value::Int(9)));
    }

    #[test]
    fn test_property_values_by_element_formats_names() {
        let descriptor = user_descriptor();
        let mut user = Entity::new(EntityType::new("User"));
        user.set_attribute("remote_id", Value::Int(1));
        user.set_attribute("first_name", Value::from("Blake"));

        let xml = user.property_values_by_element(&descriptor, PayloadFormat::Xml);
        assert_eq!(xml.get("first-name"), Some(&Value::from("Blake")));
        assert_eq!(xml.get("id"), Some(&Value::Int(1)));

        let json = user.property_values_by_element(&descriptor, PayloadFormat::Json);
        assert_eq!(json.get("first_name"), Some(&Value::from("Blake")));
    }

    #[test]
    fn test_entity_serde_roundtrip() {
        let mut e = Entity::new(EntityType::new("Post"));
        e.set_attribute("title", Value::from("hello"));
        e.set_relationship("author", Relationship::One(Some(LocalId::new())));
        let json = serde_json::to_string(&e).unwrap();
        let back: Entity = serde_json::from_str(&json).unwrap();
        assert_eq!(back, e);
    }
}
