//! Declarative per-type mapping descriptors.
//!
//! A [`MappingDescriptor`] is the immutable contract between a remote payload
//! shape and a local entity type: which element carries the primary key,
//! which elements map to attributes, and which element paths map to
//! relationships.

use std::collections::{BTreeMap, HashSet};

use convert_case::{Boundary, Case, Casing};

use crate::entity::EntityType;
use crate::error::MappingError;
use crate::mapping::PayloadFormat;
use crate::value::AttributeKind;

/// Separator between segments of a relationship element path.
pub const PATH_SEPARATOR: char = '>';

/// Word boundaries for element names. Digits stay attached to the word they
/// follow, so `address_line2` keeps its shape in both encodings.
const ELEMENT_WORD_BOUNDARIES: [Boundary; 6] = [
    Boundary::Underscore,
    Boundary::Hyphen,
    Boundary::Space,
    Boundary::LowerUpper,
    Boundary::DigitUpper,
    Boundary::Acronym,
];

/// Formats a raw element name for a payload encoding. Must be pure.
pub type ElementNameFormatter = fn(&str, PayloadFormat) -> String;

/// Default element naming: dasherized for XML, underscored for JSON.
///
/// # Examples
///
/// ```
/// use modelsync::mapping::{format_element_name, PayloadFormat};
///
/// assert_eq!(format_element_name("first_name", PayloadFormat::Xml), "first-name");
/// assert_eq!(format_element_name("first-name", PayloadFormat::Json), "first_name");
/// assert_eq!(format_element_name("address_line2", PayloadFormat::Xml), "address-line2");
/// ```
#[must_use]
pub fn format_element_name(name: &str, format: PayloadFormat) -> String {
    match format {
        PayloadFormat::Xml => name
            .set_boundaries(&ELEMENT_WORD_BOUNDARIES)
            .to_case(Case::Kebab),
        PayloadFormat::Json => name
            .set_boundaries(&ELEMENT_WORD_BOUNDARIES)
            .to_case(Case::Snake),
    }
}

/// Target of a remote element on the local side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeMapping {
    /// Local attribute name.
    pub attribute: String,
    /// Declared shape; decoded values are coerced into it.
    pub kind: AttributeKind,
}

/// How many entities a relationship holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    One,
    Many,
}

/// Target of a relationship element path on the local side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipMapping {
    /// Local relationship name.
    pub relationship: String,
    /// Entity type of the related records.
    pub target: EntityType,
    pub cardinality: Cardinality,
    /// Raw path segments, outermost first.
    pub segments: Vec<String>,
}

/// Immutable mapping contract for one entity type.
///
/// # Examples
///
/// ```
/// use modelsync::mapping::MappingDescriptor;
/// use modelsync::AttributeKind;
///
/// let group = MappingDescriptor::builder("Group")
///     .model_name("group")
///     .attribute("id", "remote_id", AttributeKind::Int)
///     .attribute("name", "name", AttributeKind::String)
///     .has_many("memberships > user", "users", "User")
///     .build()
///     .unwrap();
///
/// assert_eq!(group.remote_primary_key(), "id");
/// assert_eq!(group.element_names(), vec!["id", "name"]);
/// ```
#[derive(Debug, Clone)]
pub struct MappingDescriptor {
    entity_type: EntityType,
    model_name: Option<String>,
    local_primary_key: String,
    remote_primary_key: String,
    attributes: BTreeMap<String, AttributeMapping>,
    relationships: BTreeMap<String, RelationshipMapping>,
    formatter: ElementNameFormatter,
}

impl MappingDescriptor {
    /// Default local primary-key attribute.
    pub const DEFAULT_LOCAL_PRIMARY_KEY: &'static str = "remote_id";

    /// Default remote primary-key element.
    pub const DEFAULT_REMOTE_PRIMARY_KEY: &'static str = "id";

    pub fn builder(entity_type: impl Into<EntityType>) -> MappingDescriptorBuilder {
        MappingDescriptorBuilder::new(entity_type.into())
    }

    #[must_use]
    pub const fn entity_type(&self) -> &EntityType {
        &self.entity_type
    }

    /// Remote name of the model, used as the root element of wrapped payloads.
    #[must_use]
    pub fn model_name(&self) -> Option<&str> {
        self.model_name.as_deref()
    }

    #[must_use]
    pub fn local_primary_key(&self) -> &str {
        &self.local_primary_key
    }

    #[must_use]
    pub fn remote_primary_key(&self) -> &str {
        &self.remote_primary_key
    }

    /// Declared kind of the primary key, `Any` unless the remote primary-key
    /// element is also listed as an attribute.
    #[must_use]
    pub fn primary_key_kind(&self) -> AttributeKind {
        self.attributes
            .get(&self.remote_primary_key)
            .map_or(AttributeKind::Any, |m| m.kind)
    }

    /// Remote element → local attribute, sorted by element name.
    pub fn attribute_mappings(&self) -> impl Iterator<Item = (&String, &AttributeMapping)> {
        self.attributes.iter()
    }

    /// Remote element path → local relationship, sorted by path.
    pub fn relationship_mappings(&self) -> impl Iterator<Item = (&String, &RelationshipMapping)> {
        self.relationships.iter()
    }

    /// Remote element names of every mapped attribute.
    #[must_use]
    pub fn element_names(&self) -> Vec<&str> {
        self.attributes.keys().map(String::as_str).collect()
    }

    /// Local attribute names of every mapped attribute.
    #[must_use]
    pub fn property_names(&self) -> Vec<&str> {
        self.attributes.values().map(|m| m.attribute.as_str()).collect()
    }

    #[must_use]
    pub fn format_element_name(&self, name: &str, format: PayloadFormat) -> String {
        (self.formatter)(name, format)
    }
}

/// Builder for [`MappingDescriptor`].
#[derive(Debug, Clone)]
pub struct MappingDescriptorBuilder {
    entity_type: EntityType,
    model_name: Option<String>,
    local_primary_key: String,
    remote_primary_key: String,
    attributes: Vec<(String, AttributeMapping)>,
    relationships: Vec<(String, String, EntityType, Cardinality)>,
    formatter: ElementNameFormatter,
}

impl MappingDescriptorBuilder {
    fn new(entity_type: EntityType) -> Self {
        Self {
            entity_type,
            model_name: None,
            local_primary_key: MappingDescriptor::DEFAULT_LOCAL_PRIMARY_KEY.to_string(),
            remote_primary_key: MappingDescriptor::DEFAULT_REMOTE_PRIMARY_KEY.to_string(),
            attributes: Vec::new(),
            relationships: Vec::new(),
            formatter: format_element_name,
        }
    }

    #[must_use]
    pub fn model_name(mut self, name: impl Into<String>) -> Self {
        self.model_name = Some(name.into());
        self
    }

    /// Set the local attribute and remote element that carry identity.
    #[must_use]
    pub fn primary_key(mut self, local: impl Into<String>, remote: impl Into<String>) -> Self {
        self.local_primary_key = local.into();
        self.remote_primary_key = remote.into();
        self
    }

    /// Map remote `element` onto local `attribute`.
    #[must_use]
    pub fn attribute(
        mut self,
        element: impl Into<String>,
        attribute: impl Into<String>,
        kind: AttributeKind,
    ) -> Self {
        self.attributes.push((
            element.into(),
            AttributeMapping {
                attribute: attribute.into(),
                kind,
            },
        ));
        self
    }

    /// Map a single nested `element` onto to-one `relationship`.
    #[must_use]
    pub fn has_one(
        mut self,
        element: impl Into<String>,
        relationship: impl Into<String>,
        target: impl Into<EntityType>,
    ) -> Self {
        self.relationships.push((
            element.into(),
            relationship.into(),
            target.into(),
            Cardinality::One,
        ));
        self
    }

    /// Map every element reached by `path` (e.g. `"memberships > user"`)
    /// onto to-many `relationship`.
    #[must_use]
    pub fn has_many(
        mut self,
        path: impl Into<String>,
        relationship: impl Into<String>,
        target: impl Into<EntityType>,
    ) -> Self {
        self.relationships.push((
            path.into(),
            relationship.into(),
            target.into(),
            Cardinality::Many,
        ));
        self
    }

    #[must_use]
    pub fn formatter(mut self, formatter: ElementNameFormatter) -> Self {
        self.formatter = formatter;
        self
    }

    /// Validates and freezes the descriptor.
    ///
    /// # Errors
    /// `MappingError::InvalidDescriptor` for empty or duplicate names, and
    /// `MappingError::MalformedRelationship` for unusable relationship paths.
    pub fn build(self) -> Result<MappingDescriptor, MappingError> {
        let entity_type = self.entity_type;
        let invalid = |reason: String| MappingError::InvalidDescriptor {
            entity_type: entity_type.clone(),
            reason,
        };

        if entity_type.as_str().trim().is_empty() {
            return Err(invalid("entity type cannot be empty".to_string()));
        }
        if self.local_primary_key.trim().is_empty() || self.remote_primary_key.trim().is_empty() {
            return Err(invalid("primary key names cannot be empty".to_string()));
        }

        let mut attributes = BTreeMap::new();
        let mut locals = HashSet::new();
        for (element, mapping) in self.attributes {
            if element.trim().is_empty() || mapping.attribute.trim().is_empty() {
                return Err(invalid("attribute names cannot be empty".to_string()));
            }
            if !locals.insert(mapping.attribute.clone()) {
                return Err(invalid(format!(
                    "attribute '{}' is mapped more than once",
                    mapping.attribute
                )));
            }
            if attributes.insert(element.clone(), mapping).is_some() {
                return Err(invalid(format!("element '{element}' is mapped more than once")));
            }
        }

        let mut relationships = BTreeMap::new();
        let mut relationship_names = HashSet::new();
        for (path, relationship, target, cardinality) in self.relationships {
            let segments = parse_path(&path).ok_or_else(|| MappingError::MalformedRelationship {
                entity_type: entity_type.clone(),
                path: path.clone(),
                reason: "path segments cannot be empty".to_string(),
            })?;
            if cardinality == Cardinality::One && segments.len() > 1 {
                return Err(MappingError::MalformedRelationship {
                    entity_type: entity_type.clone(),
                    path,
                    reason: "multi-segment paths map to-many relationships only".to_string(),
                });
            }
            if relationship.trim().is_empty() {
                return Err(invalid("relationship names cannot be empty".to_string()));
            }
            if locals.contains(&relationship) || !relationship_names.insert(relationship.clone()) {
                return Err(invalid(format!(
                    "relationship '{relationship}' collides with another mapping"
                )));
            }
            let key = segments.join(" > ");
            let mapping = RelationshipMapping {
                relationship,
                target,
                cardinality,
                segments,
            };
            if relationships.insert(key.clone(), mapping).is_some() {
                return Err(invalid(format!("path '{key}' is mapped more than once")));
            }
        }

        Ok(MappingDescriptor {
            entity_type,
            model_name: self.model_name,
            local_primary_key: self.local_primary_key,
            remote_primary_key: self.remote_primary_key,
            attributes,
            relationships,
            formatter: self.formatter,
        })
    }
}

/// Splits `"a > b"` into `["a", "b"]`. `None` if any segment is blank.
#[must_use]
pub fn parse_path(path: &str) -> Option<Vec<String>> {
    let segments: Vec<String> = path
        .split(PATH_SEPARATOR)
        .map(|s| s.trim().to_string())
        .collect();
    if segments.iter().any(String::is_empty) {
        return None;
    }
    Some(segments)
}
