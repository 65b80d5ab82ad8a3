//! Generic attribute trees decoded from payloads.

use std::collections::BTreeMap;

use crate::mapping::PayloadFormat;
use crate::value::Value;

/// One node of a decoded payload.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeNode {
    Scalar(Value),
    Object(BTreeMap<String, AttributeNode>),
    /// Repeated elements (JSON arrays, repeated XML children).
    Array(Vec<AttributeNode>),
}

impl AttributeNode {
    /// Shape name used in type-mismatch errors.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Scalar(v) => v.type_name(),
            Self::Object(_) => "object",
            Self::Array(_) => "array",
        }
    }

    #[must_use]
    pub const fn as_object(&self) -> Option<&BTreeMap<String, Self>> {
        match self {
            Self::Object(map) => Some(map),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Scalar(Value::Null))
    }

    /// Child element of an object node.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Self> {
        self.as_object().and_then(|map| map.get(key))
    }

    /// Every node reached by following `segments` from this node.
    ///
    /// Arrays are flattened before each step and in the result, so
    /// `["memberships", "user"]` reaches the `user` of every membership
    /// whether `memberships` is one object or many.
    #[must_use]
    pub fn select<S: AsRef<str>>(&self, segments: &[S]) -> Vec<&Self> {
        let mut current = vec![self];
        for segment in segments {
            let mut next = Vec::new();
            for node in flatten(current) {
                if let Some(child) = node.get(segment.as_ref()) {
                    next.push(child);
                }
            }
            current = next;
        }
        flatten(current)
    }

    /// Converts back into a JSON document.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Scalar(v) => v.to_json(),
            Self::Object(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            Self::Array(items) => serde_json::Value::Array(items.iter().map(Self::to_json).collect()),
        }
    }

    /// Builds a tree from a JSON document.
    #[must_use]
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Object(map) => Self::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Self::from_json(v)))
                    .collect(),
            ),
            serde_json::Value::Array(items) => Self::Array(items.iter().map(Self::from_json).collect()),
            scalar => Self::Scalar(Value::from_json(scalar)),
        }
    }
}

fn flatten(nodes: Vec<&AttributeNode>) -> Vec<&AttributeNode> {
    let mut out = Vec::with_capacity(nodes.len());
    let mut stack: Vec<&AttributeNode> = nodes.into_iter().rev().collect();
    while let Some(node) = stack.pop() {
        match node {
            AttributeNode::Array(items) => stack.extend(items.iter().rev()),
            other => out.push(other),
        }
    }
    out
}

/// A decoded payload together with the encoding it came from.
///
/// The encoding decides how descriptor element names are formatted when the
/// tree is mapped.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeTree {
    pub format: PayloadFormat,
    pub root: AttributeNode,
}

impl AttributeTree {
    #[must_use]
    pub const fn new(format: PayloadFormat, root: AttributeNode) -> Self {
        Self { format, root }
    }

    /// A JSON-format tree built from a `serde_json` document.
    #[must_use]
    pub fn from_json(value: &serde_json::Value) -> Self {
        Self::new(PayloadFormat::Json, AttributeNode::from_json(value))
    }

    /// An empty collection, as produced by an empty response body.
    #[must_use]
    pub const fn empty(format: PayloadFormat) -> Self {
        Self::new(format, AttributeNode::Array(Vec::new()))
    }
}
