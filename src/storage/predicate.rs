//! Typed query predicates.
//!
//! Predicates are plain data so any backend can translate them into its own
//! query language; [`Predicate::matches`] is the reference evaluation.

use serde::{Deserialize, Serialize};

use crate::entity::{Entity, LocalId};
use crate::storage::StoreError;
use crate::value::Value;

/// Filter over entities of a single type.
///
/// # Examples
///
/// ```
/// use modelsync::{Predicate, Value};
///
/// let p = Predicate::eq("user_id", Value::Int(42)).and(Predicate::eq("draft", Value::Bool(false)));
/// assert!(p.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Predicate {
    /// Matches everything.
    All,
    /// Attribute equals value (numeric-aware, see [`Value::equivalent`]).
    Eq { attribute: String, value: Value },
    /// Relationship references the given entity.
    RelatedTo { relationship: String, id: LocalId },
    And { all: Vec<Predicate> },
    Or { any: Vec<Predicate> },
    Not { inner: Box<Predicate> },
}

impl Predicate {
    #[must_use]
    pub const fn all() -> Self {
        Self::All
    }

    #[must_use]
    pub fn eq(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    #[must_use]
    pub fn related_to(relationship: impl Into<String>, id: LocalId) -> Self {
        Self::RelatedTo {
            relationship: relationship.into(),
            id,
        }
    }

    /// Conjunction; flattens nested `And`s.
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        match (self, other) {
            (Self::All, p) | (p, Self::All) => p,
            (Self::And { mut all }, Self::And { all: rest }) => {
                all.extend(rest);
                Self::And { all }
            }
            (Self::And { mut all }, p) => {
                all.push(p);
                Self::And { all }
            }
            (p, q) => Self::And { all: vec![p, q] },
        }
    }

    #[must_use]
    pub fn or(self, other: Self) -> Self {
        match (self, other) {
            (Self::Or { mut any }, p) => {
                any.push(p);
                Self::Or { any }
            }
            (p, q) => Self::Or { any: vec![p, q] },
        }
    }

    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Self::Not {
            inner: Box::new(self),
        }
    }

    /// Rejects predicates no backend could evaluate.
    pub fn validate(&self) -> Result<(), StoreError> {
        match self {
            Self::All => Ok(()),
            Self::Eq { attribute, .. } if attribute.trim().is_empty() => Err(
                StoreError::InvalidPredicate("attribute name cannot be empty".to_string()),
            ),
            Self::RelatedTo { relationship, .. } if relationship.trim().is_empty() => Err(
                StoreError::InvalidPredicate("relationship name cannot be empty".to_string()),
            ),
            Self::Eq { .. } | Self::RelatedTo { .. } => Ok(()),
            Self::And { all: parts } | Self::Or { any: parts } => {
                parts.iter().try_for_each(Self::validate)
            }
            Self::Not { inner } => inner.validate(),
        }
    }

    #[must_use]
    pub fn matches(&self, entity: &Entity) -> bool {
        match self {
            Self::All => true,
            Self::Eq { attribute, value } => entity
                .attribute(attribute)
                .is_some_and(|v| v.equivalent(value)),
            Self::RelatedTo { relationship, id } => entity
                .relationship(relationship)
                .is_some_and(|r| r.contains(*id)),
            Self::And { all } => all.iter().all(|p| p.matches(entity)),
            Self::Or { any } => any.iter().any(|p| p.matches(entity)),
            Self::Not { inner } => !inner.matches(entity),
        }
    }
}

impl Default for Predicate {
    fn default() -> Self {
        Self::All
    }
}
