//! Entity layer modules.
//!
//! This module groups the entity value types and primary-key resolution.

#[allow(clippy::module_inception)]
pub mod entity;
pub mod resolution;

pub use entity::{Entity, EntityType, LocalId, Relationship};
pub use resolution::{entities_of, ids_of, IdentityResolver};
