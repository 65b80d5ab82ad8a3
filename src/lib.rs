//! # ModelSync - REST payload mapping and reconciliation
//!
//! ModelSync keeps a local object store in step with a remote REST API. It
//! turns decoded response payloads into typed local entities, resolves their
//! identity against what is already cached, and deletes cached entities that
//! a resource path no longer returns.
//!
//! ## Core Concepts
//!
//! - **Entity**: a typed, locally persisted record with a store-assigned [`LocalId`]
//! - **MappingDescriptor**: per-type contract from remote elements to local attributes and relationships
//! - **ObjectCache**: which cached entities belong to a resource path
//! - **ModelLoader**: one request → map → reconcile → notify cycle per load
//!
//! ## Usage
//!
//! ```rust
//! use modelsync::mapping::PayloadMapper;
//! use modelsync::{AttributeKind, AttributeTree, InMemoryObjectStore, MappingDescriptor, MappingRegistry};
//!
//! let registry = MappingRegistry::builder()
//!     .register(
//!         MappingDescriptor::builder("User")
//!             .attribute("id", "remote_id", AttributeKind::Int)
//!             .attribute("email_address", "email", AttributeKind::String)
//!             .build()?,
//!     )
//!     .build()?;
//!
//! let store = InMemoryObjectStore::new();
//! let tree = AttributeTree::from_json(&serde_json::json!({"id": 7, "email_address": "a@b.c"}));
//! let descriptor = registry.descriptor(&"User".into())?;
//! let user = PayloadMapper::new(&registry, &store).map(&tree, descriptor)?;
//! assert_eq!(user.attribute("email").and_then(|v| v.as_string()), Some("a@b.c"));
//! # Ok::<(), modelsync::SyncError>(())
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod cache;
pub mod entity;
pub mod error;
pub mod loader;
pub mod mapping;
pub mod reconcile;
pub mod storage;
pub mod value;

// Re-export primary types at crate root for convenience
pub use cache::{EmptyObjectCache, ObjectCache, RoutedObjectCache};
pub use entity::{Entity, EntityType, IdentityResolver, LocalId, Relationship};
pub use error::{DecodeError, MappingError, SyncError, SyncResult, TransportError};
pub use loader::{
    ChannelDelegate, LoadDelegate, LoadEvent, LoadHandle, LoadOutcome, LoadRequest, LoadState,
    LoaderConfig, ModelLoader, Response, Transport,
};
pub use mapping::{
    AttributeNode, AttributeTree, JsonPayloadDecoder, MappingDescriptor, MappingRegistry,
    PayloadDecoder, PayloadFormat, PayloadMapper,
};
pub use reconcile::Reconciler;
pub use storage::{InMemoryObjectStore, ObjectStore, Predicate, StoreError};
pub use value::{AttributeKind, Value};
