//! Object store contract and backends.
//!
//! The store is an external collaborator; the core only relies on the
//! [`ObjectStore`] trait. An in-memory backend is provided for embedding and
//! tests.

mod memory;
mod predicate;
mod traits;

pub use memory::InMemoryObjectStore;
pub use predicate::Predicate;
pub use traits::{ObjectStore, StoreError};
