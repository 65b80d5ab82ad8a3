//! Payload-to-entity mapping.
//!
//! - [`MappingDescriptor`]: per-type declarative contract
//! - [`MappingRegistry`]: process-wide, read-only descriptor lookup
//! - [`AttributeTree`]: decoded payload
//! - [`PayloadMapper`]: find-or-create entities from a tree

use std::fmt;

use serde::{Deserialize, Serialize};

mod decode;
mod descriptor;
mod mapper;
mod registry;
mod tree;

pub use decode::{JsonPayloadDecoder, PayloadDecoder, DEFAULT_MAX_PAYLOAD_BYTES};
pub use descriptor::{
    format_element_name, parse_path, AttributeMapping, Cardinality, ElementNameFormatter,
    MappingDescriptor, MappingDescriptorBuilder, RelationshipMapping, PATH_SEPARATOR,
};
pub use mapper::PayloadMapper;
pub use registry::{MappingRegistry, MappingRegistryBuilder};
pub use tree::{AttributeNode, AttributeTree};

/// Encoding family of a payload. Drives element-name formatting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadFormat {
    #[default]
    Json,
    Xml,
}

impl fmt::Display for PayloadFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => write!(f, "json"),
            Self::Xml => write!(f, "xml"),
        }
    }
}
