//! Loader configuration.

use serde::{Deserialize, Serialize};

use crate::mapping::{PayloadFormat, DEFAULT_MAX_PAYLOAD_BYTES};

/// Tunables for a [`ModelLoader`](crate::loader::ModelLoader).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Encoding of response bodies.
    pub format: PayloadFormat,
    /// Bodies larger than this fail to decode.
    pub max_payload_bytes: usize,
    /// Strip a single `{ "<model_name>": ... }` wrapper around records.
    pub unwrap_root_element: bool,
    /// Delete stale entities after mapping when the resource path is known.
    pub reconcile: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            format: PayloadFormat::Json,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            unwrap_root_element: true,
            reconcile: true,
        }
    }
}
