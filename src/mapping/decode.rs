//! Payload decoding into attribute trees.
//!
//! Decoding is an external collaborator; only the [`PayloadDecoder`] contract
//! is fixed. [`JsonPayloadDecoder`] covers JSON bodies via `serde_json`.

use crate::error::DecodeError;
use crate::mapping::{AttributeNode, AttributeTree, PayloadFormat};

/// Default upper bound on decoded payload size.
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 4 * 1024 * 1024; // 4 MiB

/// Turns raw response bytes into an [`AttributeTree`].
pub trait PayloadDecoder: Send + Sync {
    /// Decode `bytes` in `format`.
    ///
    /// # Errors
    /// `DecodeError` if the bytes are malformed, too large, or in a format
    /// this decoder does not handle.
    fn decode(&self, bytes: &[u8], format: PayloadFormat) -> Result<AttributeTree, DecodeError>;
}

/// JSON decoder built on `serde_json`.
#[derive(Debug, Clone)]
pub struct JsonPayloadDecoder {
    max_bytes: usize,
}

impl JsonPayloadDecoder {
    #[must_use]
    pub const fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }
}

impl Default for JsonPayloadDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PAYLOAD_BYTES)
    }
}

impl PayloadDecoder for JsonPayloadDecoder {
    fn decode(&self, bytes: &[u8], format: PayloadFormat) -> Result<AttributeTree, DecodeError> {
        if format != PayloadFormat::Json {
            return Err(DecodeError::UnsupportedFormat(format));
        }
        if bytes.len() > self.max_bytes {
            return Err(DecodeError::PayloadTooLarge {
                size: bytes.len(),
                max: self.max_bytes,
            });
        }

        let doc: serde_json::Value =
            serde_json::from_slice(bytes).map_err(|e| DecodeError::Malformed {
                format,
                message: e.to_string(),
            })?;
        Ok(AttributeTree::new(format, AttributeNode::from_json(&doc)))
    }
}
