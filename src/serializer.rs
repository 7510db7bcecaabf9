//! Session data serialization.
//!
//! Implementations turn the session data mapping into the byte payload
//! that gets encrypted and tagged. Decode failures are treated as
//! verification failures by the lifecycle, never propagated as fatal.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::SessionError;

/// The session data mapping: string keys to arbitrary serializable values.
pub type DataMap = HashMap<String, Value>;

/// Serializer for the session payload.
///
/// Built-in: [`JsonSerializer`]. Resolved by name through [`resolve`],
/// with fallback to JSON for unknown names.
pub trait Serializer: Send + Sync {
    /// Encodes the data mapping into the payload bytes.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Serialize` if a value cannot be encoded.
    fn encode(&self, data: &DataMap) -> Result<Vec<u8>, SessionError>;

    /// Decodes payload bytes back into the data mapping.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Serialize` on malformed payloads; the
    /// lifecycle maps this to "no valid session".
    fn decode(&self, bytes: &[u8]) -> Result<DataMap, SessionError>;
}

/// JSON payload serializer backed by `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn encode(&self, data: &DataMap) -> Result<Vec<u8>, SessionError> {
        serde_json::to_vec(data).map_err(|e| SessionError::Serialize(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<DataMap, SessionError> {
        serde_json::from_slice(bytes).map_err(|e| SessionError::Serialize(e.to_string()))
    }
}

/// Resolves a serializer by name.
///
/// Unknown names fall back to the built-in JSON serializer with a logged
/// warning, so a misconfigured name degrades rather than failing requests.
pub fn resolve(name: &str) -> Arc<dyn Serializer> {
    match name {
        "json" => Arc::new(JsonSerializer),
        other => {
            log::warn!(
                target: "sealbox::serializer",
                "msg=\"unknown serializer, using json\" name=\"{}\"",
                other
            );
            Arc::new(JsonSerializer)
        }
    }
}
