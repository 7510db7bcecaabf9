//! Session storage backends.
//!
//! A backend persists and retrieves the `(id, expires, ciphertext, tag)`
//! tuple. It never validates cryptographic correctness; that is the
//! lifecycle's job. Implementations may embed everything in the token
//! itself ([`CookieStorage`]) or keep the payload server-side keyed by id
//! ([`MemoryStorage`]).

mod cookie;
mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::Duration;
pub use cookie::CookieStorage;
pub use memory::MemoryStorage;

use crate::SessionError;

/// The persisted session tuple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    /// Random opaque session identifier.
    pub id: Vec<u8>,
    /// Absolute Unix expiry timestamp.
    pub expires: i64,
    /// Encrypted serialized payload.
    pub ciphertext: Vec<u8>,
    /// Integrity tag over id, expiry, plaintext, and binding key.
    pub tag: Vec<u8>,
}

/// Storage backend contract.
///
/// Every call is a single synchronous operation from the lifecycle's point
/// of view; retry policy, if any, belongs to the implementation.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Resolves an inbound token to a session record.
    ///
    /// Malformed or unknown tokens yield `Ok(None)`; only backend I/O
    /// problems are errors.
    async fn open(
        &self,
        token: &str,
        lifetime: Duration,
    ) -> Result<Option<SessionRecord>, SessionError>;

    /// Persists a record and returns the opaque token for the transport.
    ///
    /// `close` marks a terminal write (the destroy path); self-contained
    /// backends can ignore it.
    async fn save(&self, record: &SessionRecord, close: bool) -> Result<String, SessionError>;

    /// Destroys the record for `id`, best-effort.
    async fn destroy(&self, id: &[u8]) -> Result<(), SessionError>;

    /// Touch hook invoked when a valid session starts; lets server-side
    /// backends record last access. Default is a no-op.
    async fn start(&self, _id: &[u8]) -> Result<(), SessionError> {
        Ok(())
    }
}

/// Resolves a storage backend by name.
///
/// Unknown names fall back to the built-in cookie backend with a logged
/// warning. Note that a `memory` backend resolved here is private to the
/// session that requested it; to share one across requests, construct it
/// once and pass it through [`Session::with_backends`](crate::Session::with_backends).
pub fn resolve(name: &str) -> Arc<dyn Storage> {
    match name {
        "cookie" => Arc::new(CookieStorage::new()),
        "memory" => Arc::new(MemoryStorage::new()),
        other => {
            log::warn!(
                target: "sealbox::storage",
                "msg=\"unknown storage backend, using cookie\" name=\"{}\"",
                other
            );
            Arc::new(CookieStorage::new())
        }
    }
}

/// Encodes one binary token segment.
pub(crate) fn encode_part(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Decodes one binary token segment.
pub(crate) fn decode_part(part: &str) -> Option<Vec<u8>> {
    URL_SAFE_NO_PAD.decode(part).ok()
}
