pub mod binder;
pub mod config;
pub mod crypto;
pub mod secret;
pub mod serializer;
pub mod session;
pub mod storage;
pub mod transport;

pub use binder::RequestContext;
pub use config::{
    CheckConfig, CipherConfig, CipherMode, CookieConfig, KeySize, SessionConfig, StretchHash,
};
pub use secret::SecretKey;
pub use serializer::{DataMap, JsonSerializer, Serializer};
pub use session::Session;
pub use storage::{CookieStorage, MemoryStorage, SessionRecord, Storage};
pub use transport::{CookieTransport, MemoryTransport, SetCookie};

use std::fmt;

/// Errors surfaced by session lifecycle calls.
///
/// Validation failures (expired token, tag mismatch, decryption failure,
/// malformed payload) are *not* errors: the lifecycle degrades to a fresh
/// anonymous session instead. Only backend I/O problems, configuration
/// mistakes, and use-after-destroy reach the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionError {
    /// A storage backend call failed (I/O, poisoned lock, ...).
    Storage(String),
    /// The serializer could not encode the session data.
    Serialize(String),
    /// A cryptographic primitive was handed invalid parameters.
    Crypto(&'static str),
    /// Invalid configuration, reported by `SessionConfig::validate`.
    Config(&'static str),
    /// `save` or `regenerate` was called after `destroy`.
    Destroyed,
}

impl std::error::Error for SessionError {}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Storage(msg) => write!(f, "Storage error: {}", msg),
            SessionError::Serialize(msg) => write!(f, "Serialization error: {}", msg),
            SessionError::Crypto(msg) => write!(f, "Cipher error: {}", msg),
            SessionError::Config(msg) => write!(f, "Invalid configuration: {}", msg),
            SessionError::Destroyed => write!(f, "Session has been destroyed"),
        }
    }
}
