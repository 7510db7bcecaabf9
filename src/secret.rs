//! Sensitive key material wrapper.
//!
//! This module provides a type for handling long-term key material that
//! should not be accidentally logged or printed.

use std::fmt;

use rand::rngs::OsRng;
use rand::RngCore;

/// A wrapper for secret key bytes that prevents accidental logging.
///
/// `SecretKey` implements `Debug` and `Display` to show `[REDACTED]` instead
/// of the actual content, so the long-term session secret never ends up in
/// logs or error messages.
///
/// # Example
///
/// ```rust
/// use sealbox::SecretKey;
///
/// let secret = SecretKey::new("a-long-term-secret-of-at-least-32-bytes");
///
/// // Debug output shows [REDACTED]
/// assert_eq!(format!("{:?}", secret), "SecretKey([REDACTED])");
///
/// // Access the actual value when needed
/// assert!(!secret.expose_secret().is_empty());
/// ```
#[derive(Clone)]
pub struct SecretKey(Vec<u8>);

impl SecretKey {
    /// Creates a new `SecretKey` from any type that can be converted to bytes.
    #[must_use]
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self(secret.into())
    }

    /// Generates a random secret of `len` bytes from the OS random source.
    #[must_use]
    pub fn random(len: usize) -> Self {
        let mut bytes = vec![0u8; len];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Exposes the secret value.
    ///
    /// Use this method only when you need the actual bytes, such as when
    /// keying an HMAC.
    #[must_use]
    pub fn expose_secret(&self) -> &[u8] {
        &self.0
    }

    /// Returns true if the secret is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the length of the secret in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey([REDACTED])")
    }
}

impl fmt::Display for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl From<String> for SecretKey {
    fn from(s: String) -> Self {
        Self(s.into_bytes())
    }
}

impl From<&str> for SecretKey {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

impl From<Vec<u8>> for SecretKey {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl PartialEq for SecretKey {
    fn eq(&self, other: &Self) -> bool {
        crate::crypto::constant_time_eq(&self.0, &other.0)
    }
}

impl Eq for SecretKey {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_key_debug_redacted() {
        let secret = SecretKey::new("my_secret");
        assert_eq!(format!("{secret:?}"), "SecretKey([REDACTED])");
    }

    #[test]
    fn test_secret_key_display_redacted() {
        let secret = SecretKey::new("my_secret");
        assert_eq!(format!("{secret}"), "[REDACTED]");
    }

    #[test]
    fn test_secret_key_expose_secret() {
        let secret = SecretKey::new("my_secret");
        assert_eq!(secret.expose_secret(), b"my_secret");
    }

    #[test]
    fn test_secret_key_random_length() {
        let secret = SecretKey::random(32);
        assert_eq!(secret.len(), 32);
        assert!(!secret.is_empty());
    }

    #[test]
    fn test_secret_key_random_unique() {
        let a = SecretKey::random(32);
        let b = SecretKey::random(32);
        assert_ne!(a, b);
    }

    #[test]
    fn test_secret_key_from_str() {
        let secret: SecretKey = "password".into();
        assert_eq!(secret.expose_secret(), b"password");
    }

    #[test]
    fn test_secret_key_eq() {
        assert_eq!(SecretKey::new("same"), SecretKey::new("same"));
        assert_ne!(SecretKey::new("one"), SecretKey::new("two"));
    }
}
