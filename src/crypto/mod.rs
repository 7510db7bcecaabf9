//! Cryptographic primitives for the session protocol.
//!
//! [`kdf`] binds the long-term secret to a per-session key and computes
//! the integrity tag; [`cipher`] encrypts the serialized payload under a
//! configurable AES mode.

pub mod cipher;
pub mod kdf;

use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Computes HMAC-SHA256 over one or more message parts.
///
/// # Panics
///
/// This function cannot panic as HMAC accepts keys of any size.
pub(crate) fn hmac_sha256(key: &[u8], parts: &[&[u8]]) -> [u8; 32] {
    // SAFETY: HmacSha256::new_from_slice only fails if the key is invalid,
    // but HMAC-SHA256 accepts keys of any length, so this cannot fail.
    #[allow(clippy::expect_used)]
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any size");
    for part in parts {
        mac.update(part);
    }
    mac.finalize().into_bytes().into()
}

/// Constant-time comparison to prevent timing attacks.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

/// Fills a fresh buffer of `len` bytes from the OS random source.
///
/// Used for session identifiers; safe to call from concurrent requests.
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    bytes
}
