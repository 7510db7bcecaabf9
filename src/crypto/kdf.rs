//! Key derivation and integrity tagging.
//!
//! The per-session encryption key is an HMAC of the session identifier and
//! expiry under the long-term secret, so replaying ciphertext with a
//! different id or expiry fails to decrypt meaningfully even if the
//! storage-level fields were forged.

use crate::secret::SecretKey;

use super::hmac_sha256;

/// Derives the per-session symmetric key from the long-term secret.
pub fn derive_key(secret: &SecretKey, id: &[u8], expires: i64) -> [u8; 32] {
    hmac_sha256(
        secret.expose_secret(),
        &[id, expires.to_string().as_bytes()],
    )
}

/// Computes the integrity tag over `id ∥ expires ∥ payload ∥ binding_key`.
///
/// `payload` is the plaintext on the save path and the decrypted plaintext
/// on the verify path; the tag is always computed over the same
/// representation. The binding key folds selected request attributes into
/// the tag without ever being stored.
pub fn compute_tag(
    derived_key: &[u8],
    id: &[u8],
    expires: i64,
    payload: &[u8],
    binding_key: &str,
) -> [u8; 32] {
    hmac_sha256(
        derived_key,
        &[
            id,
            expires.to_string().as_bytes(),
            payload,
            binding_key.as_bytes(),
        ],
    )
}
