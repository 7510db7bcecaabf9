//! Payload encryption under a configurable AES mode.
//!
//! The actual cipher key/IV pair is stretched from the derived per-session
//! key with an iterated hash (the `EVP_BytesToKey` construction), salted
//! with the session identifier so two sessions never share a keystream.

use aes::{Aes128, Aes192, Aes256};
use cipher::block_padding::Pkcs7;
use cipher::{
    AsyncStreamCipher, BlockDecryptMut, BlockEncryptMut, KeyInit, KeyIvInit, StreamCipher,
};
use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};

use crate::config::{CipherConfig, CipherMode, KeySize, StretchHash};
use crate::SessionError;

/// AES block length; also the stretched IV length.
const IV_LEN: usize = 16;

/// Salt bytes taken from the head of the session identifier.
const SALT_LEN: usize = 8;

macro_rules! with_key_size {
    ($size:expr, $alias:ident, $body:block) => {
        match $size {
            KeySize::Bits128 => {
                type $alias = Aes128;
                $body
            }
            KeySize::Bits192 => {
                type $alias = Aes192;
                $body
            }
            KeySize::Bits256 => {
                type $alias = Aes256;
                $body
            }
        }
    };
}

/// Encrypts `plaintext` under the configured mode.
///
/// `id` is not secret but unique per session; its head salts the key/IV
/// stretch.
///
/// # Errors
///
/// Returns `SessionError::Crypto` if the stretched key or IV cannot key
/// the cipher. This indicates a configuration bug, not bad input.
pub fn encrypt(
    cfg: &CipherConfig,
    derived_key: &[u8],
    id: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, SessionError> {
    let (key, iv) = stretch(cfg, derived_key, salt(id));
    with_key_size!(cfg.size, Aes, {
        match cfg.mode {
            CipherMode::Ecb => Ok(ecb::Encryptor::<Aes>::new_from_slice(&key)
                .map_err(|_| SessionError::Crypto("invalid cipher key length"))?
                .encrypt_padded_vec_mut::<Pkcs7>(plaintext)),
            CipherMode::Cbc => Ok(cbc::Encryptor::<Aes>::new_from_slices(&key, &iv)
                .map_err(|_| SessionError::Crypto("invalid cipher key or iv length"))?
                .encrypt_padded_vec_mut::<Pkcs7>(plaintext)),
            CipherMode::Cfb8 => {
                let mut buf = plaintext.to_vec();
                cfb8::Encryptor::<Aes>::new_from_slices(&key, &iv)
                    .map_err(|_| SessionError::Crypto("invalid cipher key or iv length"))?
                    .encrypt(&mut buf);
                Ok(buf)
            }
            CipherMode::Cfb128 => {
                let mut buf = plaintext.to_vec();
                cfb_mode::Encryptor::<Aes>::new_from_slices(&key, &iv)
                    .map_err(|_| SessionError::Crypto("invalid cipher key or iv length"))?
                    .encrypt(&mut buf);
                Ok(buf)
            }
            CipherMode::Ofb => {
                let mut buf = plaintext.to_vec();
                let mut cipher = ofb::Ofb::<Aes>::new_from_slices(&key, &iv)
                    .map_err(|_| SessionError::Crypto("invalid cipher key or iv length"))?;
                cipher.apply_keystream(&mut buf);
                Ok(buf)
            }
            CipherMode::Ctr => {
                let mut buf = plaintext.to_vec();
                let mut cipher = ctr::Ctr128BE::<Aes>::new_from_slices(&key, &iv)
                    .map_err(|_| SessionError::Crypto("invalid cipher key or iv length"))?;
                cipher.apply_keystream(&mut buf);
                Ok(buf)
            }
        }
    })
}

/// Decrypts `ciphertext` under the configured mode.
///
/// # Errors
///
/// Returns `SessionError::Crypto` on bad padding (padded modes) or
/// invalid key material. The caller treats any failure as a verification
/// failure, never as fatal.
pub fn decrypt(
    cfg: &CipherConfig,
    derived_key: &[u8],
    id: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, SessionError> {
    let (key, iv) = stretch(cfg, derived_key, salt(id));
    with_key_size!(cfg.size, Aes, {
        match cfg.mode {
            CipherMode::Ecb => ecb::Decryptor::<Aes>::new_from_slice(&key)
                .map_err(|_| SessionError::Crypto("invalid cipher key length"))?
                .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
                .map_err(|_| SessionError::Crypto("bad padding")),
            CipherMode::Cbc => cbc::Decryptor::<Aes>::new_from_slices(&key, &iv)
                .map_err(|_| SessionError::Crypto("invalid cipher key or iv length"))?
                .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
                .map_err(|_| SessionError::Crypto("bad padding")),
            CipherMode::Cfb8 => {
                let mut buf = ciphertext.to_vec();
                cfb8::Decryptor::<Aes>::new_from_slices(&key, &iv)
                    .map_err(|_| SessionError::Crypto("invalid cipher key or iv length"))?
                    .decrypt(&mut buf);
                Ok(buf)
            }
            CipherMode::Cfb128 => {
                let mut buf = ciphertext.to_vec();
                cfb_mode::Decryptor::<Aes>::new_from_slices(&key, &iv)
                    .map_err(|_| SessionError::Crypto("invalid cipher key or iv length"))?
                    .decrypt(&mut buf);
                Ok(buf)
            }
            CipherMode::Ofb => {
                let mut buf = ciphertext.to_vec();
                let mut cipher = ofb::Ofb::<Aes>::new_from_slices(&key, &iv)
                    .map_err(|_| SessionError::Crypto("invalid cipher key or iv length"))?;
                cipher.apply_keystream(&mut buf);
                Ok(buf)
            }
            CipherMode::Ctr => {
                let mut buf = ciphertext.to_vec();
                let mut cipher = ctr::Ctr128BE::<Aes>::new_from_slices(&key, &iv)
                    .map_err(|_| SessionError::Crypto("invalid cipher key or iv length"))?;
                cipher.apply_keystream(&mut buf);
                Ok(buf)
            }
        }
    })
}

fn salt(id: &[u8]) -> &[u8] {
    &id[..id.len().min(SALT_LEN)]
}

/// Stretches the derived key into a cipher key and IV.
///
/// `D1 = H^rounds(derived ∥ salt)`, `Dn = H^rounds(D(n-1) ∥ derived ∥ salt)`,
/// concatenated until key-size + IV bytes are available.
fn stretch(cfg: &CipherConfig, derived_key: &[u8], salt: &[u8]) -> (Vec<u8>, Vec<u8>) {
    let key_len = cfg.size.byte_len();
    match cfg.hash {
        StretchHash::Md5 => stretch_with::<Md5>(key_len, cfg.rounds, derived_key, salt),
        StretchHash::Sha1 => stretch_with::<Sha1>(key_len, cfg.rounds, derived_key, salt),
        StretchHash::Sha256 => stretch_with::<Sha256>(key_len, cfg.rounds, derived_key, salt),
        StretchHash::Sha512 => stretch_with::<Sha512>(key_len, cfg.rounds, derived_key, salt),
    }
}

fn stretch_with<H: Digest>(
    key_len: usize,
    rounds: u32,
    derived_key: &[u8],
    salt: &[u8],
) -> (Vec<u8>, Vec<u8>) {
    let need = key_len + IV_LEN;
    let mut material: Vec<u8> = Vec::with_capacity(need + <H as Digest>::output_size());
    let mut block: Vec<u8> = Vec::new();

    while material.len() < need {
        let mut hasher = H::new();
        hasher.update(&block);
        hasher.update(derived_key);
        hasher.update(salt);
        block = hasher.finalize().to_vec();
        for _ in 1..rounds {
            block = H::digest(&block).to_vec();
        }
        material.extend_from_slice(&block);
    }

    let iv = material[key_len..need].to_vec();
    material.truncate(key_len);
    (material, iv)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODES: [CipherMode; 6] = [
        CipherMode::Ecb,
        CipherMode::Cbc,
        CipherMode::Cfb8,
        CipherMode::Cfb128,
        CipherMode::Ofb,
        CipherMode::Ctr,
    ];

    fn cfg(mode: CipherMode) -> CipherConfig {
        CipherConfig {
            mode,
            ..Default::default()
        }
    }

    #[test]
    fn test_round_trip_every_mode() {
        let key = [42u8; 32];
        let id = b"0123456789abcdef";
        let plaintext = br#"{"user":"alice","role":"admin"}"#;

        for mode in MODES {
            let ct = encrypt(&cfg(mode), &key, id, plaintext).unwrap();
            assert_ne!(&ct[..], &plaintext[..], "{mode:?} left plaintext visible");
            let pt = decrypt(&cfg(mode), &key, id, &ct).unwrap();
            assert_eq!(&pt[..], &plaintext[..], "{mode:?} round trip failed");
        }
    }

    #[test]
    fn test_round_trip_every_key_size() {
        let key = [7u8; 32];
        let id = b"0123456789abcdef";

        for size in [KeySize::Bits128, KeySize::Bits192, KeySize::Bits256] {
            let config = CipherConfig {
                size,
                ..Default::default()
            };
            let ct = encrypt(&config, &key, id, b"payload").unwrap();
            assert_eq!(decrypt(&config, &key, id, &ct).unwrap(), b"payload");
        }
    }

    #[test]
    fn test_id_salts_the_keystream() {
        let key = [1u8; 32];
        let config = CipherConfig::default();

        let a = encrypt(&config, &key, b"first-session-id", b"payload").unwrap();
        let b = encrypt(&config, &key, b"other-session-id", b"payload").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_short_id_still_works() {
        let key = [9u8; 32];
        let config = CipherConfig::default();

        // Identifier shorter than the salt window.
        let ct = encrypt(&config, &key, b"abc", b"payload").unwrap();
        assert_eq!(decrypt(&config, &key, b"abc", &ct).unwrap(), b"payload");
    }

    #[test]
    fn test_cbc_rejects_truncated_ciphertext() {
        let key = [3u8; 32];
        let id = b"0123456789abcdef";
        let config = CipherConfig::default();

        let mut ct = encrypt(&config, &key, id, b"some longer payload data").unwrap();
        ct.truncate(ct.len() - 1);
        assert!(decrypt(&config, &key, id, &ct).is_err());
    }

    #[test]
    fn test_wrong_key_fails_or_garbles() {
        let id = b"0123456789abcdef";
        let config = CipherConfig::default();

        let ct = encrypt(&config, &[1u8; 32], id, b"payload").unwrap();
        match decrypt(&config, &[2u8; 32], id, &ct) {
            // CBC usually trips on padding with the wrong key...
            Err(SessionError::Crypto(_)) => {}
            // ...but can produce garbage that happens to unpad.
            Ok(pt) => assert_ne!(pt, b"payload"),
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_stretch_lengths_and_rounds() {
        let (key, iv) = stretch_with::<Sha256>(24, 1, b"derived", b"salt");
        assert_eq!(key.len(), 24);
        assert_eq!(iv.len(), IV_LEN);

        let (key_more_rounds, _) = stretch_with::<Sha256>(24, 3, b"derived", b"salt");
        assert_ne!(key, key_more_rounds);
    }

    #[test]
    fn test_stretch_hash_selection_matters() {
        let key = [5u8; 32];
        let id = b"0123456789abcdef";

        let sha = encrypt(&cfg(CipherMode::Ctr), &key, id, b"payload").unwrap();
        let md5_cfg = CipherConfig {
            mode: CipherMode::Ctr,
            hash: StretchHash::Md5,
            ..Default::default()
        };
        let md5 = encrypt(&md5_cfg, &key, id, b"payload").unwrap();
        assert_ne!(sha, md5);
    }
}
