//! Configuration types for the sealbox session library.
//!
//! A [`SessionConfig`] is built once at startup, validated, and passed by
//! reference into every session construction. There is no hidden global
//! state apart from the per-process fallback secret used when no explicit
//! secret is configured.
//!
//! # Example
//!
//! ```rust
//! use sealbox::{SecretKey, SessionConfig};
//! use chrono::Duration;
//!
//! let config = SessionConfig {
//!     secret: Some(SecretKey::new("a-long-term-secret-of-at-least-32-bytes")),
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! assert_eq!(config.cookie.lifetime, Duration::seconds(3600));
//! ```

use std::str::FromStr;
use std::sync::OnceLock;

use chrono::Duration;

use crate::secret::SecretKey;

/// Fallback secret, generated once per process when no secret is configured.
///
/// Tokens issued under the fallback secret stop verifying after a restart;
/// that is the documented rotation boundary for unconfigured deployments.
static PROCESS_SECRET: OnceLock<SecretKey> = OnceLock::new();

/// Main configuration for session construction.
///
/// Defaults mirror a conservative cookie-embedded deployment: JSON
/// serializer, self-contained `cookie` storage, one-hour lifetime with a
/// ten-minute renewal window.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Name of the session token attribute (the cookie name).
    pub name: String,

    /// Storage backend selector; unknown names fall back to `"cookie"`.
    pub storage: String,

    /// Serializer selector; unknown names fall back to `"json"`.
    pub serializer: String,

    /// Long-term key material. `None` uses a random per-process secret.
    pub secret: Option<SecretKey>,

    /// Cookie transport settings.
    pub cookie: CookieConfig,

    /// Identity-binding toggles.
    pub check: CheckConfig,

    /// Cipher parameters.
    pub cipher: CipherConfig,

    /// Length of the random session identifier in bytes.
    ///
    /// Default is 16 (128 bits of entropy).
    pub identifier_length: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            name: "id".to_owned(),
            storage: "cookie".to_owned(),
            serializer: "json".to_owned(),
            secret: None,
            cookie: CookieConfig::default(),
            check: CheckConfig::default(),
            cipher: CipherConfig::default(),
            identifier_length: 16,
        }
    }
}

impl SessionConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the effective secret: the configured one, or the
    /// per-process random fallback.
    pub fn secret(&self) -> &SecretKey {
        self.secret
            .as_ref()
            .unwrap_or_else(|| PROCESS_SECRET.get_or_init(|| SecretKey::random(32)))
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns a message describing the first invalid setting. Meant to be
    /// called at startup, before the first request.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.name.is_empty() {
            return Err("name must not be empty");
        }
        if self.cookie.lifetime <= Duration::zero() {
            return Err("cookie.lifetime must be positive");
        }
        if self.cookie.renew < Duration::zero() {
            return Err("cookie.renew must not be negative");
        }
        if self.identifier_length == 0 {
            return Err("identifier_length must be at least 1 byte");
        }
        if self.cipher.rounds == 0 {
            return Err("cipher.rounds must be at least 1");
        }
        if let Some(secret) = &self.secret {
            if secret.len() < 32 {
                return Err("secret should be at least 32 bytes");
            }
        }
        Ok(())
    }
}

/// Cookie transport settings.
#[derive(Debug, Clone)]
pub struct CookieConfig {
    /// Whether the cookie carries an explicit expiry (survives browser
    /// restarts) or is session-scoped.
    ///
    /// Default: false
    pub persistent: bool,

    /// Remaining lifetime below which an otherwise-valid session is
    /// re-saved with extended expiry.
    ///
    /// Default: 600 seconds
    pub renew: Duration,

    /// Session lifetime; `expires` is recomputed as `now + lifetime` on
    /// every save.
    ///
    /// Default: 3600 seconds
    pub lifetime: Duration,

    /// Cookie `Path` attribute.
    pub path: String,

    /// Cookie `Domain` attribute. Suppressed for `localhost` or empty
    /// values, which browsers reject.
    pub domain: Option<String>,

    /// Cookie `Secure` flag.
    pub secure: bool,

    /// Cookie `HttpOnly` flag.
    pub http_only: bool,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            persistent: false,
            renew: Duration::seconds(600),
            lifetime: Duration::seconds(3600),
            path: "/".to_owned(),
            domain: None,
            secure: false,
            http_only: true,
        }
    }
}

impl CookieConfig {
    /// Returns the `Domain` attribute to write, suppressing values that
    /// browsers reject.
    pub fn effective_domain(&self) -> Option<&str> {
        match self.domain.as_deref() {
            Some("") | Some("localhost") | None => None,
            other => other,
        }
    }
}

/// Identity-binding toggles.
///
/// Each enabled check folds the corresponding request attribute into the
/// integrity tag, so a token replayed from a different channel fails
/// verification. This is a soft anti-fixation heuristic, not a hard
/// boundary: proxies and mobile networks rotate addresses and user agents
/// legitimately, and a mismatch silently degrades to an anonymous session.
#[derive(Debug, Clone)]
pub struct CheckConfig {
    /// Bind to the TLS session identifier.
    pub ssi: bool,
    /// Bind to the `User-Agent` string.
    pub ua: bool,
    /// Bind to the URL scheme.
    pub scheme: bool,
    /// Bind to the resolved client address.
    pub addr: bool,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            ssi: false,
            ua: true,
            scheme: true,
            addr: false,
        }
    }
}

/// Cipher parameters: AES key size, block mode, and the key-stretching
/// hash and iteration count used to derive the cipher key/IV pair.
#[derive(Debug, Clone, Copy)]
pub struct CipherConfig {
    /// AES key size.
    pub size: KeySize,
    /// Block mode.
    pub mode: CipherMode,
    /// Hash used for key/IV stretching.
    pub hash: StretchHash,
    /// Stretching iterations per block. Minimum 1.
    pub rounds: u32,
}

impl Default for CipherConfig {
    fn default() -> Self {
        Self {
            size: KeySize::Bits256,
            mode: CipherMode::Cbc,
            hash: StretchHash::Sha256,
            rounds: 1,
        }
    }
}

/// AES key size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeySize {
    Bits128,
    Bits192,
    #[default]
    Bits256,
}

impl KeySize {
    /// Key length in bytes.
    pub fn byte_len(self) -> usize {
        match self {
            KeySize::Bits128 => 16,
            KeySize::Bits192 => 24,
            KeySize::Bits256 => 32,
        }
    }
}

impl FromStr for KeySize {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "128" => Ok(KeySize::Bits128),
            "192" => Ok(KeySize::Bits192),
            "256" => Ok(KeySize::Bits256),
            _ => Err("key size must be one of 128, 192, 256"),
        }
    }
}

/// AES block mode.
///
/// `ecb` and `cbc` use PKCS#7 padding; the stream modes produce
/// ciphertext of the same length as the plaintext.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CipherMode {
    Ecb,
    #[default]
    Cbc,
    Cfb8,
    Cfb128,
    Ofb,
    Ctr,
}

impl CipherMode {
    /// Resolves a mode name, falling back to the default on unknown or
    /// unsupported names with a logged warning.
    pub fn resolve(name: &str) -> Self {
        match name.parse() {
            Ok(mode) => mode,
            Err(_) => {
                log::warn!(
                    target: "sealbox::config",
                    "msg=\"unknown cipher mode, using default\" mode=\"{}\" default=\"cbc\"",
                    name
                );
                CipherMode::default()
            }
        }
    }
}

impl FromStr for CipherMode {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ecb" => Ok(CipherMode::Ecb),
            "cbc" => Ok(CipherMode::Cbc),
            "cfb8" => Ok(CipherMode::Cfb8),
            "cfb128" => Ok(CipherMode::Cfb128),
            "ofb" => Ok(CipherMode::Ofb),
            "ctr" => Ok(CipherMode::Ctr),
            // cfb1 has no maintained implementation; resolve() maps it to
            // the default mode.
            "cfb1" => Err("cfb1 is not supported"),
            _ => Err("unknown cipher mode"),
        }
    }
}

/// Hash used for key/IV stretching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StretchHash {
    Md5,
    Sha1,
    #[default]
    Sha256,
    Sha512,
}

impl FromStr for StretchHash {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "md5" => Ok(StretchHash::Md5),
            "sha1" => Ok(StretchHash::Sha1),
            "sha256" => Ok(StretchHash::Sha256),
            "sha512" => Ok(StretchHash::Sha512),
            _ => Err("unknown stretch hash"),
        }
    }
}
