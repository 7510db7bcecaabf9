//! Self-contained cookie storage.
//!
//! The token carries the whole tuple: `id | expires | ciphertext | tag`,
//! each binary segment URL-safe base64 encoded. Nothing is kept
//! server-side, so `destroy` has nothing to do and the backend scales to
//! any number of processes.

use async_trait::async_trait;
use chrono::Duration;

use super::{decode_part, encode_part, SessionRecord, Storage};
use crate::SessionError;

/// Storage backend that embeds the session record in the token itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct CookieStorage;

impl CookieStorage {
    /// Creates a new cookie storage backend.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Storage for CookieStorage {
    async fn open(
        &self,
        token: &str,
        _lifetime: Duration,
    ) -> Result<Option<SessionRecord>, SessionError> {
        let mut parts = token.split('|');
        let record = (|| {
            let id = decode_part(parts.next()?)?;
            let expires: i64 = parts.next()?.parse().ok()?;
            let ciphertext = decode_part(parts.next()?)?;
            let tag = decode_part(parts.next()?)?;
            if parts.next().is_some() {
                return None;
            }
            Some(SessionRecord {
                id,
                expires,
                ciphertext,
                tag,
            })
        })();

        if record.is_none() {
            log::debug!(
                target: "sealbox::storage",
                "msg=\"malformed cookie token\" token_prefix=\"{}...\"",
                &token.chars().take(8).collect::<String>()
            );
        }
        Ok(record)
    }

    async fn save(&self, record: &SessionRecord, _close: bool) -> Result<String, SessionError> {
        Ok(format!(
            "{}|{}|{}|{}",
            encode_part(&record.id),
            record.expires,
            encode_part(&record.ciphertext),
            encode_part(&record.tag),
        ))
    }

    async fn destroy(&self, _id: &[u8]) -> Result<(), SessionError> {
        // Nothing server-side to destroy; the transport clears the cookie.
        Ok(())
    }
}
