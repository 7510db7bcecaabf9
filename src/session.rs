//! The session lifecycle state machine.
//!
//! A [`Session`] is scoped to a single request and moves through
//! `New → Opened → Started → {Saved, Regenerated}* → Destroyed`, tracked
//! as flags on the value. Every validation failure on the open path
//! degrades to a fresh anonymous session: a forged or corrupted token is
//! an unauthenticated visitor, never an error and never privileged
//! access. Only backend I/O failures surface to the caller.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;

use crate::binder::{self, RequestContext};
use crate::config::SessionConfig;
use crate::crypto::{self, cipher, kdf};
use crate::serializer::{self, DataMap, Serializer};
use crate::storage::{self, SessionRecord, Storage};
use crate::transport::{CookieTransport, SetCookie};
use crate::SessionError;

/// A per-request session.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use sealbox::{MemoryTransport, RequestContext, SecretKey, Session, SessionConfig};
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let config = Arc::new(SessionConfig {
///     secret: Some(SecretKey::new("a-long-term-secret-of-at-least-32-bytes")),
///     ..Default::default()
/// });
/// let transport = Arc::new(MemoryTransport::new());
///
/// let mut session = Session::new(config, transport.clone(), &RequestContext::new());
/// session.start().await?;
/// assert!(!session.is_present()); // no inbound token: anonymous
///
/// session.set("user", "alice")?;
/// session.save().await?;
/// assert!(transport.outbound_cookie("id").is_some());
/// # Ok::<(), sealbox::SessionError>(())
/// # }).unwrap();
/// ```
pub struct Session {
    config: Arc<SessionConfig>,
    storage: Arc<dyn Storage>,
    serializer: Arc<dyn Serializer>,
    transport: Arc<dyn CookieTransport>,

    binding_key: String,
    id: Vec<u8>,
    expires: i64,
    data: DataMap,

    present: bool,
    opened: bool,
    started: bool,
    destroyed: bool,
}

impl Session {
    /// Creates a session in state New, resolving storage and serializer
    /// backends from the configured names.
    pub fn new(
        config: Arc<SessionConfig>,
        transport: Arc<dyn CookieTransport>,
        ctx: &RequestContext,
    ) -> Self {
        let storage = storage::resolve(&config.storage);
        let serializer = serializer::resolve(&config.serializer);
        Self::with_backends(config, storage, serializer, transport, ctx)
    }

    /// Creates a session with explicitly injected backends.
    ///
    /// Use this to share a server-side storage instance across requests.
    pub fn with_backends(
        config: Arc<SessionConfig>,
        storage: Arc<dyn Storage>,
        serializer: Arc<dyn Serializer>,
        transport: Arc<dyn CookieTransport>,
        ctx: &RequestContext,
    ) -> Self {
        let binding_key = binder::binding_key(ctx, &config.check);
        Self {
            config,
            storage,
            serializer,
            transport,
            binding_key,
            id: Vec::new(),
            expires: 0,
            data: DataMap::new(),
            present: false,
            opened: false,
            started: false,
            destroyed: false,
        }
    }

    /// Opens the session: resolves and verifies the inbound token, or
    /// falls back to a fresh anonymous session.
    ///
    /// Idempotent; returns whether a valid prior session was found.
    ///
    /// # Errors
    ///
    /// Only storage I/O failures; validation failures fail open.
    pub async fn open(&mut self) -> Result<bool, SessionError> {
        if self.opened {
            return Ok(self.present);
        }

        let record = match self.transport.token(&self.config.name) {
            Some(token) => {
                self.storage
                    .open(&token, self.config.cookie.lifetime)
                    .await?
            }
            None => None,
        };

        match record.and_then(|r| self.verify(r)) {
            Some((id, expires, data)) => {
                self.id = id;
                self.expires = expires;
                self.data = data;
                self.present = true;
            }
            None => self.fresh(),
        }

        self.opened = true;
        Ok(self.present)
    }

    /// Starts the session: opens if needed, touches the storage backend
    /// for a present session, and saves when no prior session was found
    /// or the remaining lifetime fell below the renewal threshold.
    ///
    /// Idempotent.
    ///
    /// # Errors
    ///
    /// Storage I/O and serialization failures from the save path.
    pub async fn start(&mut self) -> Result<(), SessionError> {
        if self.started {
            return Ok(());
        }

        self.open().await?;

        if self.present {
            self.storage.start(&self.id).await?;

            let remaining = self.expires - Utc::now().timestamp();
            if remaining < self.config.cookie.renew.num_seconds() {
                self.save_with(false).await?;
            }
        } else {
            self.save_with(false).await?;
        }

        // Marked only once the backend work above succeeded, so a failed
        // start can be retried.
        self.started = true;
        Ok(())
    }

    /// Saves the session: recomputes expiry, runs the encrypt-and-tag
    /// pipeline, persists through storage, and hands the token to the
    /// transport.
    ///
    /// # Errors
    ///
    /// `SessionError::Destroyed` after `destroy`; otherwise storage I/O
    /// and serialization failures.
    pub async fn save(&mut self) -> Result<(), SessionError> {
        self.save_with(false).await
    }

    /// Saves the session as a terminal write, e.g. the last response of a
    /// login flow. Storage backends see `close = true` and the outbound
    /// cookie tells shared caches not to retain the response.
    ///
    /// # Errors
    ///
    /// Same as [`save`](Self::save).
    pub async fn save_close(&mut self) -> Result<(), SessionError> {
        self.save_with(true).await
    }

    async fn save_with(&mut self, close: bool) -> Result<(), SessionError> {
        if self.destroyed {
            return Err(SessionError::Destroyed);
        }
        if !self.opened {
            // A direct save is a pure write: data and id staged before
            // open are kept. Only mint an identifier if none exists yet.
            if self.id.is_empty() {
                self.id = crypto::random_bytes(self.config.identifier_length);
            }
            self.opened = true;
        }

        self.expires = Utc::now().timestamp() + self.config.cookie.lifetime.num_seconds();

        let payload = self.serializer.encode(&self.data)?;
        let key = kdf::derive_key(self.config.secret(), &self.id, self.expires);
        let tag = kdf::compute_tag(&key, &self.id, self.expires, &payload, &self.binding_key);
        let ciphertext = cipher::encrypt(&self.config.cipher, &key, &self.id, &payload)?;

        let record = SessionRecord {
            id: self.id.clone(),
            expires: self.expires,
            ciphertext,
            tag: tag.to_vec(),
        };

        let token = self.storage.save(&record, close).await?;
        self.transport
            .set_cookie(SetCookie::for_save(&self.config, token, self.expires, close))?;

        self.present = true;
        Ok(())
    }

    /// Assigns a new random identifier.
    ///
    /// With `flush`, also empties the data and best-effort destroys the
    /// prior id's storage record, making the old session unreachable.
    /// Without `flush`, data carries over (anti-fixation rotation on
    /// privilege escalation); call [`save`](Self::save) afterward to
    /// persist under the new id.
    ///
    /// # Errors
    ///
    /// `SessionError::Destroyed` after `destroy`.
    pub async fn regenerate(&mut self, flush: bool) -> Result<(), SessionError> {
        if self.destroyed {
            return Err(SessionError::Destroyed);
        }

        let old_id = std::mem::replace(
            &mut self.id,
            crypto::random_bytes(self.config.identifier_length),
        );

        if flush {
            self.data.clear();
            if !old_id.is_empty() {
                if let Err(e) = self.storage.destroy(&old_id).await {
                    log::warn!(
                        target: "sealbox::session",
                        "msg=\"failed to destroy prior session record\" id_prefix=\"{}\" error=\"{}\"",
                        id_prefix(&old_id),
                        e
                    );
                }
            }
        }

        Ok(())
    }

    /// Destroys the session: clears local state, best-effort destroys the
    /// storage record, and writes a clearing cookie.
    ///
    /// Safe to call on a session that was never opened; idempotent.
    ///
    /// # Errors
    ///
    /// Storage I/O failures, reported after local state is cleared and
    /// the clearing cookie is queued.
    pub async fn destroy(&mut self) -> Result<(), SessionError> {
        if self.destroyed {
            return Ok(());
        }

        self.destroyed = true;
        self.opened = true;
        self.present = false;
        self.data.clear();

        let storage_result = if self.id.is_empty() {
            Ok(())
        } else {
            self.storage.destroy(&self.id).await
        };

        self.transport.set_cookie(SetCookie::clearing(&self.config))?;
        storage_result
    }

    /// Returns a data value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Sets a data value.
    ///
    /// # Errors
    ///
    /// `SessionError::Serialize` if the value cannot be represented.
    pub fn set(
        &mut self,
        key: impl Into<String>,
        value: impl serde::Serialize,
    ) -> Result<(), SessionError> {
        let value =
            serde_json::to_value(value).map_err(|e| SessionError::Serialize(e.to_string()))?;
        self.data.insert(key.into(), value);
        Ok(())
    }

    /// Removes a data value, returning it if it was set.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    /// The current data mapping.
    pub fn data(&self) -> &DataMap {
        &self.data
    }

    /// The current session identifier; empty until opened.
    pub fn id(&self) -> &[u8] {
        &self.id
    }

    /// The current absolute expiry timestamp; zero until saved or loaded.
    pub fn expires(&self) -> i64 {
        self.expires
    }

    /// Whether a valid prior session was found this request.
    pub fn is_present(&self) -> bool {
        self.present
    }

    /// Whether `open` has run.
    pub fn is_opened(&self) -> bool {
        self.opened
    }

    /// Whether `start` has run.
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Whether `destroy` has run.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Runs the verify pipeline on a loaded record. `None` means "no
    /// valid session" regardless of which step failed.
    fn verify(&self, record: SessionRecord) -> Option<(Vec<u8>, i64, DataMap)> {
        let now = Utc::now().timestamp();
        if record.expires <= now {
            log::debug!(
                target: "sealbox::session",
                "msg=\"session expired\" id_prefix=\"{}\"",
                id_prefix(&record.id)
            );
            return None;
        }

        let key = kdf::derive_key(self.config.secret(), &record.id, record.expires);

        let payload =
            match cipher::decrypt(&self.config.cipher, &key, &record.id, &record.ciphertext) {
                Ok(payload) => payload,
                Err(_) => {
                    log::debug!(
                        target: "sealbox::session",
                        "msg=\"session decryption failed\" id_prefix=\"{}\"",
                        id_prefix(&record.id)
                    );
                    return None;
                }
            };

        // Tag is computed over the decrypted plaintext, matching the
        // representation used at signing time.
        let expected = kdf::compute_tag(&key, &record.id, record.expires, &payload, &self.binding_key);
        if !crypto::constant_time_eq(&expected, &record.tag) {
            log::warn!(
                target: "sealbox::session",
                "msg=\"session tag mismatch\" id_prefix=\"{}\"",
                id_prefix(&record.id)
            );
            return None;
        }

        match self.serializer.decode(&payload) {
            Ok(data) => Some((record.id, record.expires, data)),
            Err(_) => {
                log::debug!(
                    target: "sealbox::session",
                    "msg=\"session payload malformed\" id_prefix=\"{}\"",
                    id_prefix(&record.id)
                );
                None
            }
        }
    }

    /// Resets to a fresh anonymous session with a new identifier.
    fn fresh(&mut self) {
        self.id = crypto::random_bytes(self.config.identifier_length);
        self.expires = 0;
        self.data.clear();
        self.present = false;
    }
}

/// Short hex prefix of a session id, safe for logs.
fn id_prefix(id: &[u8]) -> String {
    hex::encode(&id[..id.len().min(4)])
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::secret::SecretKey;
    use crate::serializer::JsonSerializer;
    use crate::transport::MemoryTransport;

    use super::*;

    fn test_config() -> Arc<SessionConfig> {
        Arc::new(SessionConfig {
            secret: Some(SecretKey::new("test-secret-key-that-is-long-enough")),
            ..Default::default()
        })
    }

    fn session(transport: Arc<MemoryTransport>) -> Session {
        Session::new(test_config(), transport, &RequestContext::new())
    }

    /// Storage double that records the `close` flag of every save and can
    /// fail the next save on demand.
    #[derive(Clone, Default)]
    struct StorageSpy {
        close_flags: Arc<Mutex<Vec<bool>>>,
        fail_next_save: Arc<Mutex<bool>>,
    }

    #[async_trait]
    impl Storage for StorageSpy {
        async fn open(
            &self,
            _token: &str,
            _lifetime: chrono::Duration,
        ) -> Result<Option<SessionRecord>, SessionError> {
            Ok(None)
        }

        async fn save(&self, record: &SessionRecord, close: bool) -> Result<String, SessionError> {
            let fail = self
                .fail_next_save
                .lock()
                .map(|mut flag| std::mem::take(&mut *flag))
                .unwrap_or(false);
            if fail {
                return Err(SessionError::Storage("save failed".to_owned()));
            }
            if let Ok(mut flags) = self.close_flags.lock() {
                flags.push(close);
            }
            Ok(hex::encode(&record.id))
        }

        async fn destroy(&self, _id: &[u8]) -> Result<(), SessionError> {
            Ok(())
        }
    }

    fn spy_session(storage: StorageSpy, transport: Arc<MemoryTransport>) -> Session {
        Session::with_backends(
            test_config(),
            Arc::new(storage),
            Arc::new(JsonSerializer),
            transport,
            &RequestContext::new(),
        )
    }

    #[tokio::test]
    async fn test_open_without_token_is_anonymous() {
        let mut session = session(Arc::new(MemoryTransport::new()));
        assert!(!session.is_opened());

        let present = session.open().await.unwrap();
        assert!(!present);
        assert!(session.is_opened());
        assert_eq!(session.id().len(), 16);
        assert!(session.data().is_empty());
    }

    #[tokio::test]
    async fn test_open_is_idempotent() {
        let mut session = session(Arc::new(MemoryTransport::new()));

        session.open().await.unwrap();
        let id = session.id().to_vec();

        session.open().await.unwrap();
        assert_eq!(session.id(), id);
    }

    #[tokio::test]
    async fn test_start_saves_anonymous_session() {
        let transport = Arc::new(MemoryTransport::new());
        let mut session = session(transport.clone());

        session.start().await.unwrap();
        assert!(session.is_started());
        assert!(transport.outbound_cookie("id").is_some());

        // Second start is a no-op.
        session.start().await.unwrap();
    }

    #[tokio::test]
    async fn test_set_get_remove() {
        let mut session = session(Arc::new(MemoryTransport::new()));

        session.set("user", "alice").unwrap();
        session.set("visits", 3).unwrap();
        assert_eq!(session.get("user"), Some(&serde_json::json!("alice")));

        assert_eq!(session.remove("visits"), Some(serde_json::json!(3)));
        assert_eq!(session.get("visits"), None);
    }

    #[tokio::test]
    async fn test_save_after_destroy_fails() {
        let mut session = session(Arc::new(MemoryTransport::new()));

        session.destroy().await.unwrap();
        assert!(session.is_destroyed());
        assert_eq!(session.save().await, Err(SessionError::Destroyed));
        assert_eq!(session.regenerate(false).await, Err(SessionError::Destroyed));

        // Destroy stays idempotent.
        session.destroy().await.unwrap();
    }

    #[tokio::test]
    async fn test_destroy_never_opened_session() {
        let transport = Arc::new(MemoryTransport::new());
        let mut session = session(transport.clone());

        session.destroy().await.unwrap();

        let cookie = transport.outbound_cookie("id").unwrap();
        assert!(cookie.value.is_empty());
    }

    #[tokio::test]
    async fn test_set_before_open_survives_save() {
        let transport = Arc::new(MemoryTransport::new());
        let mut session = session(transport.clone());

        // Data staged before the session is ever opened must make it into
        // the saved record.
        session.set("user", "alice").unwrap();
        session.save().await.unwrap();

        let token = transport.outbound_cookie("id").unwrap().value;
        let reply = Arc::new(MemoryTransport::with_token("id", &token));
        let mut reopened = Session::new(test_config(), reply, &RequestContext::new());

        assert!(reopened.open().await.unwrap());
        assert_eq!(reopened.get("user"), Some(&serde_json::json!("alice")));
    }

    #[tokio::test]
    async fn test_regenerate_before_open_id_survives_save() {
        let mut session = session(Arc::new(MemoryTransport::new()));

        session.regenerate(false).await.unwrap();
        let id = session.id().to_vec();
        assert!(!id.is_empty());

        session.save().await.unwrap();
        assert_eq!(session.id(), id);
    }

    #[tokio::test]
    async fn test_save_close_reaches_storage_and_marks_no_cache() {
        let storage = StorageSpy::default();
        let transport = Arc::new(MemoryTransport::new());
        let mut session = spy_session(storage.clone(), transport.clone());

        session.save().await.unwrap();
        assert!(!transport.outbound_cookie("id").unwrap().no_cache);

        session.save_close().await.unwrap();
        assert!(transport.outbound_cookie("id").unwrap().no_cache);
        assert_eq!(*storage.close_flags.lock().unwrap(), vec![false, true]);
    }

    #[tokio::test]
    async fn test_start_not_marked_when_save_fails() {
        let storage = StorageSpy::default();
        *storage.fail_next_save.lock().unwrap() = true;
        let mut session = spy_session(storage.clone(), Arc::new(MemoryTransport::new()));

        assert!(session.start().await.is_err());
        assert!(!session.is_started());

        // A retry after the backend recovers completes the start.
        session.start().await.unwrap();
        assert!(session.is_started());
    }

    #[tokio::test]
    async fn test_regenerate_changes_id() {
        let mut session = session(Arc::new(MemoryTransport::new()));
        session.open().await.unwrap();
        session.set("user", "alice").unwrap();

        let old_id = session.id().to_vec();
        session.regenerate(false).await.unwrap();

        assert_ne!(session.id(), old_id);
        assert_eq!(session.get("user"), Some(&serde_json::json!("alice")));
    }
}
