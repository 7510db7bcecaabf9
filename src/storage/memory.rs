//! In-memory server-side session storage.
//!
//! Suitable for development, testing, and single-instance deployments.
//! The token only encodes the session id; the ciphertext and tag live in
//! a map keyed by the hex id. Clone handles share the same map, so one
//! instance can serve every request of a process.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{Duration, Utc};

use super::{decode_part, encode_part, SessionRecord, Storage};
use crate::SessionError;

struct StoredRecord {
    expires: i64,
    ciphertext: Vec<u8>,
    tag: Vec<u8>,
    last_access: i64,
}

/// In-memory storage backend.
///
/// # Note
///
/// Records are lost when the process restarts, which clients experience
/// as a fresh anonymous session.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    records: Arc<RwLock<HashMap<String, StoredRecord>>>,
}

impl MemoryStorage {
    /// Creates a new in-memory storage backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of records currently stored.
    pub fn len(&self) -> usize {
        self.records.read().map(|guard| guard.len()).unwrap_or(0)
    }

    /// Returns true if there are no records stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if a record exists for `id`.
    pub fn contains(&self, id: &[u8]) -> bool {
        self.records
            .read()
            .map(|guard| guard.contains_key(&hex::encode(id)))
            .unwrap_or(false)
    }

    /// Returns the last-access timestamp recorded for `id` by the `start`
    /// touch hook (or the initial save).
    pub fn last_access(&self, id: &[u8]) -> Option<i64> {
        self.records
            .read()
            .ok()
            .and_then(|guard| guard.get(&hex::encode(id)).map(|r| r.last_access))
    }

    /// Removes expired records.
    ///
    /// Returns the number of records pruned. Expiry is also checked
    /// lazily on `open`, so this is maintenance, not correctness.
    #[allow(clippy::significant_drop_tightening)]
    pub fn prune_expired(&self) -> Result<u64, SessionError> {
        let mut records = self
            .records
            .write()
            .map_err(|_| SessionError::Storage("lock poisoned".to_owned()))?;

        let now = Utc::now().timestamp();
        let before_count = records.len();

        records.retain(|_, record| record.expires > now);

        let pruned = before_count.saturating_sub(records.len());
        Ok(u64::try_from(pruned).unwrap_or(u64::MAX))
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn open(
        &self,
        token: &str,
        _lifetime: Duration,
    ) -> Result<Option<SessionRecord>, SessionError> {
        let Some(id) = decode_part(token) else {
            return Ok(None);
        };

        let records = self
            .records
            .read()
            .map_err(|_| SessionError::Storage("lock poisoned".to_owned()))?;

        let now = Utc::now().timestamp();
        Ok(records.get(&hex::encode(&id)).and_then(|record| {
            // Lazy eviction; prune_expired does the bulk cleanup.
            if record.expires <= now {
                return None;
            }
            Some(SessionRecord {
                id: id.clone(),
                expires: record.expires,
                ciphertext: record.ciphertext.clone(),
                tag: record.tag.clone(),
            })
        }))
    }

    async fn save(&self, record: &SessionRecord, _close: bool) -> Result<String, SessionError> {
        let stored = StoredRecord {
            expires: record.expires,
            ciphertext: record.ciphertext.clone(),
            tag: record.tag.clone(),
            last_access: Utc::now().timestamp(),
        };

        self.records
            .write()
            .map_err(|_| SessionError::Storage("lock poisoned".to_owned()))?
            .insert(hex::encode(&record.id), stored);

        Ok(encode_part(&record.id))
    }

    async fn destroy(&self, id: &[u8]) -> Result<(), SessionError> {
        self.records
            .write()
            .map_err(|_| SessionError::Storage("lock poisoned".to_owned()))?
            .remove(&hex::encode(id));

        Ok(())
    }

    async fn start(&self, id: &[u8]) -> Result<(), SessionError> {
        if let Some(record) = self
            .records
            .write()
            .map_err(|_| SessionError::Storage("lock poisoned".to_owned()))?
            .get_mut(&hex::encode(id))
        {
            record.last_access = Utc::now().timestamp();
        }

        Ok(())
    }
}
