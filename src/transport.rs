//! Cookie transport seam.
//!
//! The core never parses HTTP. It reads the inbound token and hands
//! outbound cookie writes to a [`CookieTransport`] supplied by the
//! embedding framework. [`MemoryTransport`] is an in-tree double for
//! tests and examples.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use crate::config::SessionConfig;
use crate::SessionError;

/// An outbound cookie write.
///
/// Transports must replace a same-named cookie already queued for the
/// response instead of appending a duplicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetCookie {
    /// Cookie name.
    pub name: String,
    /// Opaque token value; empty on the clearing write.
    pub value: String,
    /// `Path` attribute.
    pub path: String,
    /// `Domain` attribute, already filtered through
    /// [`CookieConfig::effective_domain`](crate::CookieConfig::effective_domain).
    pub domain: Option<String>,
    /// `Secure` flag.
    pub secure: bool,
    /// `HttpOnly` flag.
    pub http_only: bool,
    /// Explicit expiry; `None` means a session-scoped cookie.
    pub expires: Option<DateTime<Utc>>,
    /// Terminal write: intermediate caches should not retain the response
    /// beyond delivery.
    pub no_cache: bool,
}

impl SetCookie {
    /// Builds the write for a saved session token.
    pub fn for_save(config: &SessionConfig, token: String, expires: i64, close: bool) -> Self {
        Self {
            name: config.name.clone(),
            value: token,
            path: config.cookie.path.clone(),
            domain: config.cookie.effective_domain().map(str::to_owned),
            secure: config.cookie.secure,
            http_only: config.cookie.http_only,
            expires: if config.cookie.persistent {
                DateTime::from_timestamp(expires, 0)
            } else {
                None
            },
            no_cache: close,
        }
    }

    /// Builds the clearing write issued by `destroy`: empty value with an
    /// immediately-past expiry, forcing client-side removal.
    pub fn clearing(config: &SessionConfig) -> Self {
        Self {
            name: config.name.clone(),
            value: String::new(),
            path: config.cookie.path.clone(),
            domain: config.cookie.effective_domain().map(str::to_owned),
            secure: config.cookie.secure,
            http_only: config.cookie.http_only,
            expires: Some(DateTime::UNIX_EPOCH),
            no_cache: true,
        }
    }

    /// Renders the `Set-Cookie` header value for transports that write
    /// raw headers.
    pub fn header_value(&self) -> String {
        let mut header = format!("{}={}", self.name, self.value);
        header.push_str("; Path=");
        header.push_str(&self.path);
        if let Some(domain) = &self.domain {
            header.push_str("; Domain=");
            header.push_str(domain);
        }
        if let Some(expires) = self.expires {
            header.push_str("; Expires=");
            header.push_str(&expires.format("%a, %d %b %Y %H:%M:%S GMT").to_string());
        }
        if self.secure {
            header.push_str("; Secure");
        }
        if self.http_only {
            header.push_str("; HttpOnly");
        }
        header
    }
}

/// Cookie transport contract.
pub trait CookieTransport: Send + Sync {
    /// Returns the inbound token for the configured cookie name.
    fn token(&self, name: &str) -> Option<String>;

    /// Queues an outbound cookie write, replacing any same-named write
    /// already queued.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` if the response can no longer be
    /// modified (headers already sent, for instance).
    fn set_cookie(&self, cookie: SetCookie) -> Result<(), SessionError>;
}

/// In-memory transport double.
///
/// Holds the inbound cookies of a simulated request and collects outbound
/// writes, honoring the replace-in-place contract.
#[derive(Default)]
pub struct MemoryTransport {
    inbound: RwLock<HashMap<String, String>>,
    outbound: RwLock<Vec<SetCookie>>,
}

impl MemoryTransport {
    /// Creates a transport with no inbound cookies.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a transport carrying one inbound token.
    pub fn with_token(name: &str, token: &str) -> Self {
        let transport = Self::new();
        transport.set_token(name, token);
        transport
    }

    /// Sets an inbound token, as if the client had sent the cookie.
    pub fn set_token(&self, name: &str, token: &str) {
        if let Ok(mut inbound) = self.inbound.write() {
            inbound.insert(name.to_owned(), token.to_owned());
        }
    }

    /// Returns the queued outbound writes.
    pub fn outbound(&self) -> Vec<SetCookie> {
        self.outbound
            .read()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    /// Returns the queued write for `name`, if any.
    pub fn outbound_cookie(&self, name: &str) -> Option<SetCookie> {
        self.outbound()
            .into_iter()
            .find(|cookie| cookie.name == name)
    }
}

impl CookieTransport for MemoryTransport {
    fn token(&self, name: &str) -> Option<String> {
        self.inbound
            .read()
            .ok()
            .and_then(|inbound| inbound.get(name).cloned())
    }

    fn set_cookie(&self, cookie: SetCookie) -> Result<(), SessionError> {
        let mut outbound = self
            .outbound
            .write()
            .map_err(|_| SessionError::Storage("lock poisoned".to_owned()))?;

        if let Some(existing) = outbound.iter_mut().find(|c| c.name == cookie.name) {
            *existing = cookie;
        } else {
            outbound.push(cookie);
        }
        Ok(())
    }
}
