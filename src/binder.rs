//! Identity binding: derives the binding key from request attributes.
//!
//! The binding key is folded into the integrity tag only; it is never
//! encrypted, stored, or transmitted. A token replayed from a different
//! browser, address, or protocol then fails tag verification and degrades
//! to an anonymous session. This is a mitigation against session fixation
//! and theft, not a hard guarantee: every check is optional because
//! proxies and mobile networks rotate addresses and user agents
//! legitimately.

use crate::config::CheckConfig;

/// Request attributes the session core consumes.
///
/// Extracting these from the HTTP layer is the embedding framework's job;
/// in particular, client-address resolution through trusted proxy headers
/// must happen before the value lands here.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// TLS session identifier, when the listener exposes one.
    pub ssl_session_id: Option<String>,
    /// `User-Agent` header value.
    pub user_agent: Option<String>,
    /// URL scheme (`http` or `https`).
    pub scheme: Option<String>,
    /// Resolved client address.
    pub remote_addr: Option<String>,
}

impl RequestContext {
    /// Creates an empty request context.
    pub fn new() -> Self {
        Self::default()
    }
}

/// Derives the binding key: a deterministic concatenation, in fixed order,
/// of each enabled and present attribute.
pub fn binding_key(ctx: &RequestContext, check: &CheckConfig) -> String {
    let mut key = String::new();

    let mut fold = |enabled: bool, value: &Option<String>| {
        if enabled {
            if let Some(value) = value {
                key.push_str(value);
                // Field separator so adjacent attributes cannot alias.
                key.push('\u{1f}');
            }
        }
    };

    fold(check.ssi, &ctx.ssl_session_id);
    fold(check.ua, &ctx.user_agent);
    fold(check.scheme, &ctx.scheme);
    fold(check.addr, &ctx.remote_addr);

    key
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> RequestContext {
        RequestContext {
            ssl_session_id: Some("tls-abc".to_owned()),
            user_agent: Some("Mozilla/5.0".to_owned()),
            scheme: Some("https".to_owned()),
            remote_addr: Some("203.0.113.7".to_owned()),
        }
    }

    #[test]
    fn test_deterministic() {
        let check = CheckConfig::default();
        assert_eq!(binding_key(&ctx(), &check), binding_key(&ctx(), &check));
    }

    #[test]
    fn test_enabled_attribute_changes_key() {
        let check = CheckConfig::default();
        let base = binding_key(&ctx(), &check);

        let mut other = ctx();
        other.user_agent = Some("curl/8.0".to_owned());
        assert_ne!(binding_key(&other, &check), base);
    }

    #[test]
    fn test_disabled_attribute_is_ignored() {
        let check = CheckConfig {
            addr: false,
            ..Default::default()
        };
        let base = binding_key(&ctx(), &check);

        let mut other = ctx();
        other.remote_addr = Some("198.51.100.9".to_owned());
        assert_eq!(binding_key(&other, &check), base);
    }

    #[test]
    fn test_missing_attribute_is_skipped() {
        let check = CheckConfig {
            ssi: true,
            ..Default::default()
        };
        let mut no_tls = ctx();
        no_tls.ssl_session_id = None;

        // Absent attribute contributes nothing rather than failing.
        assert_ne!(binding_key(&ctx(), &check), binding_key(&no_tls, &check));
    }

    #[test]
    fn test_all_checks_disabled_yields_empty_key() {
        let check = CheckConfig {
            ssi: false,
            ua: false,
            scheme: false,
            addr: false,
        };
        assert!(binding_key(&ctx(), &check).is_empty());
    }
}
