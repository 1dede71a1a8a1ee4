//! HTTP Basic Authentication (§6 "Basic auth"): `base64(user ++ ":" ++ pass)`
//! compared against a per-URI credential set. An empty set for a matched
//! URI means "allow all".

use crate::config::BasicAuthConfig;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::collections::HashMap;

/// Per-vhost table of URI → allowed `base64(user:passwd)` tokens.
#[derive(Debug, Default)]
pub struct BasicAuthTable {
    by_uri: HashMap<String, Vec<String>>,
}

impl BasicAuthTable {
    pub fn from_config(entries: &[BasicAuthConfig]) -> Self {
        let by_uri = entries
            .iter()
            .map(|entry| {
                let tokens = entry
                    .auth
                    .iter()
                    .map(|cred| STANDARD.encode(format!("{}:{}", cred.user, cred.passwd)))
                    .collect();
                (entry.uri.clone(), tokens)
            })
            .collect();

        Self { by_uri }
    }

    /// `None` means the URI has no auth requirement at all (not even an
    /// empty allow-all rule). `Some(true)`/`Some(false)` report whether the
    /// `Authorization: Basic <token>` header's token is accepted.
    pub fn check(&self, uri: &str, authorization_header: Option<&str>) -> Option<bool> {
        let tokens = self.by_uri.get(uri)?;
        if tokens.is_empty() {
            return Some(true);
        }

        let token = authorization_header
            .and_then(|h| h.strip_prefix("Basic "))
            .map(str::trim);

        Some(token.is_some_and(|token| tokens.iter().any(|t| t == token)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BasicAuthCredential;

    fn table() -> BasicAuthTable {
        BasicAuthTable::from_config(&[BasicAuthConfig {
            uri: "/admin".to_string(),
            auth: vec![BasicAuthCredential {
                user: "alice".to_string(),
                passwd: "secret".to_string(),
            }],
        }])
    }

    #[test]
    fn unmatched_uri_has_no_requirement() {
        assert_eq!(table().check("/public", None), None);
    }

    #[test]
    fn correct_credentials_pass() {
        let token = STANDARD.encode("alice:secret");
        let header = format!("Basic {token}");
        assert_eq!(table().check("/admin", Some(&header)), Some(true));
    }

    #[test]
    fn missing_or_wrong_credentials_fail() {
        assert_eq!(table().check("/admin", None), Some(false));
        let token = STANDARD.encode("alice:wrong");
        let header = format!("Basic {token}");
        assert_eq!(table().check("/admin", Some(&header)), Some(false));
    }

    #[test]
    fn empty_credential_set_allows_all() {
        let table = BasicAuthTable::from_config(&[BasicAuthConfig {
            uri: "/open".to_string(),
            auth: vec![],
        }]);
        assert_eq!(table.check("/open", None), Some(true));
    }
}
