//! Admin identity check for `/api/*` routes
//!
//! Every write endpoint requires a bearer token that resolves to an
//! identity with admin privilege. The check happens before the handler
//! runs, so a rejected request never reaches the store.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use courtstats_common::config::AuthConfig;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::AppState;

/// A caller whose credentials checked out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub subject: String,
    pub is_admin: bool,
}

/// Resolves a bearer token to a verified identity
pub trait IdentityVerifier: Send + Sync {
    /// `None` when the token is unknown
    fn verify(&self, token: &str) -> Option<Identity>;
}

/// Configured allowlist of token digests.
///
/// Only the hex SHA-256 of each token is kept in configuration.
#[derive(Debug, Clone, Default)]
pub struct TokenAllowlist {
    /// sha256 hex → subject
    tokens: HashMap<String, String>,
    admins: HashSet<String>,
}

impl TokenAllowlist {
    pub fn from_config(config: &AuthConfig) -> Self {
        let tokens = config
            .tokens
            .iter()
            .map(|t| (t.sha256.trim().to_lowercase(), t.subject.clone()))
            .collect();
        let admins = config.admin_subjects.iter().cloned().collect();
        Self { tokens, admins }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Hex SHA-256 of a token, the form stored in `[auth] tokens`
pub fn token_digest(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}

impl IdentityVerifier for TokenAllowlist {
    fn verify(&self, token: &str) -> Option<Identity> {
        let subject = self.tokens.get(&token_digest(token))?;
        Some(Identity {
            subject: subject.clone(),
            is_admin: self.admins.contains(subject),
        })
    }
}

/// Authentication middleware
///
/// Missing or malformed `Authorization: Bearer` header → 401, unknown
/// token → 401, known non-admin → 403. `verifier = None` (auth disabled)
/// passes everything through.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(verifier) = state.verifier.as_ref() else {
        return Ok(next.run(request).await);
    };

    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::Unauthorized("missing bearer token".into()))?;

    let identity = verifier.verify(token).ok_or_else(|| {
        warn!(path = %request.uri().path(), "Rejected unknown bearer token");
        ApiError::Unauthorized("unknown token".into())
    })?;

    if !identity.is_admin {
        warn!(subject = %identity.subject, path = %request.uri().path(), "Non-admin caller rejected");
        return Err(ApiError::Forbidden(format!(
            "{} is not an administrator",
            identity.subject
        )));
    }

    debug!(subject = %identity.subject, "Admin request authorized");
    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use courtstats_common::config::TokenEntry;

    fn config() -> AuthConfig {
        AuthConfig {
            disabled: false,
            admin_subjects: vec!["ops".into()],
            tokens: vec![
                TokenEntry {
                    subject: "ops".into(),
                    sha256: token_digest("ops-secret").to_uppercase(),
                },
                TokenEntry {
                    subject: "viewer".into(),
                    sha256: token_digest("viewer-secret"),
                },
            ],
        }
    }

    #[test]
    fn test_digest_is_hex_sha256() {
        assert_eq!(
            token_digest("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_allowlist_verifies_known_tokens() {
        let allowlist = TokenAllowlist::from_config(&config());
        assert_eq!(allowlist.len(), 2);

        let ops = allowlist.verify("ops-secret").unwrap();
        assert_eq!(ops.subject, "ops");
        assert!(ops.is_admin);

        let viewer = allowlist.verify("viewer-secret").unwrap();
        assert!(!viewer.is_admin);

        assert!(allowlist.verify("guess").is_none());
    }
}
