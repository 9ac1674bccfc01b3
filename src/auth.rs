//! Token credentials and upload authentication.

use axum::body::Body as AxumBody;
use axum::extract::Extension;
use axum::http::{Method, Request, header};
use axum::{middleware, response::Response};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::User;
use crate::error::ApiError;

const BEARER_PREFIX: &str = "Bearer ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    pub token: String,
}

/// Credentials loaded at startup; read-only afterwards.
#[derive(Debug, Default)]
pub struct CredentialStore {
    credentials: Vec<Credential>,
}

impl CredentialStore {
    pub fn new(credentials: Vec<Credential>) -> Self {
        Self { credentials }
    }

    pub fn from_users(users: &[User]) -> Self {
        Self::new(
            users
                .iter()
                .map(|user| Credential {
                    username: user.username.clone(),
                    token: user.token.clone(),
                })
                .collect(),
        )
    }

    /// Returns the username of the first credential holding `token`.
    pub fn lookup(&self, token: &str) -> Option<&str> {
        self.credentials
            .iter()
            .find(|credential| credential.token == token)
            .map(|credential| credential.username.as_str())
    }

    /// Resolves an `Authorization` header value to a username.
    ///
    /// Accepts `Bearer <token>` as well as a bare token.
    pub fn authenticate(&self, header_value: &str) -> Option<&str> {
        if header_value.is_empty() {
            return None;
        }
        let token = header_value
            .strip_prefix(BEARER_PREFIX)
            .unwrap_or(header_value);
        if token.is_empty() {
            return None;
        }
        self.lookup(token)
    }
}

/// Username attached to an authenticated upload request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthenticatedUser(pub String);

/// Rejects POST requests without a known token; every other method passes.
pub async fn auth_middleware(
    Extension(credentials): Extension<Arc<CredentialStore>>,
    mut req: Request<AxumBody>,
    next: middleware::Next,
) -> Result<Response, ApiError> {
    if req.method() != Method::POST {
        return Ok(next.run(req).await);
    }

    let header_value = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    let Some(username) = credentials.authenticate(header_value) else {
        warn!(
            path = req.uri().path(),
            has_header = !header_value.is_empty(),
            "upload rejected: unauthorized"
        );
        return Err(ApiError::Unauthorized);
    };

    debug!(username, "upload authenticated");
    let user = AuthenticatedUser(username.to_string());
    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> CredentialStore {
        CredentialStore::new(vec![
            Credential {
                username: "alice".into(),
                token: "alice-token".into(),
            },
            Credential {
                username: "bob".into(),
                token: "bob-token".into(),
            },
            Credential {
                username: "mallory".into(),
                token: "alice-token".into(),
            },
        ])
    }

    #[test]
    fn lookup_finds_first_match() {
        let store = store();
        assert_eq!(store.lookup("bob-token"), Some("bob"));
        assert_eq!(store.lookup("alice-token"), Some("alice"));
        assert_eq!(store.lookup("unknown"), None);
        assert_eq!(store.lookup(""), None);
    }

    #[test]
    fn accepts_bearer_and_raw_tokens() {
        let store = store();
        assert_eq!(store.authenticate("Bearer bob-token"), Some("bob"));
        assert_eq!(store.authenticate("bob-token"), Some("bob"));
    }

    #[test]
    fn rejects_missing_or_unknown_tokens() {
        let store = store();
        for header_value in [
            "",
            "Bearer ",
            "Bearer",
            "Bearer nope",
            "bearer bob-token",
            "Bearer  bob-token",
            "Basic Ym9iOnRva2Vu",
            "bob-token ",
        ] {
            assert_eq!(
                store.authenticate(header_value),
                None,
                "{header_value:?} should not authenticate"
            );
        }
    }

    #[test]
    fn every_known_token_authenticates_both_ways() {
        let store = store();
        for (token, expected) in [("alice-token", "alice"), ("bob-token", "bob")] {
            assert_eq!(store.authenticate(token), Some(expected));
            assert_eq!(
                store.authenticate(&format!("Bearer {token}")),
                Some(expected)
            );
        }
    }

    #[test]
    fn builds_from_config_users() {
        let users = vec![User {
            username: "ci".into(),
            token: "t0k".into(),
        }];
        let store = CredentialStore::from_users(&users);
        assert_eq!(store.lookup("t0k"), Some("ci"));
        assert_eq!(store.authenticate("Bearer t0k"), Some("ci"));
    }
}
