use axum::http::{header::AUTHORIZATION, HeaderMap};
use eats_common::UserId;

/// Turns a bearer credential into the user it belongs to. Handlers only ever
/// see the resolved id.
pub trait IdentityProvider: Send + Sync {
    fn resolve(&self, token: &str) -> Option<UserId>;
}

/// Trusts the token to be the user id. Stands in for the hosted identity
/// service in development and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenAsUserId;

impl IdentityProvider for TokenAsUserId {
    fn resolve(&self, token: &str) -> Option<UserId> {
        UserId::from_token(token)
    }
}

pub fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers.get(AUTHORIZATION)?.to_str().ok()
}
