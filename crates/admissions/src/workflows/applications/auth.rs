use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts, HeaderMap, StatusCode},
    response::Response,
};
use tracing::debug;

use super::response::failure;

/// Authenticated staff member acting on an application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaffIdentity {
    staff_id: String,
}

impl StaffIdentity {
    pub fn new(staff_id: impl Into<String>) -> Self {
        Self {
            staff_id: staff_id.into(),
        }
    }

    pub fn staff_id(&self) -> &str {
        &self.staff_id
    }
}

/// Bearer tokens issued to staff, keyed by token.
#[derive(Debug, Clone, Default)]
pub struct StaffDirectory {
    tokens: HashMap<String, String>,
}

impl StaffDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, staff_id: impl Into<String>, token: impl Into<String>) -> Self {
        self.insert(staff_id, token);
        self
    }

    pub fn insert(&mut self, staff_id: impl Into<String>, token: impl Into<String>) {
        self.tokens.insert(token.into(), staff_id.into());
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn authenticate(&self, token: &str) -> Option<StaffIdentity> {
        self.tokens.get(token).map(StaffIdentity::new)
    }

    /// Resolve the `Authorization: Bearer <token>` header, if any.
    pub fn identify(&self, headers: &HeaderMap) -> Option<StaffIdentity> {
        let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
        let token = value
            .strip_prefix("Bearer ")
            .or_else(|| value.strip_prefix("bearer "))?
            .trim();
        if token.is_empty() {
            return None;
        }
        self.authenticate(token)
    }
}

impl<S, T> FromIterator<(S, T)> for StaffDirectory
where
    S: Into<String>,
    T: Into<String>,
{
    fn from_iter<It: IntoIterator<Item = (S, T)>>(iter: It) -> Self {
        let mut directory = Self::new();
        for (staff_id, token) in iter {
            directory.insert(staff_id, token);
        }
        directory
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for StaffIdentity
where
    Arc<StaffDirectory>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let directory = Arc::<StaffDirectory>::from_ref(state);
        match directory.identify(&parts.headers) {
            Some(identity) => Ok(identity),
            None => {
                debug!(path = %parts.uri.path(), "rejected request without valid staff token");
                Err(failure(
                    StatusCode::UNAUTHORIZED,
                    "Not authorized to access this route",
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_tokens_resolve_to_staff() {
        let directory = StaffDirectory::new().with_token("registrar", "s3cret");
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer s3cret"),
        );

        let identity = directory.identify(&headers).expect("known token");
        assert_eq!(identity.staff_id(), "registrar");
    }

    #[test]
    fn unknown_or_malformed_tokens_are_rejected() {
        let directory = StaffDirectory::new().with_token("registrar", "s3cret");
        let mut headers = HeaderMap::new();
        assert!(directory.identify(&headers).is_none());

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("s3cret"));
        assert!(directory.identify(&headers).is_none());

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer nope"));
        assert!(directory.identify(&headers).is_none());

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert!(directory.identify(&headers).is_none());
    }
}
