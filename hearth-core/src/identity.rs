use std::collections::HashSet;

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};

use crate::error::ServiceError;

/// Headers the gateway is the sole writer of. Anything arriving from outside
/// with one of these names is stripped before the request is processed.
pub const USER_ID_HEADER: &str = "x-user-id";
pub const TENANT_ID_HEADER: &str = "x-tenant-id";
pub const USER_EMAIL_HEADER: &str = "x-user-email";
pub const USER_SCOPES_HEADER: &str = "x-user-scopes";
pub const INTERNAL_TOKEN_HEADER: &str = "x-internal-token";

pub const TRUSTED_HEADERS: [&str; 5] = [
    USER_ID_HEADER,
    TENANT_ID_HEADER,
    USER_EMAIL_HEADER,
    USER_SCOPES_HEADER,
    INTERNAL_TOKEN_HEADER,
];

pub const SCOPE_BOOKINGS_CREATE: &str = "bookings.create";
pub const SCOPE_BOOKINGS_MANAGE: &str = "bookings.manage";
pub const SCOPE_ADMIN: &str = "admin";

/// The verified identity attached to a request. Built from the trusted
/// headers on every call, never stored.
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: String,
    pub tenant_id: String,
    pub email: String,
    pub scopes: HashSet<String>,
}

impl Principal {
    /// Reconstruct the principal projected by the gateway. Returns `None`
    /// when the request carries no identity (anonymous pass-through).
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let user_id = header_str(headers, USER_ID_HEADER)?;
        let tenant_id = header_str(headers, TENANT_ID_HEADER)?;
        if user_id.is_empty() || tenant_id.is_empty() {
            return None;
        }

        let email = header_str(headers, USER_EMAIL_HEADER).unwrap_or_default();
        let scopes = headers
            .get(USER_SCOPES_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(parse_scopes)
            .unwrap_or_default();

        Some(Self {
            user_id,
            tenant_id,
            email,
            scopes,
        })
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.contains(scope)
    }

    pub fn require_scope(&self, scope: &str) -> Result<(), ServiceError> {
        if self.has_scope(scope) {
            Ok(())
        } else {
            Err(ServiceError::forbidden(format!(
                "missing required scope {scope}"
            )))
        }
    }
}

impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Principal::from_headers(&parts.headers).ok_or(ServiceError::Unauthorized)
    }
}

/// Space-separated scope list, as projected into `x-user-scopes`.
pub fn parse_scopes(raw: &str) -> HashSet<String> {
    raw.split_ascii_whitespace()
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Remove every trusted-identity header. The gateway calls this on each
/// inbound request before anything else happens to it.
pub fn strip_trusted_headers(headers: &mut HeaderMap) {
    for name in TRUSTED_HEADERS {
        headers.remove(name);
    }
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn identity_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(USER_ID_HEADER, HeaderValue::from_static("u-1"));
        headers.insert(TENANT_ID_HEADER, HeaderValue::from_static("t-1"));
        headers.insert(
            USER_EMAIL_HEADER,
            HeaderValue::from_static("guest@example.com"),
        );
        headers.insert(
            USER_SCOPES_HEADER,
            HeaderValue::from_static("bookings.create bookings.manage"),
        );
        headers
    }

    #[test]
    fn principal_round_trips_from_headers() {
        let principal = Principal::from_headers(&identity_headers()).unwrap();
        assert_eq!(principal.user_id, "u-1");
        assert_eq!(principal.tenant_id, "t-1");
        assert_eq!(principal.email, "guest@example.com");
        assert!(principal.has_scope(SCOPE_BOOKINGS_CREATE));
        assert!(principal.has_scope(SCOPE_BOOKINGS_MANAGE));
        assert!(!principal.has_scope(SCOPE_ADMIN));
    }

    #[test]
    fn missing_identity_headers_yield_none() {
        assert!(Principal::from_headers(&HeaderMap::new()).is_none());

        let mut only_user = HeaderMap::new();
        only_user.insert(USER_ID_HEADER, HeaderValue::from_static("u-1"));
        assert!(Principal::from_headers(&only_user).is_none());
    }

    #[test]
    fn scope_parsing_splits_on_whitespace() {
        let scopes = parse_scopes("  a.b   c.d ");
        assert_eq!(scopes.len(), 2);
        assert!(scopes.contains("a.b"));
        assert!(scopes.contains("c.d"));
        assert!(parse_scopes("").is_empty());
    }

    #[test]
    fn strip_removes_every_trusted_header() {
        let mut headers = identity_headers();
        headers.insert(INTERNAL_TOKEN_HEADER, HeaderValue::from_static("secret"));
        headers.insert("accept", HeaderValue::from_static("application/json"));

        strip_trusted_headers(&mut headers);

        for name in TRUSTED_HEADERS {
            assert!(headers.get(name).is_none(), "{name} survived the strip");
        }
        assert!(headers.get("accept").is_some());
    }
}
