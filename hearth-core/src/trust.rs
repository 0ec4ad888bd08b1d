use axum::http::HeaderMap;
use subtle::ConstantTimeEq;

use crate::error::ServiceError;
use crate::identity::{INTERNAL_TOKEN_HEADER, TENANT_ID_HEADER};

/// Guard for privileged service-to-service endpoints. The caller must present
/// the shared internal token (compared in constant time) and an explicit
/// tenant header; returns the tenant under which the operation runs.
pub fn require_internal(headers: &HeaderMap, expected_token: &str) -> Result<String, ServiceError> {
    let presented = headers
        .get(INTERNAL_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ServiceError::forbidden("internal token required"))?;

    if !bool::from(presented.as_bytes().ct_eq(expected_token.as_bytes())) {
        return Err(ServiceError::forbidden("internal token required"));
    }

    let tenant = headers
        .get(TENANT_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ServiceError::forbidden("tenant header required"))?;

    Ok(tenant.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const SECRET: &str = "internal-secret";

    fn headers(token: Option<&'static str>, tenant: Option<&'static str>) -> HeaderMap {
        let mut h = HeaderMap::new();
        if let Some(token) = token {
            h.insert(INTERNAL_TOKEN_HEADER, HeaderValue::from_static(token));
        }
        if let Some(tenant) = tenant {
            h.insert(TENANT_ID_HEADER, HeaderValue::from_static(tenant));
        }
        h
    }

    #[test]
    fn accepts_matching_token_and_tenant() {
        let tenant = require_internal(&headers(Some(SECRET), Some("t-1")), SECRET).unwrap();
        assert_eq!(tenant, "t-1");
    }

    #[test]
    fn rejects_missing_token() {
        assert!(require_internal(&headers(None, Some("t-1")), SECRET).is_err());
    }

    #[test]
    fn rejects_wrong_token() {
        assert!(require_internal(&headers(Some("nope"), Some("t-1")), SECRET).is_err());
    }

    #[test]
    fn rejects_missing_or_empty_tenant() {
        assert!(require_internal(&headers(Some(SECRET), None), SECRET).is_err());
        assert!(require_internal(&headers(Some(SECRET), Some("")), SECRET).is_err());
    }
}
