use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::{header, HeaderValue, Method},
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use tracing::debug;

use hearth_core::identity::{
    parse_scopes, strip_trusted_headers, SCOPE_ADMIN, TENANT_ID_HEADER, USER_EMAIL_HEADER,
    USER_ID_HEADER, USER_SCOPES_HEADER,
};
use hearth_core::ServiceError;

use crate::config::GatewayConfig;
use crate::session::{SessionClaims, SESSION_COOKIE};
use crate::state::GatewayState;

const BODY_LIMIT: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct Route {
    pub prefix: String,
    pub upstream: String,
    /// Leading path segment removed before forwarding. `/api` for the
    /// service upstreams; the payments service mounts its webhook entry
    /// point at the root, so its whole prefix goes.
    pub strip: String,
    pub required_scope: Option<&'static str>,
}

/// Static prefix-to-upstream table; dispatch picks the longest matching
/// prefix, with `/` as the web catch-all.
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn from_config(config: &GatewayConfig) -> Self {
        let up = &config.upstreams;
        let route = |prefix: &str, upstream: &str, strip: &str, scope: Option<&'static str>| Route {
            prefix: prefix.to_owned(),
            upstream: upstream.trim_end_matches('/').to_owned(),
            strip: strip.to_owned(),
            required_scope: scope,
        };

        Self {
            routes: vec![
                route("/api/auth", &config.idp_url, "/api", None),
                route("/api/listings", &up.listings, "/api", None),
                route("/api/bookings", &up.bookings, "/api", None),
                route("/api/payments", &up.payments, "/api/payments", None),
                route("/api/reviews", &up.reviews, "/api", None),
                route("/api/admin", &up.admin, "/api", Some(SCOPE_ADMIN)),
                route("/api/search", &up.search, "/api", None),
                route("/", &up.web, "", None),
            ],
        }
    }

    pub fn resolve(&self, path: &str) -> Option<&Route> {
        self.routes
            .iter()
            .filter(|route| path.starts_with(&route.prefix))
            .max_by_key(|route| route.prefix.len())
    }
}

/// Anonymous pass-through surface: listing reads, the single-booking read,
/// health, the auth endpoints, the signed payment webhooks, and everything
/// outside `/api` (the web UI).
pub fn is_public(method: &Method, path: &str) -> bool {
    if !path.starts_with("/api") {
        return true;
    }
    if path == "/api/health" {
        return true;
    }
    if path == "/api/auth" || path.starts_with("/api/auth/") {
        return true;
    }
    if path.starts_with("/api/payments/webhooks") {
        return true;
    }
    if *method == Method::GET && path.starts_with("/api/listings") {
        return true;
    }
    if *method == Method::GET {
        // GET /api/bookings/{id} is public; the host list and sub-resources
        // are not.
        if let Some(rest) = path.strip_prefix("/api/bookings/") {
            return !rest.is_empty() && !rest.contains('/') && rest != "host";
        }
    }
    false
}

pub async fn proxy_handler(State(state): State<GatewayState>, request: Request) -> Response {
    match forward(state, request).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn forward(state: GatewayState, request: Request) -> Result<Response, ServiceError> {
    let (mut parts, body) = request.into_parts();

    // Nothing from outside may impersonate the gateway, ever.
    strip_trusted_headers(&mut parts.headers);

    let path = parts.uri.path().to_owned();
    let query = parts.uri.query().map(str::to_owned);
    let public = is_public(&parts.method, &path);

    let token = CookieJar::from_headers(&parts.headers)
        .get(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_owned());

    let claims: Option<SessionClaims> = match token {
        Some(token) => match state.verifier.verify(&token).await {
            Ok(claims) => Some(claims),
            Err(failure) if public => {
                debug!("anonymous pass-through, session rejected: {}", failure);
                None
            }
            Err(_) => return Err(ServiceError::Unauthorized),
        },
        None if public => None,
        None => return Err(ServiceError::Unauthorized),
    };

    let route = state
        .routes
        .resolve(&path)
        .ok_or_else(|| ServiceError::not_found("no route"))?;

    if let Some(scope) = route.required_scope {
        let claims = claims.as_ref().ok_or(ServiceError::Unauthorized)?;
        if !parse_scopes(&claims.scope).contains(scope) {
            return Err(ServiceError::forbidden(format!(
                "missing required scope {scope}"
            )));
        }
    }

    if let Some(claims) = &claims {
        project_identity(&mut parts.headers, claims)?;
    }
    parts.headers.remove(header::HOST);

    let rewritten = if route.strip.is_empty() {
        path.as_str()
    } else {
        path.strip_prefix(route.strip.as_str()).unwrap_or(path.as_str())
    };
    let url = match &query {
        Some(query) => format!("{}{}?{}", route.upstream, rewritten, query),
        None => format!("{}{}", route.upstream, rewritten),
    };

    let body = to_bytes(body, BODY_LIMIT)
        .await
        .map_err(|_| ServiceError::bad_request("request body too large"))?;

    let upstream_response = state
        .http
        .request(parts.method.clone(), &url)
        .headers(parts.headers.clone())
        .body(body)
        .send()
        .await
        .map_err(|err| {
            if err.is_timeout() {
                ServiceError::UpstreamTimeout(format!("{url}: {err}"))
            } else {
                ServiceError::Upstream(format!("{url}: {err}"))
            }
        })?;

    let status = upstream_response.status();
    let headers = upstream_response.headers().clone();
    let bytes = upstream_response
        .bytes()
        .await
        .map_err(|err| ServiceError::Upstream(format!("{url}: {err}")))?;

    let mut builder = Response::builder().status(status);
    if let Some(response_headers) = builder.headers_mut() {
        for (name, value) in headers.iter() {
            if !is_hop_by_hop(name.as_str()) {
                response_headers.insert(name.clone(), value.clone());
            }
        }
    }
    builder
        .body(Body::from(bytes))
        .map_err(|err| ServiceError::internal(err))
}

fn project_identity(
    headers: &mut axum::http::HeaderMap,
    claims: &SessionClaims,
) -> Result<(), ServiceError> {
    let value = |raw: &str| {
        HeaderValue::from_str(raw)
            .map_err(|_| ServiceError::internal("claim not representable as header"))
    };
    headers.insert(USER_ID_HEADER, value(&claims.sub)?);
    headers.insert(TENANT_ID_HEADER, value(&claims.tid)?);
    headers.insert(USER_EMAIL_HEADER, value(&claims.email)?);
    headers.insert(USER_SCOPES_HEADER, value(&claims.scope)?);
    Ok(())
}

fn is_hop_by_hop(name: &str) -> bool {
    matches!(
        name,
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
            | "content-length"
    )
}
