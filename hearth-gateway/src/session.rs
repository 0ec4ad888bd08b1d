use std::time::{Duration, Instant};

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Name of the session cookie issued by the OIDC login flow.
pub const SESSION_COOKIE: &str = "hearth_session";

const JWKS_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    pub tid: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub scope: String,
    pub exp: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthFailure {
    #[error("session expired")]
    Expired,
    #[error("invalid session")]
    Invalid,
}

struct JwksSnapshot {
    keys: Option<JwkSet>,
    fetched_at: Option<Instant>,
}

/// Verifies session tokens. Keys come from the identity provider's JWKS,
/// cached behind a read/write lock with a 5-minute TTL; local verification
/// failures fall back to the provider's HTTP validation endpoint. A
/// symmetric dev secret can stand in for the JWKS in non-production runs.
pub struct SessionVerifier {
    idp_url: String,
    http: reqwest::Client,
    jwks: RwLock<JwksSnapshot>,
    dev_secret: Option<String>,
}

impl SessionVerifier {
    pub fn new(idp_url: String, dev_secret: Option<String>) -> anyhow::Result<Self> {
        if dev_secret.is_some() {
            warn!("GATEWAY_DEV_JWT_SECRET is set; do not enable in production");
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;

        Ok(Self {
            idp_url: idp_url.trim_end_matches('/').to_owned(),
            http,
            jwks: RwLock::new(JwksSnapshot {
                keys: None,
                fetched_at: None,
            }),
            dev_secret,
        })
    }

    pub async fn verify(&self, token: &str) -> Result<SessionClaims, AuthFailure> {
        if let Some(secret) = &self.dev_secret {
            let key = DecodingKey::from_secret(secret.as_bytes());
            match decode_claims(token, &key, Algorithm::HS256) {
                Ok(claims) => return Ok(claims),
                Err(AuthFailure::Expired) => return Err(AuthFailure::Expired),
                Err(AuthFailure::Invalid) => {}
            }
        }

        if let Some(kid) = decode_header(token).ok().and_then(|h| h.kid) {
            match self.verify_with_jwks(&kid, token).await {
                Ok(claims) => return Ok(claims),
                Err(AuthFailure::Expired) => return Err(AuthFailure::Expired),
                Err(AuthFailure::Invalid) => {
                    debug!("local verification failed, trying validation endpoint")
                }
            }
        }

        self.validate_remote(token).await
    }

    async fn verify_with_jwks(&self, kid: &str, token: &str) -> Result<SessionClaims, AuthFailure> {
        if let Some(key) = self.cached_key(kid).await {
            return decode_claims(token, &key, Algorithm::RS256);
        }

        self.refresh_jwks().await?;
        let key = self.cached_key(kid).await.ok_or(AuthFailure::Invalid)?;
        decode_claims(token, &key, Algorithm::RS256)
    }

    /// Snapshot lookup under the read lock; `None` when the cache is stale
    /// or the key id is unknown.
    async fn cached_key(&self, kid: &str) -> Option<DecodingKey> {
        let snapshot = self.jwks.read().await;
        let fresh = snapshot
            .fetched_at
            .is_some_and(|at| at.elapsed() <= JWKS_TTL);
        if !fresh {
            return None;
        }
        let jwk = snapshot.keys.as_ref()?.find(kid)?;
        DecodingKey::from_jwk(jwk).ok()
    }

    /// Fetch outside the lock, then swap the whole key set at once.
    async fn refresh_jwks(&self) -> Result<(), AuthFailure> {
        let url = format!("{}/.well-known/jwks.json", self.idp_url);
        let keys = self
            .http
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|err| {
                warn!("jwks fetch failed: {}", err);
                AuthFailure::Invalid
            })?
            .json::<JwkSet>()
            .await
            .map_err(|err| {
                warn!("jwks response malformed: {}", err);
                AuthFailure::Invalid
            })?;

        let mut snapshot = self.jwks.write().await;
        snapshot.keys = Some(keys);
        snapshot.fetched_at = Some(Instant::now());
        Ok(())
    }

    async fn validate_remote(&self, token: &str) -> Result<SessionClaims, AuthFailure> {
        #[derive(Deserialize)]
        struct ValidateResponse {
            active: bool,
            #[serde(default)]
            sub: String,
            #[serde(default)]
            tid: String,
            #[serde(default)]
            email: String,
            #[serde(default)]
            scope: String,
            #[serde(default)]
            exp: usize,
        }

        let url = format!("{}/oauth2/validate", self.idp_url);
        let response = self
            .http
            .post(&url)
            .json(&json!({ "token": token }))
            .send()
            .await
            .map_err(|_| AuthFailure::Invalid)?;

        if !response.status().is_success() {
            return Err(AuthFailure::Invalid);
        }

        let validated: ValidateResponse =
            response.json().await.map_err(|_| AuthFailure::Invalid)?;
        if !validated.active {
            return Err(AuthFailure::Invalid);
        }

        Ok(SessionClaims {
            sub: validated.sub,
            tid: validated.tid,
            email: validated.email,
            scope: validated.scope,
            exp: validated.exp,
        })
    }
}

fn decode_claims(
    token: &str,
    key: &DecodingKey,
    algorithm: Algorithm,
) -> Result<SessionClaims, AuthFailure> {
    let validation = Validation::new(algorithm);
    match decode::<SessionClaims>(token, key, &validation) {
        Ok(data) => Ok(data.claims),
        Err(err) if matches!(err.kind(), ErrorKind::ExpiredSignature) => Err(AuthFailure::Expired),
        Err(_) => Err(AuthFailure::Invalid),
    }
}
