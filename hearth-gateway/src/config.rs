use std::env;

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub port: u16,
    pub idp_url: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: Option<String>,
    pub dev_jwt_secret: Option<String>,
    pub upstreams: Upstreams,
}

/// One URL per backend; defaults point at the local development ports.
#[derive(Debug, Clone)]
pub struct Upstreams {
    pub listings: String,
    pub bookings: String,
    pub payments: String,
    pub reviews: String,
    pub admin: String,
    pub search: String,
    pub web: String,
}

fn env_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_owned())
}

impl GatewayConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let port = env::var("GATEWAY_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8080);
        let idp_url = env::var("IDP_URL").context("IDP_URL must be set")?;

        Ok(Self {
            port,
            idp_url,
            client_id: env::var("IDP_CLIENT_ID").ok(),
            client_secret: env::var("IDP_CLIENT_SECRET").ok(),
            redirect_uri: env::var("IDP_REDIRECT_URI").ok(),
            dev_jwt_secret: env::var("GATEWAY_DEV_JWT_SECRET").ok(),
            upstreams: Upstreams {
                listings: env_or("LISTINGS_SERVICE_URL", "http://localhost:8081"),
                bookings: env_or("BOOKINGS_SERVICE_URL", "http://localhost:8082"),
                payments: env_or("PAYMENTS_SERVICE_URL", "http://localhost:8083"),
                reviews: env_or("REVIEWS_SERVICE_URL", "http://localhost:8084"),
                admin: env_or("ADMIN_SERVICE_URL", "http://localhost:8085"),
                search: env_or("SEARCH_SERVICE_URL", "http://localhost:8086"),
                web: env_or("WEB_URL", "http://localhost:3000"),
            },
        })
    }
}
