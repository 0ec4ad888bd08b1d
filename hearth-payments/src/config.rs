use std::env;

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct PaymentsConfig {
    pub port: u16,
    pub webhook_secret: String,
    pub internal_token: String,
    pub bookings_url: String,
    /// Optional: enables durable webhook dedup. Without it the in-memory
    /// fallback store is used.
    pub database_url: Option<String>,
}

impl PaymentsConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let port = env::var("PAYMENTS_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8083);
        let webhook_secret =
            env::var("MASHGATE_WEBHOOK_SECRET").context("MASHGATE_WEBHOOK_SECRET must be set")?;
        let internal_token = env::var("INTERNAL_TOKEN").context("INTERNAL_TOKEN must be set")?;
        let bookings_url =
            env::var("BOOKINGS_SERVICE_URL").context("BOOKINGS_SERVICE_URL must be set")?;

        Ok(Self {
            port,
            webhook_secret,
            internal_token,
            bookings_url,
            database_url: env::var("DATABASE_URL").ok(),
        })
    }
}
