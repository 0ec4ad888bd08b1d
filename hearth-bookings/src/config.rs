use std::env;
use std::str::FromStr;

use anyhow::Context;
use rust_decimal::Decimal;

#[derive(Debug, Clone)]
pub struct BookingsConfig {
    pub port: u16,
    pub database_url: String,
    pub internal_token: String,
    pub listings_url: String,
    pub platform_fee_percent: Decimal,
    pub notify_url: Option<String>,
    pub notify_api_key: Option<String>,
    pub analytics_url: Option<String>,
    pub analytics_api_key: Option<String>,
    pub flags_url: Option<String>,
    pub flags_api_key: Option<String>,
}

impl BookingsConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let port = env::var("BOOKINGS_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8082);
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let internal_token = env::var("INTERNAL_TOKEN").context("INTERNAL_TOKEN must be set")?;
        let listings_url =
            env::var("LISTINGS_SERVICE_URL").context("LISTINGS_SERVICE_URL must be set")?;

        let platform_fee_percent = match env::var("PLATFORM_FEE_PERCENT") {
            Ok(raw) => Decimal::from_str(&raw).context("PLATFORM_FEE_PERCENT must be decimal")?,
            Err(_) => Decimal::from(10),
        };

        Ok(Self {
            port,
            database_url,
            internal_token,
            listings_url,
            platform_fee_percent,
            notify_url: env::var("NOTIFY_URL").ok(),
            notify_api_key: env::var("NOTIFY_API_KEY").ok(),
            analytics_url: env::var("ANALYTICS_URL").ok(),
            analytics_api_key: env::var("ANALYTICS_API_KEY").ok(),
            flags_url: env::var("FLAGS_URL").ok(),
            flags_api_key: env::var("FLAGS_API_KEY").ok(),
        })
    }
}
