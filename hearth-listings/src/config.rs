use std::env;

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct ListingsConfig {
    pub port: u16,
    pub database_url: String,
    pub internal_token: String,
}

impl ListingsConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let port = env::var("LISTINGS_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8081);
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let internal_token = env::var("INTERNAL_TOKEN").context("INTERNAL_TOKEN must be set")?;

        Ok(Self {
            port,
            database_url,
            internal_token,
        })
    }
}
