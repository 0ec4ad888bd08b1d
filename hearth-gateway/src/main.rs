use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use hearth_gateway::config::GatewayConfig;
use hearth_gateway::proxy::RouteTable;
use hearth_gateway::session::SessionVerifier;
use hearth_gateway::{app, GatewayState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = GatewayConfig::from_env()?;

    let verifier = SessionVerifier::new(config.idp_url.clone(), config.dev_jwt_secret.clone())
        .context("failed to build session verifier")?;
    let routes = RouteTable::from_config(&config);
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .context("failed to build upstream client")?;

    let state = GatewayState {
        verifier: Arc::new(verifier),
        routes: Arc::new(routes),
        http,
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("gateway listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("failed to bind listener")?;
    axum::serve(listener, app(state)).await?;

    Ok(())
}
