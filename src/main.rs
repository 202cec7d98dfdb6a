mod alerts;
mod api;
mod config;
mod eta;
mod fleet;
mod geolocation;
mod journey;
mod location;
mod route;
mod scheduler;
mod simulator;
mod traffic;

use clap::Parser;
use config::Config;
use route::directions::OpenRouteService;
use route::RouteProvider;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use traffic::TrafficInsightClient;

#[tokio::main]
async fn main() {
    // A missing .env is normal in production.
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::parse();

    let client = match reqwest::Client::builder()
        .timeout(config.http_timeout())
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, "failed to build HTTP client");
            return;
        }
    };

    let directions_key = config.directions_key();
    if directions_key.is_none() {
        warn!("OPENROUTESERVICE_API_KEY is missing, routes will be straight lines");
    }
    let routes = Arc::new(RouteProvider::new(
        Arc::new(OpenRouteService::new(client.clone(), directions_key)),
        config.route_cache(),
    ));
    let traffic = Arc::new(TrafficInsightClient::from_keys(
        client,
        config.gemini_key(),
        config.groq_key(),
    ));

    let state = api::AppState::new(routes, traffic, config.journey_settings());
    let app = api::router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(%addr, error = %e, "failed to bind");
            return;
        }
    };

    info!("Server is running on http://localhost:{}", config.port);
    if let Err(e) = axum::serve(listener, app).await {
        error!(error = %e, "server exited");
    }
}
