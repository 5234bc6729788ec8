//! HTTP surface of the gateway: the session gatekeeper middleware wrapped around
//! every route, the notification event relay, health and OpenAPI docs.

use axum::http::{
    header::{CONTENT_TYPE, COOKIE},
    HeaderValue, Method,
};
use domain::gateway::{AuthGateway, NotificationGateway};
use domain::session::PublicPaths;
use log::*;
use service::config::Config;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

mod controller;
mod error;
mod headers;
pub mod middleware;
mod relay;
pub mod router;

#[cfg(test)]
mod test_support;

// Needs to implement Clone to be able to be passed into Router as State
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub public_paths: Arc<PublicPaths>,
    pub auth_gateway: Arc<AuthGateway>,
    pub notification_gateway: Arc<NotificationGateway>,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, domain::Error> {
        let public_paths = PublicPaths::new(&config.public_paths);
        let auth_gateway = AuthGateway::new(&config)?;
        let notification_gateway = NotificationGateway::new(&config)?;

        Ok(Self {
            config,
            public_paths: Arc::new(public_paths),
            auth_gateway: Arc::new(auth_gateway),
            notification_gateway: Arc::new(notification_gateway),
        })
    }
}

pub async fn init_server(app_state: AppState) -> std::io::Result<()> {
    let interface = app_state
        .config
        .interface
        .clone()
        .unwrap_or_else(|| "127.0.0.1".to_string());
    let port = app_state.config.port;

    let cors = CorsLayer::new()
        .allow_origin(allowed_origins(&app_state.config))
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, COOKIE]);

    let listener = TcpListener::bind((interface.as_str(), port)).await?;
    info!(
        "Server starting... listening for connections on http://{}",
        listener.local_addr()?
    );

    axum::serve(listener, router::define_routes(app_state).layer(cors))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

fn allowed_origins(config: &Config) -> Vec<HeaderValue> {
    config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(err) => {
                warn!("Ignoring invalid CORS origin {origin}: {err:?}");
                None
            }
        })
        .collect()
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {err:?}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received, draining connections");
}
