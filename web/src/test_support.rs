//! Helpers shared by the web layer's tests.

use axum::Router;
use clap::Parser;
use service::config::Config;
use std::net::SocketAddr;
use tokio::net::TcpListener;

/// Config pointing both upstream services at the given base URLs, parsed from an
/// empty argv so the test harness's own arguments never reach clap.
pub(crate) fn test_config(auth_base_url: &str, notification_base_url: &str) -> Config {
    Config::try_parse_from(["frontdoor"])
        .unwrap()
        .set_auth_base_url(auth_base_url.to_string())
        .set_notification_base_url(notification_base_url.to_string())
}

/// Serves `router` on an ephemeral localhost port for the lifetime of the test runtime.
pub(crate) async fn spawn_server(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}
