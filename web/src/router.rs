use crate::{
    controller::health_check_controller, middleware::session::gatekeeper, relay, AppState,
};
use axum::{middleware::from_fn_with_state, routing::get, Router};
use tower_http::services::ServeDir;

use utoipa::{
    openapi::security::{ApiKey, ApiKeyValue, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_rapidoc::RapiDoc;

// This is the global definition of our OpenAPI spec. To be a part
// of the rendered spec, a path must be listed here.
#[derive(OpenApi)]
#[openapi(
        info(
            title = "Frontdoor Gateway"
        ),
        paths(
            health_check_controller::health_check,
            relay::handler::relay,
        ),
        modifiers(&SecurityAddon),
        tags(
            (name = "frontdoor", description = "Session gatekeeper and notification event relay")
        )
    )]
struct ApiDoc;

struct SecurityAddon;

// The relay authenticates with the same access token cookie the browser holds
// for page navigation.
impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "cookie_auth",
                SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::with_description(
                    "access_token",
                    "Short-lived access token issued by the auth gateway via Set-Cookie",
                ))),
            )
        }
    }
}

/// Every route the gateway serves, wrapped in the session gatekeeper. The
/// gatekeeper itself lets allow-listed paths (the relay under `/api`, health,
/// login, static assets) through without looking at cookies.
pub fn define_routes(app_state: AppState) -> Router {
    let static_dir = app_state.config.static_dir().to_string();

    Router::new()
        .merge(health_routes())
        .merge(relay_routes(app_state.clone()))
        .merge(RapiDoc::with_openapi("/api-docs/openapi.json", ApiDoc::openapi()).path("/rapidoc"))
        .fallback_service(static_routes(&static_dir))
        .layer(from_fn_with_state(app_state, gatekeeper))
}

fn health_routes() -> Router {
    Router::new().route("/health", get(health_check_controller::health_check))
}

/// Both paths serve the same relay; older front-end builds use the longer one.
fn relay_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/api/sse", get(relay::handler::relay))
        .route("/api/notifications/sse", get(relay::handler::relay))
        .with_state(app_state)
}

// Pages and assets, reached only after the gatekeeper has admitted the request
pub fn static_routes(static_dir: &str) -> ServeDir {
    ServeDir::new(static_dir).append_index_html_on_directories(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_config;
    use axum::{
        body::Body,
        http::{header::LOCATION, Request, StatusCode},
    };
    use tower::ServiceExt;

    fn app() -> Router {
        define_routes(
            AppState::new(test_config("http://127.0.0.1:9", "http://127.0.0.1:9")).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_health_is_public() {
        let response = app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_pages_and_docs_are_guarded() {
        for uri in ["/", "/dashboard", "/rapidoc"] {
            let response = app()
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::FOUND, "{uri}");
            assert_eq!(response.headers()[LOCATION], "/login", "{uri}");
        }
    }

    #[test]
    fn test_openapi_documents_relay_and_health() {
        let openapi = ApiDoc::openapi();
        assert!(openapi.paths.paths.contains_key("/api/sse"));
        assert!(openapi.paths.paths.contains_key("/health"));
    }
}
