use crate::error::Error;
use crate::headers::{cookie_header, origin_header};
use crate::AppState;
use axum::{
    body::Body,
    extract::State,
    http::{
        header::{CACHE_CONTROL, CONNECTION, CONTENT_TYPE, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use domain::gateway::EventStream;
use domain::session::{mark_secure, SessionStatus, SessionTokens};
use log::*;

const DEFAULT_CONTENT_TYPE: &str = "text/event-stream; charset=utf-8";

/// GET relay the caller's notification event stream from the upstream service
#[utoipa::path(
    get,
    path = "/api/sse",
    responses(
        (
            status = 200,
            description = "Upstream event stream, forwarded byte for byte",
            body = String,
            content_type = "text/event-stream"
        ),
        (status = 401, description = "No access token cookie on the request"),
        (status = 502, description = "Notification service unreachable"),
    ),
    security(
        ("cookie_auth" = [])
    )
)]
pub(crate) async fn relay(
    State(app_state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, Error> {
    let config = &app_state.config;

    let jar = CookieJar::from_headers(&headers);
    let status =
        SessionTokens::new(jar.get(config.access_token_cookie()).map(Cookie::value), None)
            .status();
    if status != SessionStatus::Authenticated {
        debug!("Rejecting event stream request without an access token");
        return Ok((StatusCode::UNAUTHORIZED, "Unauthorized").into_response());
    }

    let cookie = cookie_header(&headers).unwrap_or_default();
    let origin = origin_header(&headers, config.gateway_origin());

    let stream = app_state
        .notification_gateway
        .open_stream(&cookie, origin.as_deref())
        .await?;

    debug!("Relaying notification event stream");

    Ok(event_stream_response(stream, config.is_production()))
}

/// Wraps the upstream stream in a response that proxies and intermediaries will
/// pass through without buffering or re-encoding. Cookies set by the upstream
/// are marked `Secure` when `secure_cookies` is set.
fn event_stream_response(mut stream: EventStream, secure_cookies: bool) -> Response {
    let content_type = stream
        .content_type
        .take()
        .and_then(|ct| HeaderValue::from_str(&ct).ok())
        .unwrap_or(HeaderValue::from_static(DEFAULT_CONTENT_TYPE));
    let set_cookies = std::mem::take(&mut stream.set_cookies);

    let mut response = Response::new(Body::from_stream(stream.into_body()));
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, content_type);
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-transform"),
    );
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));

    for set_cookie in set_cookies {
        let set_cookie = match secure_cookies {
            true => mark_secure(&set_cookie),
            false => set_cookie,
        };
        match HeaderValue::from_str(&set_cookie) {
            Ok(value) => {
                headers.append(SET_COOKIE, value);
            }
            Err(err) => warn!("Dropping invalid Set-Cookie from notification service: {err:?}"),
        }
    }

    response
}

#[cfg(test)]
mod tests {
    use crate::test_support::test_config;
    use crate::{router, AppState};
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
        response::Response,
    };
    use mockito::Server;
    use service::config::RustEnv;
    use tower::ServiceExt;

    fn sse_request(uri: &str, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_missing_access_token_is_401_without_upstream_connection() {
        let mut server = Server::new_async().await;
        let upstream = server.mock("GET", "/sse").expect(0).create_async().await;
        let app = router::define_routes(
            AppState::new(test_config(&server.url(), &server.url())).unwrap(),
        );

        for cookie in [None, Some("refresh_token=r-1"), Some("access_token=")] {
            let response = app
                .clone()
                .oneshot(sse_request("/api/sse", cookie))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }

        upstream.assert_async().await;
    }

    #[tokio::test]
    async fn test_authenticated_request_is_proxied_with_streaming_headers() {
        let body = "event: message\ndata: {\"a\":1}\n\nevent: job\ndata: {\"id\":9}\n\n";
        let mut server = Server::new_async().await;
        let upstream = server
            .mock("GET", "/sse")
            .match_header("cookie", "access_token=a-1")
            .match_header("accept", "text/event-stream")
            .match_header("accept-encoding", "identity")
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_header("set-cookie", "sticky=node-2; Path=/")
            .with_body(body)
            .expect(1)
            .create_async()
            .await;
        let app = router::define_routes(
            AppState::new(test_config(&server.url(), &server.url())).unwrap(),
        );

        let response = app
            .oneshot(sse_request("/api/notifications/sse", Some("access_token=a-1")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_TYPE], "text/event-stream");
        assert_eq!(headers[header::CACHE_CONTROL], "no-cache, no-transform");
        assert_eq!(headers[header::CONNECTION], "keep-alive");
        assert_eq!(headers[header::SET_COOKIE], "sticky=node-2; Path=/");
        assert_eq!(body_text(response).await, body);
        upstream.assert_async().await;
    }

    #[tokio::test]
    async fn test_upstream_cookies_are_secure_in_production() {
        let mut server = Server::new_async().await;
        let _upstream = server
            .mock("GET", "/sse")
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_header("set-cookie", "sticky=node-2; Path=/")
            .with_body("event: message\ndata: {}\n\n")
            .create_async()
            .await;
        let mut config = test_config(&server.url(), &server.url());
        config.runtime_env = RustEnv::Production;
        let app = router::define_routes(AppState::new(config).unwrap());

        let response = app
            .oneshot(sse_request("/api/sse", Some("access_token=a-1")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(set_cookie.starts_with("sticky=node-2"), "{set_cookie}");
        assert!(set_cookie.contains("Secure"), "{set_cookie}");
    }

    #[tokio::test]
    async fn test_upstream_error_status_and_body_are_propagated() {
        let mut server = Server::new_async().await;
        let _upstream = server
            .mock("GET", "/sse")
            .with_status(403)
            .with_body("subscription disabled")
            .create_async()
            .await;
        let app = router::define_routes(
            AppState::new(test_config(&server.url(), &server.url())).unwrap(),
        );

        let response = app
            .oneshot(sse_request("/api/sse", Some("access_token=a-1")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_text(response).await, "subscription disabled");
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_502() {
        let app = router::define_routes(
            AppState::new(test_config("http://127.0.0.1:9", "http://127.0.0.1:9")).unwrap(),
        );

        let response = app
            .oneshot(sse_request("/api/sse", Some("access_token=a-1")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert!(!body_text(response).await.is_empty());
    }
}
