use crate::headers::{cookie_header, origin_header};
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::{
        header::{COOKIE, LOCATION, SET_COOKIE},
        HeaderValue, StatusCode,
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use domain::session::{mark_secure, RefreshedSession, SessionStatus, SessionTokens};
use log::*;

/// Session gatekeeper applied to every route the gateway serves.
///
/// Public paths pass through untouched, before any cookie is read. Everything
/// else needs an access token, or a refresh token that the auth gateway accepts
/// in a single server-to-server call; otherwise the browser is sent to the login
/// page with a 302.
pub async fn gatekeeper(
    State(app_state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    if app_state.public_paths.matches(request.uri().path()) {
        return next.run(request).await;
    }

    let config = &app_state.config;
    let jar = CookieJar::from_headers(request.headers());
    let status = SessionTokens::new(
        jar.get(config.access_token_cookie()).map(Cookie::value),
        jar.get(config.refresh_token_cookie()).map(Cookie::value),
    )
    .status();

    match status {
        SessionStatus::Authenticated => next.run(request).await,
        SessionStatus::Anonymous => {
            debug!(
                "No session cookies on {}, redirecting to login",
                request.uri().path()
            );
            redirect_to_login(config.login_path())
        }
        SessionStatus::Refreshable => {
            let cookie = cookie_header(request.headers());
            let origin = origin_header(request.headers(), config.gateway_origin());

            match app_state
                .auth_gateway
                .refresh(cookie.as_deref(), origin.as_deref())
                .await
            {
                Ok(session) => {
                    forward_refreshed_cookies(&mut request, jar, &session);
                    let mut response = next.run(request).await;
                    attach_session_cookies(&mut response, &session, config.is_production());
                    response
                }
                Err(err) => {
                    warn!("Session refresh failed, redirecting to login: {err}");
                    redirect_to_login(config.login_path())
                }
            }
        }
    }
}

fn redirect_to_login(login_path: &str) -> Response {
    (StatusCode::FOUND, [(LOCATION, login_path.to_string())]).into_response()
}

/// Rewrites the request's `Cookie` header so handlers behind the gatekeeper see
/// the refreshed tokens instead of the expired ones.
fn forward_refreshed_cookies(request: &mut Request, jar: CookieJar, session: &RefreshedSession) {
    let jar = session.cookie_pairs().fold(jar, |jar, (name, value)| {
        jar.add(Cookie::new(name.to_string(), value.to_string()))
    });

    let header = jar
        .iter()
        .map(|cookie| format!("{}={}", cookie.name(), cookie.value()))
        .collect::<Vec<_>>()
        .join("; ");

    match HeaderValue::from_str(&header) {
        Ok(value) => {
            request.headers_mut().insert(COOKIE, value);
        }
        Err(err) => warn!("Could not rebuild Cookie header after refresh: {err:?}"),
    }
}

/// Copies the refreshed session cookies onto the response, marking them `Secure`
/// when `secure` is set.
fn attach_session_cookies(response: &mut Response, session: &RefreshedSession, secure: bool) {
    for set_cookie in session.set_cookie_headers() {
        let set_cookie = match secure {
            true => mark_secure(set_cookie),
            false => set_cookie.to_string(),
        };
        match HeaderValue::from_str(&set_cookie) {
            Ok(value) => {
                response.headers_mut().append(SET_COOKIE, value);
            }
            Err(err) => warn!("Dropping invalid Set-Cookie from auth gateway: {err:?}"),
        }
    }
}
