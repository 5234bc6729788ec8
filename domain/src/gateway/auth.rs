use crate::error::{DomainErrorKind, Error, ExternalErrorKind};
use crate::session::{RefreshedSession, SetCookie};
use cookie::Cookie;
use log::*;
use reqwest::header::{HeaderMap, CONTENT_TYPE, COOKIE, ORIGIN, SET_COOKIE};
use service::config::Config;

/// Client for the upstream auth gateway's session refresh endpoint.
pub struct AuthGateway {
    client: reqwest::Client,
    refresh_url: reqwest::Url,
    access_token_cookie: String,
    refresh_token_cookie: String,
}

impl AuthGateway {
    /// Builds a gateway client whose every call is bounded by the configured
    /// refresh timeout. An unreachable or slow auth gateway therefore fails the
    /// refresh instead of stalling the page request.
    pub fn new(config: &Config) -> Result<Self, Error> {
        let refresh_url = reqwest::Url::parse(&config.refresh_url()).map_err(|err| {
            warn!("Invalid auth gateway URL {}: {err:?}", config.refresh_url());
            Error::config("Invalid auth gateway base URL")
        })?;

        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(config.refresh_timeout())
            .build()?;

        Ok(Self {
            client,
            refresh_url,
            access_token_cookie: config.access_token_cookie().to_string(),
            refresh_token_cookie: config.refresh_token_cookie().to_string(),
        })
    }

    /// Exchanges the refresh token carried in `cookie` for a fresh session.
    ///
    /// Exactly one upstream request is made; there is no retry. Any non-2xx status,
    /// a network failure or timeout, or a 2xx response that does not set the access
    /// token cookie is returned as an error.
    pub async fn refresh(
        &self,
        cookie: Option<&str>,
        origin: Option<&str>,
    ) -> Result<RefreshedSession, Error> {
        let mut request = self
            .client
            .post(self.refresh_url.clone())
            .header(CONTENT_TYPE, "application/json")
            .body("{}");

        if let Some(cookie) = cookie {
            request = request.header(COOKIE, cookie);
        }
        if let Some(origin) = origin {
            request = request.header(ORIGIN, origin);
        }

        debug!("Refreshing session against {}", self.refresh_url);

        let response = request.send().await.map_err(|err| {
            warn!("Session refresh request failed: {err:?}");
            Error::from(err)
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Auth gateway rejected session refresh: {status}");
            return Err(Error::upstream(status.as_u16(), body));
        }

        let session = self.session_cookies(response.headers());
        if session.access_token.is_none() {
            warn!(
                "Auth gateway answered {status} without setting the {} cookie",
                self.access_token_cookie
            );
            return Err(Error {
                source: None,
                error_kind: DomainErrorKind::External(ExternalErrorKind::Other(
                    "Refresh response did not set an access token".to_string(),
                )),
            });
        }

        info!("Session refreshed");
        Ok(session)
    }

    /// Picks the two session cookies out of the refresh response's `Set-Cookie`
    /// headers. Any other cookie the gateway sets is ignored.
    fn session_cookies(&self, headers: &HeaderMap) -> RefreshedSession {
        let mut session = RefreshedSession::default();

        for value in headers.get_all(SET_COOKIE) {
            let Ok(header) = value.to_str() else {
                debug!("Skipping non-UTF-8 Set-Cookie header");
                continue;
            };
            let Ok(parsed) = Cookie::parse(header) else {
                debug!("Skipping unparseable Set-Cookie header");
                continue;
            };

            let set_cookie = SetCookie {
                name: parsed.name().to_string(),
                value: parsed.value().to_string(),
                header: header.to_string(),
            };

            if parsed.name() == self.access_token_cookie {
                session.access_token = Some(set_cookie);
            } else if parsed.name() == self.refresh_token_cookie {
                session.refresh_token = Some(set_cookie);
            }
        }

        session
    }
}
