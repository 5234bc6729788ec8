//! Session rules applied by the gatekeeper: which paths are public, and what a
//! pair of session cookies allows a request to do.

/// File extensions served as static assets without a session check.
const STATIC_ASSET_EXTENSIONS: &[&str] = &[
    "css", "js", "map", "png", "jpg", "jpeg", "gif", "svg", "ico", "webp", "avif", "woff",
    "woff2", "ttf", "txt", "xml", "json",
];

/// Allow-list of path prefixes that bypass the gatekeeper entirely.
#[derive(Debug, Clone)]
pub struct PublicPaths {
    prefixes: Vec<String>,
}

impl PublicPaths {
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let prefixes = prefixes
            .into_iter()
            .map(|p| p.as_ref().trim().trim_end_matches('/').to_string())
            .filter(|p| !p.is_empty())
            .collect();
        Self { prefixes }
    }

    /// A path is public when it equals an allow-listed prefix, lies beneath one
    /// (`/api` covers `/api/sse` but not `/apiary`), or names a static asset.
    pub fn matches(&self, path: &str) -> bool {
        self.prefixes.iter().any(|prefix| {
            path == prefix
                || path
                    .strip_prefix(prefix.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
        }) || is_static_asset(path)
    }
}

fn is_static_asset(path: &str) -> bool {
    let last_segment = path.rsplit('/').next().unwrap_or_default();
    match last_segment.rsplit_once('.') {
        Some((stem, extension)) if !stem.is_empty() => STATIC_ASSET_EXTENSIONS
            .iter()
            .any(|known| extension.eq_ignore_ascii_case(known)),
        _ => false,
    }
}

/// What the session cookies on a request allow the gatekeeper to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// An access token is present; downstream services enforce its expiry.
    Authenticated,
    /// Only a refresh token is present; a silent refresh may restore the session.
    Refreshable,
    /// Neither token is present.
    Anonymous,
}

/// Borrowed view of the two session cookie values on a request.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionTokens<'a> {
    pub access_token: Option<&'a str>,
    pub refresh_token: Option<&'a str>,
}

impl<'a> SessionTokens<'a> {
    pub fn new(access_token: Option<&'a str>, refresh_token: Option<&'a str>) -> Self {
        Self {
            access_token,
            refresh_token,
        }
    }

    pub fn status(&self) -> SessionStatus {
        let present = |token: Option<&str>| token.is_some_and(|t| !t.trim().is_empty());

        if present(self.access_token) {
            SessionStatus::Authenticated
        } else if present(self.refresh_token) {
            SessionStatus::Refreshable
        } else {
            SessionStatus::Anonymous
        }
    }
}

/// A raw `Set-Cookie` value paired with the cookie name it sets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetCookie {
    pub name: String,
    pub value: String,
    pub header: String,
}

/// The session cookies issued by a successful refresh call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshedSession {
    pub access_token: Option<SetCookie>,
    pub refresh_token: Option<SetCookie>,
}

impl RefreshedSession {
    /// `Set-Cookie` headers to attach to the outgoing response, access token first.
    pub fn set_cookie_headers(&self) -> impl Iterator<Item = &str> {
        self.access_token
            .iter()
            .chain(self.refresh_token.iter())
            .map(|cookie| cookie.header.as_str())
    }

    /// Name/value pairs to substitute into the forwarded request's `Cookie` header.
    pub fn cookie_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.access_token
            .iter()
            .chain(self.refresh_token.iter())
            .map(|cookie| (cookie.name.as_str(), cookie.value.as_str()))
    }
}

/// Adds the `Secure` attribute to a raw `Set-Cookie` value. Values that do not
/// parse as a cookie are returned unchanged.
pub fn mark_secure(set_cookie: &str) -> String {
    match cookie::Cookie::parse(set_cookie) {
        Ok(mut parsed) if parsed.secure() != Some(true) => {
            parsed.set_secure(true);
            parsed.to_string()
        }
        _ => set_cookie.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn public_paths() -> PublicPaths {
        PublicPaths::new(["/login", "/api", "/.well-known", "/_next/"])
    }

    #[test]
    fn test_allow_list_matches_exact_and_nested_paths() {
        let paths = public_paths();
        assert!(paths.matches("/login"));
        assert!(paths.matches("/api/sse"));
        assert!(paths.matches("/api/notifications/sse"));
        assert!(paths.matches("/.well-known/security.txt"));
        assert!(paths.matches("/_next/static/chunk.js"));
    }

    #[test]
    fn test_allow_list_does_not_match_sibling_prefixes() {
        let paths = public_paths();
        assert!(!paths.matches("/apiary"));
        assert!(!paths.matches("/login-history"));
        assert!(!paths.matches("/dashboard"));
        assert!(!paths.matches("/"));
    }

    #[test]
    fn test_static_assets_are_public_anywhere() {
        let paths = PublicPaths::new(Vec::<String>::new());
        assert!(paths.matches("/favicon.ico"));
        assert!(paths.matches("/images/logo.SVG"));
        assert!(paths.matches("/fonts/inter.woff2"));
        assert!(!paths.matches("/reports/2024.q3"));
        assert!(!paths.matches("/.env"));
        assert!(!paths.matches("/jobs/42"));
    }

    #[test]
    fn test_session_status_from_cookie_presence() {
        assert_eq!(
            SessionTokens::new(Some("a"), Some("r")).status(),
            SessionStatus::Authenticated
        );
        assert_eq!(
            SessionTokens::new(Some("a"), None).status(),
            SessionStatus::Authenticated
        );
        assert_eq!(
            SessionTokens::new(None, Some("r")).status(),
            SessionStatus::Refreshable
        );
        assert_eq!(SessionTokens::default().status(), SessionStatus::Anonymous);
    }

    #[test]
    fn test_empty_cookie_values_count_as_absent() {
        assert_eq!(
            SessionTokens::new(Some(""), Some("r")).status(),
            SessionStatus::Refreshable
        );
        assert_eq!(
            SessionTokens::new(Some(" "), Some("")).status(),
            SessionStatus::Anonymous
        );
    }

    #[test]
    fn test_refreshed_session_orders_access_token_first() {
        let session = RefreshedSession {
            access_token: Some(SetCookie {
                name: "access_token".to_string(),
                value: "new-a".to_string(),
                header: "access_token=new-a; Path=/; HttpOnly".to_string(),
            }),
            refresh_token: Some(SetCookie {
                name: "refresh_token".to_string(),
                value: "new-r".to_string(),
                header: "refresh_token=new-r; Path=/; HttpOnly".to_string(),
            }),
        };

        let headers: Vec<&str> = session.set_cookie_headers().collect();
        assert_eq!(headers.len(), 2);
        assert!(headers[0].starts_with("access_token="));

        let pairs: Vec<(&str, &str)> = session.cookie_pairs().collect();
        assert_eq!(
            pairs,
            vec![("access_token", "new-a"), ("refresh_token", "new-r")]
        );
    }

    #[test]
    fn test_mark_secure_keeps_the_cookie_and_its_attributes() {
        let header = mark_secure("access_token=a-2; Path=/; HttpOnly; SameSite=Lax");
        let parsed = cookie::Cookie::parse(header.as_str()).unwrap();
        assert_eq!(parsed.name(), "access_token");
        assert_eq!(parsed.value(), "a-2");
        assert_eq!(parsed.path(), Some("/"));
        assert_eq!(parsed.http_only(), Some(true));
        assert_eq!(parsed.secure(), Some(true));
    }

    #[test]
    fn test_mark_secure_leaves_secure_and_unparseable_values_alone() {
        let secure = "refresh_token=r-2; Path=/; Secure";
        assert_eq!(mark_secure(secure), secure);
        assert_eq!(mark_secure("no equals sign"), "no equals sign");
    }
}
