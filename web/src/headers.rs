use axum::http::{
    header::{COOKIE, ORIGIN},
    HeaderMap,
};

/// All `Cookie` headers on a request joined into one value, as an upstream
/// service expects to receive them.
pub(crate) fn cookie_header(headers: &HeaderMap) -> Option<String> {
    let values: Vec<&str> = headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect();

    if values.is_empty() {
        None
    } else {
        Some(values.join("; "))
    }
}

/// The request's `Origin`, falling back to the configured gateway origin.
pub(crate) fn origin_header(headers: &HeaderMap, fallback: Option<&str>) -> Option<String> {
    headers
        .get(ORIGIN)
        .and_then(|v| v.to_str().ok())
        .or(fallback)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_cookie_header_joins_repeated_headers() {
        let mut headers = HeaderMap::new();
        headers.append(COOKIE, HeaderValue::from_static("a=1"));
        headers.append(COOKIE, HeaderValue::from_static("b=2"));
        assert_eq!(cookie_header(&headers).as_deref(), Some("a=1; b=2"));
        assert_eq!(cookie_header(&HeaderMap::new()), None);
    }

    #[test]
    fn test_origin_prefers_request_over_fallback() {
        let mut headers = HeaderMap::new();
        assert_eq!(
            origin_header(&headers, Some("https://gw.internal")).as_deref(),
            Some("https://gw.internal")
        );
        headers.insert(ORIGIN, HeaderValue::from_static("https://app.example.com"));
        assert_eq!(
            origin_header(&headers, Some("https://gw.internal")).as_deref(),
            Some("https://app.example.com")
        );
    }
}
