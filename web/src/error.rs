use std::error::Error as StdError;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use domain::error::{DomainErrorKind, Error as DomainError, ExternalErrorKind, InternalErrorKind};
use log::*;

#[derive(Debug)]
pub struct Error(DomainError);

impl StdError for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> core::result::Result<(), std::fmt::Error> {
        write!(fmt, "{self:?}")
    }
}

// Upstream failures keep their own status where it is an error status so the
// browser sees what the notification service said; anything else is a 502.
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match self.0.error_kind {
            DomainErrorKind::Internal(internal_error_kind) => {
                error!("Internal error: {internal_error_kind:?}");
                match internal_error_kind {
                    InternalErrorKind::Config | InternalErrorKind::Other(_) => {
                        (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL SERVER ERROR").into_response()
                    }
                }
            }
            DomainErrorKind::External(external_error_kind) => match external_error_kind {
                ExternalErrorKind::Network => (
                    StatusCode::BAD_GATEWAY,
                    "Unable to connect to the notification service",
                )
                    .into_response(),
                ExternalErrorKind::Upstream { status, body } => {
                    let status = StatusCode::from_u16(status)
                        .ok()
                        .filter(|s| s.is_client_error() || s.is_server_error())
                        .unwrap_or(StatusCode::BAD_GATEWAY);
                    (status, body).into_response()
                }
                ExternalErrorKind::Other(message) => {
                    (StatusCode::BAD_GATEWAY, message).into_response()
                }
            },
        }
    }
}

impl<E> From<E> for Error
where
    E: Into<DomainError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_network_error_is_bad_gateway_with_message() {
        let response = Error::from(DomainError {
            source: None,
            error_kind: DomainErrorKind::External(ExternalErrorKind::Network),
        })
        .into_response();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert!(body_text(response).await.contains("notification service"));
    }

    #[tokio::test]
    async fn test_upstream_error_status_and_body_pass_through() {
        let response =
            Error::from(DomainError::upstream(503, "draining".to_string())).into_response();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_text(response).await, "draining");
    }

    #[tokio::test]
    async fn test_upstream_non_error_status_defaults_to_bad_gateway() {
        let response = Error::from(DomainError::upstream(304, String::new())).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_internal_error_is_server_error() {
        let response = Error::from(DomainError::config("bad url")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
