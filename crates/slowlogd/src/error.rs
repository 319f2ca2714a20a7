use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use tailer::TailError;
use thiserror::Error;

pub const UNAVAILABLE_BODY: &str =
    "Internal server error: unable to open slow log. Check the server log for more information.\n";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Slow log unavailable: {0}")]
    SlowLogUnavailable(#[from] TailError),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl IntoResponse for ApiError {
    /// The client only ever sees a generic message; the detail goes to the log.
    fn into_response(self) -> Response {
        match &self {
            ApiError::SlowLogUnavailable(source) => {
                tracing::warn!(error = %source, "Cannot serve slow log");
            }
        }

        (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::CONTENT_TYPE, "text/plain")],
            UNAVAILABLE_BODY,
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn test_unavailable_hides_detail() {
        let err = ApiError::from(TailError::Open {
            path: "/secret/path/slow.log".into(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        });
        assert!(err.to_string().contains("/secret/path/slow.log"));

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], UNAVAILABLE_BODY.as_bytes());
    }
}
