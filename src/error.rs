use axum::{
    body::Body,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

/// `axum`-compatible error handler.
///
/// Carries an HTTP status alongside the underlying error chain. Handlers
/// build these with the constructors below; bare `anyhow` errors convert
/// into a 500.
#[derive(Error)]
pub struct Error {
    status: StatusCode,
    err: anyhow::Error,
}

impl Error {
    pub fn with_status(status: StatusCode, err: impl Into<anyhow::Error>) -> Self {
        Self {
            status,
            err: err.into(),
        }
    }

    /// 400: the request body failed validation.
    pub fn validation(err: impl Into<anyhow::Error>) -> Self {
        Self::with_status(StatusCode::BAD_REQUEST, err)
    }

    /// 401: no usable session.
    pub fn unauthenticated(err: impl Into<anyhow::Error>) -> Self {
        Self::with_status(StatusCode::UNAUTHORIZED, err)
    }

    /// 403: authenticated, but not allowed to do this.
    pub fn forbidden(err: impl Into<anyhow::Error>) -> Self {
        Self::with_status(StatusCode::FORBIDDEN, err)
    }

    /// 404: no such record.
    pub fn not_found(err: impl Into<anyhow::Error>) -> Self {
        Self::with_status(StatusCode::NOT_FOUND, err)
    }

    /// 503: the database is overloaded; the caller should retry later.
    pub fn unavailable(err: impl Into<anyhow::Error>) -> Self {
        Self::with_status(StatusCode::SERVICE_UNAVAILABLE, err)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            err,
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        // A timed-out pool checkout means the database is swamped, not that
        // the request was bad. Surface it as a retryable 503.
        match err {
            sqlx::Error::PoolTimedOut => Self::with_status(
                StatusCode::SERVICE_UNAVAILABLE,
                anyhow::anyhow!("the service is busy, please try again shortly"),
            ),
            err => Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                err: err.into(),
            },
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {:?}", self.status, self.err)
    }
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.err.fmt(f)
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        error!("{:?}", self.err);

        // N.B: 5xx error chains can leak internals (paths, SQL), so those
        // get a generic message in release builds. Client errors always
        // carry their message; that text is the API contract.
        let msg = if self.status.is_server_error() && !cfg!(debug_assertions) {
            match self.status {
                StatusCode::SERVICE_UNAVAILABLE => {
                    "the service is busy, please try again shortly".to_owned()
                }
                _ => "internal server error".to_owned(),
            }
        } else {
            format!("{:#}", self.err)
        };

        let body = serde_json::json!({ "error": msg });

        Response::builder()
            .status(self.status)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::new(body.to_string()))
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
    }
}
