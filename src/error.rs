//! Error taxonomy for the streaming engine.
//!
//! Every failure a request can hit is a [`StreamError`]. Handlers return
//! `Result<Response, StreamError>` and the [`IntoResponse`] impl turns the
//! error into a stable status with a generic body. Internal context (file
//! paths, OS errors) only ever reaches the logs.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Failure while parsing a `Range` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RangeError {
    #[error("range unit must be bytes")]
    MissingUnit,

    #[error("multiple ranges are not supported")]
    MultipleRanges,

    #[error("malformed range")]
    Malformed,

    #[error("range not satisfiable")]
    Unsatisfiable,
}

/// Terminal failure of a streaming request.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// Missing, expired or forged signature.
    #[error("Unauthorized")]
    Unauthorized,

    /// The asset or variant does not exist in any storage root.
    #[error("Not found")]
    NotFound,

    /// A path parameter is not a single safe path segment.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The `Range` header could not be satisfied against the resource.
    #[error("Range not satisfiable ({reason})")]
    RangeNotSatisfiable {
        total_length: u64,
        reason: RangeError,
    },

    /// Opening, reading or stat-ing a resolved file failed.
    #[error("IO error [{context}]: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl StreamError {
    /// Wrap an I/O error with internal context (never shown to clients).
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        StreamError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn range(total_length: u64, reason: RangeError) -> Self {
        StreamError::RangeNotSatisfiable {
            total_length,
            reason,
        }
    }

    /// Map this error to its external HTTP status.
    pub fn status(&self) -> StatusCode {
        match self {
            StreamError::Unauthorized => StatusCode::UNAUTHORIZED,
            StreamError::NotFound => StatusCode::NOT_FOUND,
            StreamError::BadRequest(_) => StatusCode::BAD_REQUEST,
            StreamError::RangeNotSatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            StreamError::Io { .. } | StreamError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn code(&self) -> &'static str {
        match self {
            StreamError::Unauthorized => "unauthorized",
            StreamError::NotFound => "not_found",
            StreamError::BadRequest(_) => "bad_request",
            StreamError::RangeNotSatisfiable { .. } => "range_not_satisfiable",
            StreamError::Io { .. } => "io_error",
            StreamError::Internal(_) => "internal_error",
        }
    }

    /// Message safe to send to a client.
    fn public_message(&self) -> &'static str {
        match self {
            StreamError::Unauthorized => "Unauthorized",
            StreamError::NotFound => "Not found",
            StreamError::BadRequest(_) => "Bad request",
            StreamError::RangeNotSatisfiable { .. } => "Invalid range",
            StreamError::Io { .. } | StreamError::Internal(_) => "Internal server error",
        }
    }
}

impl IntoResponse for StreamError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            tracing::error!(status = %status, error = %self, "Streaming request failed");
        } else {
            tracing::debug!(status = %status, error = %self, "Streaming request rejected");
        }

        let body = json!({
            "error": self.public_message(),
            "code": self.code(),
        });

        let mut response = (status, axum::Json(body)).into_response();

        if let StreamError::RangeNotSatisfiable { total_length, .. } = self {
            if let Ok(value) = HeaderValue::from_str(&format!("bytes */{total_length}")) {
                response.headers_mut().insert(header::CONTENT_RANGE, value);
            }
        }

        response
    }
}
