//! Per-request correlation ids.
//!
//! Player requests arrive in bursts (playlist, then many segments), so every
//! log line of a request is tagged with an id the client can also see in the
//! `x-request-id` response header. A sane id supplied by an upstream proxy is
//! kept; anything else is replaced by a fresh UUID.

use axum::body::Body;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Request};
use axum::middleware::Next;
use axum::response::Response;
use tracing::Instrument;
use uuid::Uuid;

pub static X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

const MAX_ID_LEN: usize = 128;

/// Correlation id of the current request, stored in request extensions.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Id forwarded by the client or a proxy, if it is usable.
fn forwarded_id(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(&X_REQUEST_ID)?.to_str().ok()?.trim();
    (!value.is_empty() && value.len() <= MAX_ID_LEN).then(|| value.to_string())
}

pub async fn request_id_middleware(mut request: Request<Body>, next: Next) -> Response {
    let id = forwarded_id(request.headers()).unwrap_or_else(|| Uuid::new_v4().to_string());
    request.extensions_mut().insert(RequestId(id.clone()));

    let span = tracing::info_span!(
        "request",
        request_id = %id,
        method = %request.method(),
        path = %request.uri().path(),
    );
    let mut response = next.run(request).instrument(span).await;

    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(X_REQUEST_ID.clone(), value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(X_REQUEST_ID.clone(), HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_forwarded_id_kept() {
        assert_eq!(forwarded_id(&headers(" edge-42 ")).as_deref(), Some("edge-42"));
    }

    #[test]
    fn test_unusable_ids_rejected() {
        assert_eq!(forwarded_id(&HeaderMap::new()), None);
        assert_eq!(forwarded_id(&headers("   ")), None);
        assert_eq!(forwarded_id(&headers(&"x".repeat(MAX_ID_LEN + 1))), None);
    }
}
