//! Thumbnail handler. Thumbnails are public and never require a signature.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
};

use super::engine::{AssetClass, StreamRequest};
use super::signing::SignatureParams;
use crate::error::StreamError;
use crate::server::AppContext;

pub async fn thumbnail(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    method: Method,
    headers: HeaderMap,
) -> Result<Response, StreamError> {
    let path = match ctx.engine.resolver().resolve_thumbnail(&id).await {
        Ok(path) => path,
        Err(StreamError::NotFound) => return Ok(placeholder()),
        Err(e) => return Err(e),
    };

    let request = StreamRequest::new(method, &headers, SignatureParams::default());
    ctx.engine
        .serve_file(&request, &path, AssetClass::Thumbnail)
        .await
}

/// Empty 404 image players can render as "no thumbnail".
fn placeholder() -> Response {
    (
        StatusCode::NOT_FOUND,
        [
            (header::CONTENT_TYPE, "image/png"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::empty(),
    )
        .into_response()
}
