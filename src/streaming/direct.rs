//! Progressive (byte-range) streaming handlers.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, Method},
    response::Response,
};

use super::engine::StreamRequest;
use super::resolver::ResourceLocator;
use super::signing::SignatureParams;
use crate::error::StreamError;
use crate::server::AppContext;

/// Stream the default rendition of an asset.
pub async fn stream_default(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    Query(signature): Query<SignatureParams>,
    method: Method,
    headers: HeaderMap,
) -> Result<Response, StreamError> {
    let locator = ResourceLocator::new(id, None)?;
    let request = StreamRequest::new(method, &headers, signature);
    ctx.engine.stream(&request, &locator).await
}

/// Stream a specific quality rendition of an asset.
pub async fn stream_quality(
    State(ctx): State<AppContext>,
    Path((id, quality)): Path<(String, String)>,
    Query(signature): Query<SignatureParams>,
    method: Method,
    headers: HeaderMap,
) -> Result<Response, StreamError> {
    let locator = ResourceLocator::new(id, Some(quality))?;
    let request = StreamRequest::new(method, &headers, signature);
    ctx.engine.stream(&request, &locator).await
}
