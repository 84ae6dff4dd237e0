//! DASH handlers. Manifests are only served when pre-packaged.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, Method},
    response::Response,
};

use super::engine::{AssetClass, StreamRequest};
use super::hls::{existing, is_segment_name};
use super::signing::SignatureParams;
use crate::error::StreamError;
use crate::server::AppContext;

const DASH_MANIFEST: &str = "manifest.mpd";

pub async fn manifest(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    Query(signature): Query<SignatureParams>,
    method: Method,
    headers: HeaderMap,
) -> Result<Response, StreamError> {
    let request = StreamRequest::new(method, &headers, signature);
    ctx.engine.authorize(&id, &request)?;

    let path = ctx.engine.resolver().manifest_path(&id, &[DASH_MANIFEST])?;
    let path = existing(path).await?;
    ctx.engine
        .serve_file(&request, &path, AssetClass::Manifest)
        .await
}

pub async fn segment(
    State(ctx): State<AppContext>,
    Path((id, quality, segment)): Path<(String, String, String)>,
    Query(signature): Query<SignatureParams>,
    method: Method,
    headers: HeaderMap,
) -> Result<Response, StreamError> {
    let request = StreamRequest::new(method, &headers, signature);
    ctx.engine.authorize(&id, &request)?;

    let path = ctx
        .engine
        .resolver()
        .manifest_path(&id, &[quality.as_str(), segment.as_str()])?;
    if !is_segment_name(&segment) {
        return Err(StreamError::NotFound);
    }

    let path = existing(path).await?;
    ctx.engine
        .serve_file(&request, &path, AssetClass::Segment)
        .await
}
