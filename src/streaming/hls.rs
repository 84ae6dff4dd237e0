//! HLS handlers.
//!
//! Packaged output lives under the manifest root as
//! `{id}/master.m3u8`, `{id}/{quality}/playlist.m3u8` and
//! `{id}/{quality}/{segment}`. A missing master manifest is generated from the
//! playlists that do exist.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, Method},
    response::Response,
};
use std::path::PathBuf;

use super::engine::{AssetClass, StreamRequest};
use super::resolver::is_file;
use super::signing::SignatureParams;
use crate::error::StreamError;
use crate::server::AppContext;

const MASTER_MANIFEST: &str = "master.m3u8";
const VARIANT_PLAYLIST: &str = "playlist.m3u8";
const HLS_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";

/// Extensions accepted for HLS and DASH media segments.
const SEGMENT_EXTENSIONS: &[&str] = &["ts", "m4s", "mp4"];

pub(super) fn is_segment_name(name: &str) -> bool {
    name.rsplit_once('.')
        .map(|(stem, ext)| {
            !stem.is_empty()
                && SEGMENT_EXTENSIONS
                    .iter()
                    .any(|allowed| ext.eq_ignore_ascii_case(allowed))
        })
        .unwrap_or(false)
}

/// Return `path` if it is an existing file.
pub(super) async fn existing(path: PathBuf) -> Result<PathBuf, StreamError> {
    if is_file(&path).await {
        Ok(path)
    } else {
        Err(StreamError::NotFound)
    }
}

/// Serve `master.m3u8`, falling back to a generated manifest.
pub async fn master_playlist(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    Query(signature): Query<SignatureParams>,
    method: Method,
    headers: HeaderMap,
) -> Result<Response, StreamError> {
    let request = StreamRequest::new(method, &headers, signature);
    ctx.engine.authorize(&id, &request)?;

    let path = ctx.engine.resolver().manifest_path(&id, &[MASTER_MANIFEST])?;
    if is_file(&path).await {
        return ctx
            .engine
            .serve_file(&request, &path, AssetClass::Manifest)
            .await;
    }

    let manifest = ctx.manifests.build_master_manifest(&id).await?;
    ctx.engine
        .serve_generated(&request, manifest, HLS_CONTENT_TYPE, AssetClass::Manifest)
}

/// Serve a per-quality playlist or one of its segments.
pub async fn variant_file(
    State(ctx): State<AppContext>,
    Path((id, quality, file)): Path<(String, String, String)>,
    Query(signature): Query<SignatureParams>,
    method: Method,
    headers: HeaderMap,
) -> Result<Response, StreamError> {
    let request = StreamRequest::new(method, &headers, signature);
    ctx.engine.authorize(&id, &request)?;

    let path = ctx
        .engine
        .resolver()
        .manifest_path(&id, &[quality.as_str(), file.as_str()])?;

    let class = if file == VARIANT_PLAYLIST {
        AssetClass::Playlist
    } else if is_segment_name(&file) {
        AssetClass::Segment
    } else {
        return Err(StreamError::NotFound);
    };

    let path = existing(path).await?;
    ctx.engine.serve_file(&request, &path, class).await
}
