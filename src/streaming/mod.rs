//! Media streaming module.
//!
//! Serves progressive MP4 streams with HTTP range support, pre-packaged
//! HLS/DASH output and thumbnails from local storage.
//!
//! # Routes
//!
//! Progressive routes:
//! - `/stream/{id}` - default rendition
//! - `/stream/{id}/{quality}` - quality-specific rendition
//!
//! HLS routes:
//! - `/hls/{id}/master.m3u8` - master manifest (static or generated)
//! - `/hls/{id}/{quality}/playlist.m3u8` - per-quality playlist
//! - `/hls/{id}/{quality}/{segment}` - `.ts`, `.m4s` or `.mp4` segment
//!
//! DASH routes:
//! - `/dash/{id}/manifest.mpd` - static manifest
//! - `/dash/{id}/{quality}/{segment}` - segment
//!
//! Thumbnails:
//! - `/thumb/{id}`
//!
//! Every route answers GET and HEAD; OPTIONS is answered by the CORS layer.

pub mod cache;
mod dash;
mod direct;
pub mod engine;
mod hls;
pub mod manifest;
pub mod range;
pub mod resolver;
pub mod signing;
mod thumbnail;

pub use cache::{start_sweep_task, CacheKey, CacheStats, ObjectCache};
pub use engine::{content_type_for, AssetClass, StreamRequest, StreamingEngine};
pub use manifest::{ManifestGenerator, Variant, VARIANT_CATALOG};
pub use range::{parse_range, ByteRange};
pub use resolver::{PathResolver, ResourceLocator};
pub use signing::{sign, signed_query, SignatureParams, SignedUrlValidator};

use axum::{routing::get, Router};

use crate::server::AppContext;

/// Create progressive streaming router.
pub fn stream_router() -> Router<AppContext> {
    Router::new()
        .route("/:id", get(direct::stream_default))
        .route("/:id/:quality", get(direct::stream_quality))
}

/// Create HLS router.
pub fn hls_router() -> Router<AppContext> {
    Router::new()
        .route("/:id/master.m3u8", get(hls::master_playlist))
        .route("/:id/:quality/:file", get(hls::variant_file))
}

/// Create DASH router.
pub fn dash_router() -> Router<AppContext> {
    Router::new()
        .route("/:id/manifest.mpd", get(dash::manifest))
        .route("/:id/:quality/:segment", get(dash::segment))
}

/// Create thumbnail router.
pub fn thumbnail_router() -> Router<AppContext> {
    Router::new().route("/:id", get(thumbnail::thumbnail))
}
