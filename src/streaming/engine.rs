//! Streaming engine: authorize, resolve, negotiate ranges and transmit.
//!
//! Every file the server hands out goes through [`StreamingEngine::serve_file`],
//! so progressive streams, HLS/DASH files and thumbnails share the same range
//! handling, HEAD semantics, caching and chunked transmission.
//!
//! Per request:
//! 1. authorize the signed URL
//! 2. resolve the asset path
//! 3. stat the file
//! 4. pick full or partial mode from the `Range` header
//! 5. serve from the object cache, or open the file and stream it in
//!    fixed-size chunks, teeing complete reads into the cache

use axum::body::Body;
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::response::Response;
use bytes::{Bytes, BytesMut};
use std::io::SeekFrom;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt};

use super::cache::{CacheKey, ObjectCache};
use super::range::{parse_range, ByteRange};
use super::resolver::{PathResolver, ResourceLocator};
use super::signing::{SignatureParams, SignedUrlValidator};
use crate::config::Config;
use crate::error::StreamError;

/// Kind of asset being served; decides the `Cache-Control` policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetClass {
    /// Progressive MP4 streams.
    Media,
    /// HLS/DASH media segments, immutable once written.
    Segment,
    /// Per-quality playlists.
    Playlist,
    /// Master manifests and MPDs.
    Manifest,
    Thumbnail,
}

impl AssetClass {
    pub fn cache_control(self) -> &'static str {
        match self {
            AssetClass::Media => "public, max-age=31536000",
            AssetClass::Segment => "public, max-age=31536000, immutable",
            AssetClass::Playlist => "max-age=2",
            AssetClass::Manifest => "no-cache",
            AssetClass::Thumbnail => "public, max-age=604800, immutable",
        }
    }
}

/// Determine content type from file extension.
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "m3u8" => "application/vnd.apple.mpegurl",
        "ts" => "video/mp2t",
        "m4s" => "video/iso.segment",
        "mpd" => "application/dash+xml",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        _ => "application/octet-stream",
    }
}

/// The parts of an HTTP request the engine consumes.
#[derive(Debug, Clone)]
pub struct StreamRequest {
    pub method: Method,
    pub range: Option<String>,
    pub signature: SignatureParams,
}

impl StreamRequest {
    pub fn new(method: Method, headers: &HeaderMap, signature: SignatureParams) -> Self {
        let range = headers
            .get(header::RANGE)
            .and_then(|h| h.to_str().ok())
            .map(str::to_string);
        Self {
            method,
            range,
            signature,
        }
    }

    /// HEAD only describes the body it would send.
    pub fn wants_body(&self) -> bool {
        self.method != Method::HEAD
    }
}

/// Cache destination for a payload read from disk.
struct CacheFill {
    cache: Arc<ObjectCache>,
    key: CacheKey,
}

/// Counts response bodies that are still being transmitted.
struct ActiveStream(Arc<AtomicUsize>);

impl ActiveStream {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self(Arc::clone(counter))
    }
}

impl Drop for ActiveStream {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Answers streaming requests. Cheap to clone; all state is shared.
#[derive(Clone)]
pub struct StreamingEngine {
    resolver: PathResolver,
    validator: SignedUrlValidator,
    cache: Option<Arc<ObjectCache>>,
    chunk_size: usize,
    max_cached_object: u64,
    active_streams: Arc<AtomicUsize>,
}

impl StreamingEngine {
    pub fn new(
        resolver: PathResolver,
        validator: SignedUrlValidator,
        cache: Option<Arc<ObjectCache>>,
        chunk_size: usize,
        max_cached_object: u64,
    ) -> Self {
        Self {
            resolver,
            validator,
            cache,
            chunk_size: chunk_size.max(1),
            max_cached_object,
            active_streams: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Build an engine from configuration, sharing `cache` if one is given.
    pub fn from_config(config: &Config, cache: Option<Arc<ObjectCache>>) -> Self {
        Self::new(
            PathResolver::new(&config.storage),
            SignedUrlValidator::new(
                config.signing.secret.as_bytes(),
                config.signing.enforcement_enabled(),
            ),
            cache,
            config.streaming.chunk_size,
            config.cache.max_object_size,
        )
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    pub fn validator(&self) -> &SignedUrlValidator {
        &self.validator
    }

    /// Number of response bodies currently being transmitted.
    pub fn active_streams(&self) -> usize {
        self.active_streams.load(Ordering::Relaxed)
    }

    /// Check the request's signature for `resource_id`.
    pub fn authorize(&self, resource_id: &str, request: &StreamRequest) -> Result<(), StreamError> {
        if self.validator.validate_now(resource_id, &request.signature) {
            Ok(())
        } else {
            tracing::debug!(resource_id, "Rejected request signature");
            Err(StreamError::Unauthorized)
        }
    }

    /// Serve a progressive stream for `locator`.
    pub async fn stream(
        &self,
        request: &StreamRequest,
        locator: &ResourceLocator,
    ) -> Result<Response, StreamError> {
        self.authorize(locator.id(), request)?;
        let path = self.resolver.resolve(locator).await?;
        self.serve_file(request, &path, AssetClass::Media).await
    }

    /// Serve an already-located file with range, HEAD and cache support.
    pub async fn serve_file(
        &self,
        request: &StreamRequest,
        path: &Path,
        class: AssetClass,
    ) -> Result<Response, StreamError> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| StreamError::io(format!("stat {}", path.display()), e))?;
        let total_length = metadata.len();

        // Full mode when no Range header is present, partial otherwise.
        let (partial, range) = match request.range.as_deref() {
            None => (false, ByteRange::full(total_length)),
            Some(value) => {
                let range = parse_range(value, total_length)
                    .map_err(|reason| StreamError::range(total_length, reason))?;
                (true, Some(range))
            }
        };
        let status = if partial {
            StatusCode::PARTIAL_CONTENT
        } else {
            StatusCode::OK
        };
        let content_length = range.map(|r| r.len()).unwrap_or(0);

        let mut builder = Response::builder()
            .status(status)
            .header(header::CONTENT_TYPE, content_type_for(path))
            .header(header::CONTENT_LENGTH, content_length.to_string())
            .header(header::ACCEPT_RANGES, "bytes")
            .header(header::CACHE_CONTROL, class.cache_control());
        if let Some(range) = range.filter(|_| partial) {
            builder = builder.header(header::CONTENT_RANGE, range.content_range(total_length));
        }
        if class == AssetClass::Thumbnail {
            builder = builder.header(header::X_CONTENT_TYPE_OPTIONS, "nosniff");
        }

        let Some(range) = range.filter(|_| request.wants_body()) else {
            return build(builder, Body::empty());
        };

        let fill = self
            .cache
            .as_ref()
            .filter(|_| range.len() <= self.max_cached_object)
            .map(|cache| CacheFill {
                cache: Arc::clone(cache),
                key: CacheKey::for_file(path, &metadata, range),
            });

        if let Some(fill) = &fill {
            if let Some(payload) = fill.cache.get(&fill.key) {
                tracing::debug!(key = %fill.key, bytes = payload.len(), "Serving from cache");
                return build(builder, Body::from(payload));
            }
        }

        let mut file = File::open(path)
            .await
            .map_err(|e| StreamError::io(format!("open {}", path.display()), e))?;

        if partial && range.start > 0 {
            file.seek(SeekFrom::Start(range.start))
                .await
                .map_err(|e| StreamError::io(format!("seek {}", path.display()), e))?;
        }

        tracing::debug!(
            path = %path.display(),
            start = range.start,
            end = range.end,
            total = total_length,
            partial,
            "Streaming file"
        );

        build(builder, self.chunked_body(file, range.len(), fill))
    }

    /// Serve an in-memory document (e.g. a generated manifest).
    pub fn serve_generated(
        &self,
        request: &StreamRequest,
        content: String,
        content_type: &'static str,
        class: AssetClass,
    ) -> Result<Response, StreamError> {
        let builder = Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, content_type)
            .header(header::CONTENT_LENGTH, content.len().to_string())
            .header(header::CACHE_CONTROL, class.cache_control());

        let body = if request.wants_body() {
            Body::from(content)
        } else {
            Body::empty()
        };
        build(builder, body)
    }

    /// Body that reads `length` bytes from `file` in chunks of `chunk_size`.
    ///
    /// If the client goes away the stream is dropped mid-read, which closes
    /// the file and skips the cache. Only a read that delivered every byte is
    /// offered to the cache.
    ///
    /// The cache is filled before the final chunk is yielded: hyper stops
    /// polling a body once `Content-Length` bytes are written, so code after
    /// the last `yield` never runs on a real connection.
    fn chunked_body(&self, file: File, length: u64, fill: Option<CacheFill>) -> Body {
        let chunk_size = self.chunk_size;
        let guard = ActiveStream::enter(&self.active_streams);

        let stream = async_stream::stream! {
            let _guard = guard;
            let mut reader = file.take(length);
            let mut fill = fill;
            let mut collected = fill
                .as_ref()
                .map(|_| BytesMut::with_capacity(length as usize));
            let mut sent = 0u64;

            loop {
                match read_chunk(&mut reader, chunk_size).await {
                    Ok(chunk) if chunk.is_empty() => {
                        if sent < length {
                            tracing::warn!(sent, length, "File shorter than expected");
                        }
                        break;
                    }
                    Ok(chunk) => {
                        sent += chunk.len() as u64;
                        if let Some(buf) = collected.as_mut() {
                            buf.extend_from_slice(&chunk);
                        }
                        if sent == length {
                            if let (Some(fill), Some(buf)) = (fill.take(), collected.take()) {
                                fill.cache.put(fill.key, buf.freeze());
                            }
                        }
                        yield Ok(chunk);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, sent, length, "Read failed mid-stream");
                        yield Err(e);
                        break;
                    }
                }
            }
        };

        Body::from_stream(stream)
    }
}

/// Read up to `chunk_size` bytes; an empty chunk means end of input.
async fn read_chunk<R>(reader: &mut R, chunk_size: usize) -> std::io::Result<Bytes>
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(chunk_size);
    while buf.len() < chunk_size {
        if reader.read_buf(&mut buf).await? == 0 {
            break;
        }
    }
    Ok(buf.freeze())
}

fn build(builder: axum::http::response::Builder, body: Body) -> Result<Response, StreamError> {
    builder
        .body(body)
        .map_err(|e| StreamError::Internal(format!("failed to build response: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use crate::streaming::signing::sign;
    use assert_matches::assert_matches;
    use http_body_util::BodyExt;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        engine: StreamingEngine,
        cache: Arc<ObjectCache>,
    }

    fn fixture(enforce: bool, chunk_size: usize) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageConfig {
            public_root: dir.path().join("public"),
            private_root: dir.path().join("private"),
            manifest_root: dir.path().join("hls"),
        };
        let cache = Arc::new(ObjectCache::new(1024 * 1024, Duration::from_secs(60)));
        let engine = StreamingEngine::new(
            PathResolver::new(&storage),
            SignedUrlValidator::new(b"secret".to_vec(), enforce),
            Some(cache.clone()),
            chunk_size,
            64 * 1024,
        );
        Fixture { dir, engine, cache }
    }

    fn write_asset(dir: &TempDir, relative: &str, len: usize) -> Vec<u8> {
        let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        let path = dir.path().join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, &data).unwrap();
        data
    }

    fn request(method: Method, range: Option<&str>) -> StreamRequest {
        StreamRequest {
            method,
            range: range.map(str::to_string),
            signature: SignatureParams::default(),
        }
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        response.into_body().collect().await.unwrap().to_bytes().to_vec()
    }

    #[test]
    fn test_content_types() {
        assert_eq!(content_type_for(Path::new("a/stream.mp4")), "video/mp4");
        assert_eq!(
            content_type_for(Path::new("a/playlist.m3u8")),
            "application/vnd.apple.mpegurl"
        );
        assert_eq!(content_type_for(Path::new("seg_001.ts")), "video/mp2t");
        assert_eq!(content_type_for(Path::new("seg_001.M4S")), "video/iso.segment");
        assert_eq!(content_type_for(Path::new("manifest.mpd")), "application/dash+xml");
        assert_eq!(content_type_for(Path::new("thumb.jpg")), "image/jpeg");
        assert_eq!(content_type_for(Path::new("blob")), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_full_stream_in_small_chunks() {
        let f = fixture(false, 7);
        let data = write_asset(&f.dir, "public/abc/stream.mp4", 1000);
        let locator = ResourceLocator::new("abc", None).unwrap();

        let response = f.engine.stream(&request(Method::GET, None), &locator).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "1000");
        assert!(response.headers().get(header::CONTENT_RANGE).is_none());
        assert_eq!(body_bytes(response).await, data);
    }

    #[tokio::test]
    async fn test_partial_stream() {
        let f = fixture(false, 64);
        let data = write_asset(&f.dir, "public/abc.mp4", 1000);
        let locator = ResourceLocator::new("abc", None).unwrap();

        let response = f
            .engine
            .stream(&request(Method::GET, Some("bytes=100-299")), &locator)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "200");
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 100-299/1000");
        assert_eq!(body_bytes(response).await, &data[100..300]);
    }

    #[tokio::test]
    async fn test_head_has_headers_but_no_body() {
        let f = fixture(false, 64);
        write_asset(&f.dir, "public/abc.mp4", 1000);
        let locator = ResourceLocator::new("abc", None).unwrap();

        let response = f
            .engine
            .stream(&request(Method::HEAD, Some("bytes=-10")), &locator)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "10");
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 990-999/1000");
        assert!(body_bytes(response).await.is_empty());
        assert_eq!(f.cache.stats().misses, 0);
    }

    #[tokio::test]
    async fn test_unsatisfiable_range() {
        let f = fixture(false, 64);
        write_asset(&f.dir, "public/abc.mp4", 1000);
        let locator = ResourceLocator::new("abc", None).unwrap();

        let result = f
            .engine
            .stream(&request(Method::GET, Some("bytes=5000-")), &locator)
            .await;
        assert_matches!(
            result,
            Err(StreamError::RangeNotSatisfiable {
                total_length: 1000,
                ..
            })
        );
    }

    #[tokio::test]
    async fn test_unauthorized_stops_before_resolution() {
        let f = fixture(true, 64);
        assert!(f.engine.validator().is_enforced());
        let locator = ResourceLocator::new("missing", None).unwrap();

        let result = f.engine.stream(&request(Method::GET, None), &locator).await;
        assert_matches!(result, Err(StreamError::Unauthorized));
    }

    #[tokio::test]
    async fn test_signed_request_accepted() {
        let f = fixture(true, 64);
        write_asset(&f.dir, "private/abc/original.mp4", 10);
        let locator = ResourceLocator::new("abc", None).unwrap();

        let expires = crate::streaming::signing::unix_now() + 60;
        let mut req = request(Method::GET, None);
        req.signature = SignatureParams {
            sig: Some(sign(b"secret", "abc", expires)),
            expires: Some(expires.to_string()),
        };

        let response = f.engine.stream(&req, &locator).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_not_found() {
        let f = fixture(false, 64);
        let locator = ResourceLocator::new("missing", Some("720p".to_string())).unwrap();
        let result = f.engine.stream(&request(Method::GET, None), &locator).await;
        assert_matches!(result, Err(StreamError::NotFound));
    }

    #[tokio::test]
    async fn test_completed_read_populates_cache() {
        let f = fixture(false, 16);
        let data = write_asset(&f.dir, "public/abc.mp4", 500);
        let locator = ResourceLocator::new("abc", None).unwrap();
        let req = request(Method::GET, Some("bytes=0-99"));

        let first = f.engine.stream(&req, &locator).await.unwrap();
        assert_eq!(body_bytes(first).await, &data[..100]);
        assert_eq!(f.cache.len(), 1);
        assert_eq!(f.cache.stats().misses, 1);

        let second = f.engine.stream(&req, &locator).await.unwrap();
        assert_eq!(second.headers()[header::CONTENT_RANGE], "bytes 0-99/500");
        assert_eq!(body_bytes(second).await, &data[..100]);
        assert_eq!(f.cache.stats().hits, 1);
    }

    #[tokio::test]
    async fn test_dropped_body_is_not_cached() {
        let f = fixture(false, 16);
        write_asset(&f.dir, "public/abc.mp4", 500);
        let locator = ResourceLocator::new("abc", None).unwrap();

        let response = f.engine.stream(&request(Method::GET, None), &locator).await.unwrap();
        let mut body = response.into_body();
        let first = body.frame().await.unwrap().unwrap();
        assert_eq!(first.into_data().unwrap().len(), 16);
        assert_eq!(f.engine.active_streams(), 1);
        drop(body);

        assert!(f.cache.is_empty());
        assert_eq!(f.engine.active_streams(), 0);
    }

    #[tokio::test]
    async fn test_cache_filled_without_polling_past_last_chunk() {
        // Stop reading once Content-Length bytes arrived, the way an HTTP/1
        // connection does, then drop the body.
        let f = fixture(false, 16);
        let data = write_asset(&f.dir, "public/abc.mp4", 500);
        let locator = ResourceLocator::new("abc", None).unwrap();
        let req = request(Method::GET, Some("bytes=0-99"));

        let response = f.engine.stream(&req, &locator).await.unwrap();
        let expected: usize = response.headers()[header::CONTENT_LENGTH]
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        let mut body = response.into_body();
        let mut received = Vec::new();
        while received.len() < expected {
            let frame = body.frame().await.unwrap().unwrap();
            received.extend_from_slice(&frame.into_data().unwrap());
        }
        drop(body);
        assert_eq!(received, &data[..100]);
        assert_eq!(f.cache.len(), 1);

        let second = f.engine.stream(&req, &locator).await.unwrap();
        assert_eq!(body_bytes(second).await, &data[..100]);
        assert_eq!(f.cache.stats().hits, 1);
    }

    #[tokio::test]
    async fn test_large_payloads_bypass_cache() {
        let f = fixture(false, 4096);
        write_asset(&f.dir, "public/big.mp4", 100 * 1024);
        let locator = ResourceLocator::new("big", None).unwrap();

        let response = f.engine.stream(&request(Method::GET, None), &locator).await.unwrap();
        assert_eq!(body_bytes(response).await.len(), 100 * 1024);
        assert!(f.cache.is_empty());
        assert_eq!(f.cache.stats().misses, 0);
    }

    #[tokio::test]
    async fn test_empty_file() {
        let f = fixture(false, 16);
        write_asset(&f.dir, "public/empty.mp4", 0);
        let locator = ResourceLocator::new("empty", None).unwrap();

        let response = f.engine.stream(&request(Method::GET, None), &locator).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "0");
        assert!(body_bytes(response).await.is_empty());

        let result = f
            .engine
            .stream(&request(Method::GET, Some("bytes=0-")), &locator)
            .await;
        assert_matches!(result, Err(StreamError::RangeNotSatisfiable { .. }));
    }

    #[tokio::test]
    async fn test_serve_generated_head() {
        let f = fixture(false, 16);
        let response = f
            .engine
            .serve_generated(
                &request(Method::HEAD, None),
                "#EXTM3U\n".to_string(),
                "application/vnd.apple.mpegurl",
                AssetClass::Manifest,
            )
            .unwrap();
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "8");
        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-cache");
        assert!(body_bytes(response).await.is_empty());
    }
}
