//! HLS, DASH and thumbnail integration tests.

mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use common::{body_bytes, body_to_string, header, TestHarness, TEST_SECRET};
use vidserve::streaming::sign;

const PLAYLIST: &[u8] = b"#EXTM3U\n#EXT-X-TARGETDURATION:6\n#EXTINF:6.0,\nsegment_000.ts\n";

#[tokio::test]
async fn test_generated_master_lists_available_variants() {
    let harness = TestHarness::new();
    harness.write_file("hls/abc/360p/playlist.m3u8", PLAYLIST);
    harness.write_file("hls/abc/720p/playlist.m3u8", PLAYLIST);

    let response = harness.get("/hls/abc/master.m3u8").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        header(&response, "content-type"),
        Some("application/vnd.apple.mpegurl")
    );
    assert_eq!(header(&response, "cache-control"), Some("no-cache"));

    let manifest = body_to_string(response).await;
    let lines: Vec<&str> = manifest.lines().collect();
    assert_eq!(
        lines,
        vec![
            "#EXTM3U",
            "#EXT-X-VERSION:3",
            "#EXT-X-STREAM-INF:BANDWIDTH=800000,RESOLUTION=640x360,NAME=\"360p\"",
            "360p/playlist.m3u8",
            "#EXT-X-STREAM-INF:BANDWIDTH=2500000,RESOLUTION=1280x720,NAME=\"720p\"",
            "720p/playlist.m3u8",
        ]
    );
    assert!(!manifest.contains("480p"));
    assert!(!manifest.contains("1080p"));
}

#[tokio::test]
async fn test_generated_master_without_variants() {
    let harness = TestHarness::new();

    let response = harness.get("/hls/abc/master.m3u8").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_to_string(response).await, "#EXTM3U\n#EXT-X-VERSION:3\n");
}

#[tokio::test]
async fn test_static_master_preferred() {
    let harness = TestHarness::new();
    let packaged = b"#EXTM3U\n# packaged\n";
    harness.write_file("hls/abc/master.m3u8", packaged);
    harness.write_file("hls/abc/360p/playlist.m3u8", PLAYLIST);

    let response = harness.get("/hls/abc/master.m3u8").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "cache-control"), Some("no-cache"));
    assert_eq!(body_bytes(response).await, packaged);
}

#[tokio::test]
async fn test_generated_master_head() {
    let harness = TestHarness::new();
    harness.write_file("hls/abc/360p/playlist.m3u8", PLAYLIST);

    let response = harness
        .send(
            Request::head("/hls/abc/master.m3u8")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(header(&response, "content-length").is_some());
    assert!(body_bytes(response).await.is_empty());
}

#[tokio::test]
async fn test_variant_playlist() {
    let harness = TestHarness::new();
    harness.write_file("hls/abc/720p/playlist.m3u8", PLAYLIST);

    let response = harness.get("/hls/abc/720p/playlist.m3u8").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "cache-control"), Some("max-age=2"));
    assert_eq!(
        header(&response, "content-type"),
        Some("application/vnd.apple.mpegurl")
    );
    assert_eq!(body_bytes(response).await, PLAYLIST);

    let response = harness.get("/hls/abc/1080p/playlist.m3u8").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_segments() {
    let harness = TestHarness::new();
    let ts = harness.write_asset("hls/abc/720p/segment_000.ts", 2048);
    harness.write_asset("hls/abc/720p/chunk_1.m4s", 64);
    harness.write_file("hls/abc/720p/notes.txt", b"not a segment");

    let response = harness.get("/hls/abc/720p/segment_000.ts").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "content-type"), Some("video/mp2t"));
    assert_eq!(
        header(&response, "cache-control"),
        Some("public, max-age=31536000, immutable")
    );
    assert_eq!(body_bytes(response).await, ts);

    let response = harness.get("/hls/abc/720p/chunk_1.m4s").await;
    assert_eq!(header(&response, "content-type"), Some("video/iso.segment"));

    let response = harness.get("/hls/abc/720p/notes.txt").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = harness.get("/hls/abc/720p/segment_999.ts").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_segment_range_request() {
    let harness = TestHarness::new();
    let ts = harness.write_asset("hls/abc/720p/segment_000.ts", 2048);

    let response = harness
        .get_range("/hls/abc/720p/segment_000.ts", "bytes=1024-")
        .await;
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(header(&response, "content-range"), Some("bytes 1024-2047/2048"));
    assert_eq!(body_bytes(response).await, &ts[1024..]);
}

#[tokio::test]
async fn test_hls_traversal_rejected() {
    let harness = TestHarness::new();

    let response = harness.get("/hls/abc/%2E%2E/segment_000.ts").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_hls_requires_signature_when_enforced() {
    let harness = TestHarness::enforcing();
    harness.write_file("hls/abc/360p/playlist.m3u8", PLAYLIST);

    let response = harness.get("/hls/abc/master.m3u8").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let expires = chrono::Utc::now().timestamp() + 60;
    let uri = format!(
        "/hls/abc/360p/playlist.m3u8?sig={}&expires={}",
        sign(TEST_SECRET.as_bytes(), "abc", expires),
        expires
    );
    let response = harness.get(&uri).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_dash_manifest() {
    let harness = TestHarness::new();

    let response = harness.get("/dash/abc/manifest.mpd").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let mpd = b"<?xml version=\"1.0\"?><MPD/>";
    harness.write_file("hls/abc/manifest.mpd", mpd);

    let response = harness.get("/dash/abc/manifest.mpd").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "content-type"), Some("application/dash+xml"));
    assert_eq!(header(&response, "cache-control"), Some("no-cache"));
    assert_eq!(body_bytes(response).await, mpd);
}

#[tokio::test]
async fn test_dash_segment() {
    let harness = TestHarness::new();
    let init = harness.write_asset("hls/abc/720p/init.mp4", 512);

    let response = harness.get("/dash/abc/720p/init.mp4").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "content-type"), Some("video/mp4"));
    assert_eq!(body_bytes(response).await, init);
}

#[tokio::test]
async fn test_thumbnail() {
    let harness = TestHarness::enforcing();
    let jpeg = harness.write_asset("private/abc/thumbnail.jpg", 300);

    // Thumbnails never need a signature.
    let response = harness.get("/thumb/abc").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "content-type"), Some("image/jpeg"));
    assert_eq!(header(&response, "x-content-type-options"), Some("nosniff"));
    assert_eq!(
        header(&response, "cache-control"),
        Some("public, max-age=604800, immutable")
    );
    assert_eq!(body_bytes(response).await, jpeg);
}

#[tokio::test]
async fn test_missing_thumbnail_placeholder() {
    let harness = TestHarness::new();

    let response = harness.get("/thumb/missing").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(header(&response, "content-type"), Some("image/png"));
    assert_eq!(header(&response, "cache-control"), Some("no-cache"));
    assert!(body_bytes(response).await.is_empty());
}
