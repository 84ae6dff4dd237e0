//! Shared test harness for integration tests.
//!
//! [`TestHarness`] lays out public, private and manifest roots in a temporary
//! directory and builds a full [`AppContext`] over them. Requests are driven
//! through the router with `tower::ServiceExt::oneshot`.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Request, Response},
    Router,
};
use http_body_util::BodyExt;
use std::path::PathBuf;
use tempfile::TempDir;
use tower::ServiceExt;
use vidserve::config::{Config, DeploymentMode};
use vidserve::server::{create_router, AppContext};

pub const TEST_SECRET: &str = "integration-test-secret";

pub struct TestHarness {
    pub dir: TempDir,
    pub ctx: AppContext,
}

impl TestHarness {
    /// Local mode: signatures are not enforced.
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    /// Production mode with [`TEST_SECRET`].
    pub fn enforcing() -> Self {
        Self::with_config(|config| {
            config.signing.mode = DeploymentMode::Production;
            config.signing.secret = TEST_SECRET.to_string();
        })
    }

    pub fn with_config(customize: impl FnOnce(&mut Config)) -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let mut config = Config::default();
        config.storage.public_root = dir.path().join("public");
        config.storage.private_root = dir.path().join("private");
        config.storage.manifest_root = dir.path().join("hls");
        for root in [
            &config.storage.public_root,
            &config.storage.private_root,
            &config.storage.manifest_root,
        ] {
            std::fs::create_dir_all(root).expect("failed to create storage root");
        }
        customize(&mut config);

        let ctx = AppContext::new(config);
        Self { dir, ctx }
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }

    /// Write `data` at `relative`, creating parent directories.
    pub fn write_file(&self, relative: &str, data: &[u8]) {
        let path = self.path(relative);
        std::fs::create_dir_all(path.parent().expect("path has a parent"))
            .expect("failed to create parent dir");
        std::fs::write(path, data).expect("failed to write fixture");
    }

    /// Write a `len`-byte file with a recognizable byte pattern and return it.
    pub fn write_asset(&self, relative: &str, len: usize) -> Vec<u8> {
        let data = patterned(len);
        self.write_file(relative, &data);
        data
    }

    pub fn router(&self) -> Router {
        create_router(self.ctx.clone())
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router()
            .oneshot(request)
            .await
            .expect("router is infallible")
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.send(Request::get(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn get_range(&self, uri: &str, range: &str) -> Response<Body> {
        self.send(
            Request::get(uri)
                .header("range", range)
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }
}

pub fn patterned(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_to_string(response: Response<Body>) -> String {
    String::from_utf8(body_bytes(response).await).unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

pub fn header<'a>(response: &'a Response<Body>, name: &str) -> Option<&'a str> {
    response.headers().get(name).and_then(|v| v.to_str().ok())
}
