use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Secret used when nothing else is configured. Refused in production mode.
pub const DEVELOPMENT_SECRET: &str = "vidserve-development-secret-change-in-production";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub signing: SigningConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub streaming: StreamingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Deadline for a client to finish sending request headers.
    #[serde(default = "default_header_timeout")]
    pub header_timeout_secs: u64,

    #[serde(default = "default_true")]
    pub keep_alive: bool,

    /// Origins allowed by CORS (`*` allows any)
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8090
}

fn default_header_timeout() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

fn default_allowed_origins() -> Vec<String> {
    vec![
        "http://localhost:8000".to_string(),
        "http://localhost:8080".to_string(),
        "http://127.0.0.1:8000".to_string(),
    ]
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            header_timeout_secs: default_header_timeout(),
            keep_alive: true,
            allowed_origins: default_allowed_origins(),
        }
    }
}

/// Storage roots searched when resolving assets.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Public storage, searched first.
    #[serde(default = "default_public_root")]
    pub public_root: PathBuf,

    /// Private storage, searched after the public root.
    #[serde(default = "default_private_root")]
    pub private_root: PathBuf,

    /// Root of pre-packaged HLS/DASH output.
    #[serde(default = "default_manifest_root")]
    pub manifest_root: PathBuf,
}

fn default_public_root() -> PathBuf {
    PathBuf::from("./storage/public/videos")
}

fn default_private_root() -> PathBuf {
    PathBuf::from("./storage/private/videos")
}

fn default_manifest_root() -> PathBuf {
    PathBuf::from("./storage/private/hls")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            public_root: default_public_root(),
            private_root: default_private_root(),
            manifest_root: default_manifest_root(),
        }
    }
}

/// Where the server is deployed. Signed URLs are only enforced in production.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentMode {
    #[default]
    Local,
    Production,
}

impl DeploymentMode {
    /// Parse the `APP_ENV` convention: only `production` enables enforcement.
    pub fn from_env_value(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("production") {
            DeploymentMode::Production
        } else {
            DeploymentMode::Local
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SigningConfig {
    /// Shared secret for HMAC-SHA256 URL signatures
    #[serde(default = "default_secret")]
    pub secret: String,

    #[serde(default)]
    pub mode: DeploymentMode,
}

fn default_secret() -> String {
    DEVELOPMENT_SECRET.to_string()
}

impl SigningConfig {
    pub fn enforcement_enabled(&self) -> bool {
        self.mode == DeploymentMode::Production
    }
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            secret: default_secret(),
            mode: DeploymentMode::Local,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Total payload bytes the cache may hold.
    #[serde(default = "default_cache_size")]
    pub max_size: u64,

    /// Largest single response the engine will copy into the cache.
    #[serde(default = "default_max_object_size")]
    pub max_object_size: u64,

    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Entries idle for longer than this are dropped by the sweep.
    #[serde(default = "default_idle_ttl")]
    pub idle_ttl_secs: u64,
}

fn default_cache_size() -> u64 {
    1024 * 1024 * 1024
}

fn default_max_object_size() -> u64 {
    16 * 1024 * 1024
}

fn default_sweep_interval() -> u64 {
    300
}

fn default_idle_ttl() -> u64 {
    1800
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_size: default_cache_size(),
            max_object_size: default_max_object_size(),
            sweep_interval_secs: default_sweep_interval(),
            idle_ttl_secs: default_idle_ttl(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StreamingConfig {
    /// Bytes read from disk per transmitted chunk
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

fn default_chunk_size() -> usize {
    2 * 1024 * 1024
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
        }
    }
}
