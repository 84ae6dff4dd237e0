use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use vidserve::config::{Config, DeploymentMode};

#[derive(Parser)]
#[command(name = "vidserve")]
#[command(author, version, about = "Signed-URL video streaming server")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the streaming server
    Start(StartArgs),

    /// Print a signed query string for a resource
    Sign {
        /// Resource identifier
        id: String,

        /// Seconds until the signature expires
        #[arg(long, default_value = "3600")]
        ttl: i64,

        /// Signing secret (defaults to the configured one)
        #[arg(long, env = "VIDEO_SECRET_KEY", hide_env_values = true)]
        secret: Option<String>,
    },

    /// Generate a random signing secret
    GenerateSecret,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}

/// Overrides applied on top of the config file.
#[derive(Args, Debug, Default)]
pub struct StartArgs {
    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "VIDEO_SERVER_PORT")]
    pub port: Option<u16>,

    /// Private video root
    #[arg(long = "video-path", env = "VIDEO_BASE_PATH")]
    pub private_root: Option<PathBuf>,

    /// Public video root (searched first, also holds thumbnails)
    #[arg(long = "public-path", env = "PUBLIC_BASE_PATH")]
    pub public_root: Option<PathBuf>,

    /// Root of packaged HLS/DASH output
    #[arg(long = "hls-path", env = "HLS_BASE_PATH")]
    pub manifest_root: Option<PathBuf>,

    /// Secret for signed URLs
    #[arg(long, env = "VIDEO_SECRET_KEY", hide_env_values = true)]
    pub secret: Option<String>,

    /// Max cache size in bytes
    #[arg(long, env = "VIDEO_CACHE_SIZE")]
    pub cache_size: Option<u64>,

    /// Bytes per transmitted chunk
    #[arg(long, env = "VIDEO_CHUNK_SIZE")]
    pub chunk_size: Option<usize>,

    /// Enable or disable the object cache (`true`/`false`, `1`/`0`, `yes`/`no`)
    #[arg(
        long = "cache",
        env = "VIDEO_CACHE_ENABLED",
        value_parser = clap::builder::BoolishValueParser::new()
    )]
    pub cache_enabled: Option<bool>,

    /// Comma-separated CORS origins
    #[arg(long, env = "ALLOWED_ORIGINS", value_delimiter = ',')]
    pub allowed_origins: Vec<String>,

    /// Deployment environment; `production` enforces signatures
    #[arg(long, env = "APP_ENV")]
    pub app_env: Option<String>,
}

impl StartArgs {
    pub fn apply(self, config: &mut Config) {
        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(root) = self.private_root {
            config.storage.private_root = root;
        }
        if let Some(root) = self.public_root {
            config.storage.public_root = root;
        }
        if let Some(root) = self.manifest_root {
            config.storage.manifest_root = root;
        }
        if let Some(secret) = self.secret {
            config.signing.secret = secret;
        }
        if let Some(size) = self.cache_size {
            config.cache.max_size = size;
            config.cache.max_object_size = config.cache.max_object_size.min(size);
        }
        if let Some(size) = self.chunk_size {
            config.streaming.chunk_size = size;
        }
        if let Some(enabled) = self.cache_enabled {
            config.cache.enabled = enabled;
        }
        let origins: Vec<String> = self
            .allowed_origins
            .into_iter()
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();
        if !origins.is_empty() {
            config.server.allowed_origins = origins;
        }
        if let Some(env) = self.app_env {
            config.signing.mode = DeploymentMode::from_env_value(&env);
        }
    }
}
