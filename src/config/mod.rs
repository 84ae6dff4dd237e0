mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file. Validation happens once overrides
/// have been layered on top, see [`validate_config`].
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config = parse_config(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    Ok(config)
}

/// Parse configuration from TOML text without validating it.
pub fn parse_config(content: &str) -> Result<Config> {
    Ok(toml::from_str(content)?)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = [
        "./vidserve.toml",
        "./config.toml",
        "~/.config/vidserve/config.toml",
        "/etc/vidserve/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.server.port == 0 {
        anyhow::bail!("Server port cannot be 0");
    }

    if config.streaming.chunk_size == 0 {
        anyhow::bail!("Streaming chunk size cannot be 0");
    }

    if config.cache.enabled {
        if config.cache.sweep_interval_secs == 0 {
            anyhow::bail!("Cache sweep interval cannot be 0");
        }
        if config.cache.max_object_size > config.cache.max_size {
            anyhow::bail!(
                "Cache max_object_size ({}) exceeds max_size ({})",
                config.cache.max_object_size,
                config.cache.max_size
            );
        }
    }

    if config.signing.enforcement_enabled() {
        if config.signing.secret.is_empty() {
            anyhow::bail!("Production mode requires a signing secret");
        }
        if config.signing.secret == DEVELOPMENT_SECRET {
            anyhow::bail!("Production mode cannot use the built-in development secret");
        }
    }

    for (name, root) in [
        ("public", &config.storage.public_root),
        ("private", &config.storage.private_root),
        ("manifest", &config.storage.manifest_root),
    ] {
        if !root.exists() {
            tracing::warn!("{} storage root does not exist: {:?}", name, root);
        }
    }

    Ok(())
}
