mod cli;

use vidserve::{config, server, streaming::signing};

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands, StartArgs};

async fn start_server(args: StartArgs, config_path: Option<&std::path::Path>) -> Result<()> {
    let mut config = config::load_config_or_default(config_path)?;
    args.apply(&mut config);
    config::validate_config(&config)?;

    tracing::info!("Starting vidserve {}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "Server will listen on {}:{}",
        config.server.host,
        config.server.port
    );
    if !config.signing.enforcement_enabled() {
        tracing::warn!("Signed URL enforcement is disabled (local mode)");
    }

    server::start_server(config).await
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "vidserve=trace,tower_http=debug".to_string()
        } else {
            "vidserve=info,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Start(args) => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(start_server(args, cli.config.as_deref()))
        }
        Commands::Sign { id, ttl, secret } => {
            let secret = match secret {
                Some(secret) => secret,
                None => config::load_config_or_default(cli.config.as_deref())?.signing.secret,
            };
            let expires_at = chrono::Utc::now().timestamp() + ttl;
            println!("{}", signing::signed_query(secret.as_bytes(), &id, expires_at));
            Ok(())
        }
        Commands::GenerateSecret => {
            println!("{}", signing::generate_secret());
            Ok(())
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("vidserve {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn validate_config(path: Option<&std::path::Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            config::load_config(p)?
        }
        None => {
            println!("No config file specified, using defaults");
            config::Config::default()
        }
    };
    config::validate_config(&config)?;

    println!("✓ Configuration is valid");
    println!("  Server: {}:{}", config.server.host, config.server.port);
    println!("  Public root: {}", config.storage.public_root.display());
    println!("  Private root: {}", config.storage.private_root.display());
    println!("  Manifest root: {}", config.storage.manifest_root.display());
    println!("  Signatures enforced: {}", config.signing.enforcement_enabled());
    println!(
        "  Cache: {} ({} bytes)",
        if config.cache.enabled { "enabled" } else { "disabled" },
        config.cache.max_size
    );
    Ok(())
}
