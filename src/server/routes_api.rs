use crate::server::AppContext;
use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;

pub fn api_routes() -> Router<AppContext> {
    Router::new()
        .route("/health", get(health))
        .route("/stats", get(stats))
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub uptime_secs: u64,
    pub uptime: String,
    pub active_streams: usize,
    pub cache: CacheReport,
}

#[derive(Debug, Serialize)]
pub struct CacheReport {
    pub enabled: bool,
    pub items: usize,
    pub size: String,
    pub size_bytes: u64,
    pub max_size: String,
    pub max_size_bytes: u64,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: String,
}

async fn stats(State(ctx): State<AppContext>) -> impl IntoResponse {
    let uptime_secs = ctx.started_at.elapsed().as_secs();

    let cache = match &ctx.cache {
        Some(cache) => {
            let stats = cache.stats();
            CacheReport {
                enabled: true,
                items: stats.items,
                size: format_bytes(stats.size_bytes),
                size_bytes: stats.size_bytes,
                max_size: format_bytes(stats.max_size_bytes),
                max_size_bytes: stats.max_size_bytes,
                hits: stats.hits,
                misses: stats.misses,
                hit_rate: format!("{:.2}%", stats.hit_rate()),
            }
        }
        None => CacheReport {
            enabled: false,
            items: 0,
            size: format_bytes(0),
            size_bytes: 0,
            max_size: format_bytes(0),
            max_size_bytes: 0,
            hits: 0,
            misses: 0,
            hit_rate: format!("{:.2}%", 0.0),
        },
    };

    Json(StatsResponse {
        uptime_secs,
        uptime: format_duration(uptime_secs),
        active_streams: ctx.engine.active_streams(),
        cache,
    })
}

/// Human-readable size in binary units, e.g. `1.5 MB`.
pub fn format_bytes(bytes: u64) -> String {
    const UNIT: u64 = 1024;
    const PREFIXES: &[char] = &['K', 'M', 'G', 'T', 'P', 'E'];

    if bytes < UNIT {
        return format!("{} B", bytes);
    }
    let mut div = UNIT;
    let mut exp = 0;
    let mut n = bytes / UNIT;
    while n >= UNIT && exp + 1 < PREFIXES.len() {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }
    format!("{:.1} {}B", bytes as f64 / div as f64, PREFIXES[exp])
}

fn format_duration(secs: u64) -> String {
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h}h{m}m{s}s")
    } else if m > 0 {
        format!("{m}m{s}s")
    } else {
        format!("{s}s")
    }
}
