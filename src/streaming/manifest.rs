//! HLS master manifest generation.
//!
//! When an asset has no pre-packaged `master.m3u8`, one is built from the
//! per-quality playlists that exist on disk.

use std::fmt::Write as _;

use super::resolver::{is_file, PathResolver};
use crate::error::StreamError;

/// A known quality tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Variant {
    pub label: &'static str,
    pub bandwidth_bps: u32,
    pub resolution: &'static str,
}

/// Quality tiers in ascending resolution.
pub const VARIANT_CATALOG: &[Variant] = &[
    Variant {
        label: "360p",
        bandwidth_bps: 800_000,
        resolution: "640x360",
    },
    Variant {
        label: "480p",
        bandwidth_bps: 1_400_000,
        resolution: "854x480",
    },
    Variant {
        label: "720p",
        bandwidth_bps: 2_500_000,
        resolution: "1280x720",
    },
    Variant {
        label: "1080p",
        bandwidth_bps: 5_000_000,
        resolution: "1920x1080",
    },
];

const VARIANT_PLAYLIST: &str = "playlist.m3u8";

/// Builds master manifests from the variant catalog.
#[derive(Debug, Clone)]
pub struct ManifestGenerator {
    resolver: PathResolver,
    catalog: &'static [Variant],
}

impl ManifestGenerator {
    pub fn new(resolver: PathResolver) -> Self {
        Self {
            resolver,
            catalog: VARIANT_CATALOG,
        }
    }

    /// Variants of `id` whose playlist exists, in catalog order.
    pub async fn available_variants(&self, id: &str) -> Result<Vec<Variant>, StreamError> {
        let mut available = Vec::new();
        for variant in self.catalog {
            let playlist = self
                .resolver
                .manifest_path(id, &[variant.label, VARIANT_PLAYLIST])?;
            if is_file(&playlist).await {
                available.push(*variant);
            }
        }
        Ok(available)
    }

    /// Build the master manifest for `id`. With no variants on disk the
    /// result holds only the header lines, which is still a valid manifest.
    pub async fn build_master_manifest(&self, id: &str) -> Result<String, StreamError> {
        let variants = self.available_variants(id).await?;
        tracing::debug!(id, variants = variants.len(), "Generated master manifest");
        Ok(render_master(&variants))
    }
}

/// Render a master manifest listing `variants` with playlist links relative
/// to the manifest itself.
pub fn render_master(variants: &[Variant]) -> String {
    let mut out = String::from("#EXTM3U\n#EXT-X-VERSION:3\n");
    for variant in variants {
        // Writing to a String cannot fail.
        let _ = writeln!(
            out,
            "#EXT-X-STREAM-INF:BANDWIDTH={},RESOLUTION={},NAME=\"{}\"",
            variant.bandwidth_bps, variant.resolution, variant.label
        );
        let _ = writeln!(out, "{}/{}", variant.label, VARIANT_PLAYLIST);
    }
    out
}
