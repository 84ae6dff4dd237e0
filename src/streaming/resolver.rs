//! Asset path resolution across storage roots.
//!
//! Assets live under a public root and a private root with several naming
//! conventions. Candidates are checked in a fixed priority order, public root
//! first, and the first existing file wins. Probing and the later open are not
//! atomic; a file vanishing in between surfaces as an I/O error at open time.

use std::path::{Path, PathBuf};

use crate::config::StorageConfig;
use crate::error::StreamError;

/// Logical asset identity taken from a request path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceLocator {
    id: String,
    variant: Option<String>,
}

impl ResourceLocator {
    /// Build a locator, rejecting anything that is not a single path segment.
    pub fn new(id: impl Into<String>, variant: Option<String>) -> Result<Self, StreamError> {
        let id = id.into();
        check_segment(&id)?;
        let variant = variant.filter(|v| !v.is_empty());
        if let Some(ref v) = variant {
            check_segment(v)?;
        }
        Ok(Self { id, variant })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn variant(&self) -> Option<&str> {
        self.variant.as_deref()
    }
}

impl std::fmt::Display for ResourceLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.variant {
            Some(v) => write!(f, "{}/{}", self.id, v),
            None => f.write_str(&self.id),
        }
    }
}

/// Ensure a path parameter cannot escape its storage root.
pub fn check_segment(segment: &str) -> Result<(), StreamError> {
    let unsafe_segment = segment.is_empty()
        || segment == "."
        || segment == ".."
        || segment.contains(['/', '\\', '\0']);
    if unsafe_segment {
        return Err(StreamError::BadRequest(format!(
            "invalid path segment: {segment:?}"
        )));
    }
    Ok(())
}

/// Maps resource locators to files on disk.
#[derive(Debug, Clone)]
pub struct PathResolver {
    public_root: PathBuf,
    private_root: PathBuf,
    manifest_root: PathBuf,
}

impl PathResolver {
    pub fn new(storage: &StorageConfig) -> Self {
        Self {
            public_root: storage.public_root.clone(),
            private_root: storage.private_root.clone(),
            manifest_root: storage.manifest_root.clone(),
        }
    }

    fn roots(&self) -> [&Path; 2] {
        [&self.public_root, &self.private_root]
    }

    /// Candidate paths for a locator, in priority order.
    pub fn candidates(&self, locator: &ResourceLocator) -> Vec<PathBuf> {
        let id = locator.id();
        self.roots()
            .into_iter()
            .flat_map(|root| match locator.variant() {
                None => vec![
                    root.join(id).join("stream.mp4"),
                    root.join(id).join("original.mp4"),
                    root.join(format!("{id}-stream.mp4")),
                    root.join(format!("{id}.mp4")),
                ],
                Some(variant) => vec![
                    root.join(id).join(format!("{variant}.mp4")),
                    root.join(id).join("renditions").join(format!("{variant}.mp4")),
                    root.join(format!("{id}-{variant}.mp4")),
                ],
            })
            .collect()
    }

    /// Resolve a locator to the first existing candidate.
    pub async fn resolve(&self, locator: &ResourceLocator) -> Result<PathBuf, StreamError> {
        first_existing(self.candidates(locator))
            .await
            .ok_or(StreamError::NotFound)
    }

    /// Thumbnail candidates: `thumb.jpg` then `thumbnail.jpg`, public root first.
    pub fn thumbnail_candidates(&self, id: &str) -> Vec<PathBuf> {
        self.roots()
            .into_iter()
            .flat_map(|root| {
                [
                    root.join(id).join("thumb.jpg"),
                    root.join(id).join("thumbnail.jpg"),
                ]
            })
            .collect()
    }

    pub async fn resolve_thumbnail(&self, id: &str) -> Result<PathBuf, StreamError> {
        check_segment(id)?;
        first_existing(self.thumbnail_candidates(id))
            .await
            .ok_or(StreamError::NotFound)
    }

    /// Path of a file inside an asset's packaged HLS/DASH output, e.g.
    /// `manifest_path("id", &["720p", "playlist.m3u8"])`.
    pub fn manifest_path(&self, id: &str, parts: &[&str]) -> Result<PathBuf, StreamError> {
        check_segment(id)?;
        let mut path = self.manifest_root.join(id);
        for part in parts {
            check_segment(part)?;
            path.push(part);
        }
        Ok(path)
    }
}

/// Whether `path` names an existing regular file.
pub async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

async fn first_existing(candidates: Vec<PathBuf>) -> Option<PathBuf> {
    for path in candidates {
        if is_file(&path).await {
            tracing::trace!(path = %path.display(), "Resolved asset path");
            return Some(path);
        }
    }
    None
}
