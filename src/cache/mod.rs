//! Local content cache
//!
//! The cache is a read-preferred, write-through store in front of a
//! source target. It is backed by OCI layouts; when several roots are
//! configured they form a union whose first root receives new content.
//!
//! # Cache Roots
//!
//! | Source | Example |
//! |--------|---------|
//! | `ORCA_CACHE` | `/var/cache/orca:/mnt/shared/orca` |
//! | `cache.root` in config | `root = "~/.cache/orca"` |
//! | neither | pass-through, no cache |

mod proxy;
mod tee;

pub use proxy::CachedTarget;

use crate::error::OrcaResult;
use crate::target::{BlobUsage, OciLayout, Storage, Target, UnionStorage};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Environment variable listing cache roots
pub const CACHE_ENV: &str = "ORCA_CACHE";

/// Cache roots from `ORCA_CACHE`, falling back to the configured root
pub fn cache_roots(configured: Option<&Path>) -> Vec<PathBuf> {
    if let Some(value) = std::env::var_os(CACHE_ENV) {
        let roots: Vec<PathBuf> = std::env::split_paths(&value)
            .filter(|p| !p.as_os_str().is_empty())
            .collect();
        if !roots.is_empty() {
            return roots;
        }
    }
    configured.map(|p| vec![p.to_path_buf()]).unwrap_or_default()
}

/// Open the cache storage over `roots`; `None` when no root is set
pub async fn open(roots: &[PathBuf]) -> OrcaResult<Option<Arc<dyn Storage>>> {
    let mut members: Vec<Arc<dyn Storage>> = Vec::with_capacity(roots.len());
    for root in roots {
        members.push(Arc::new(OciLayout::open(root).await?));
    }
    debug!(roots = roots.len(), "Opened cache");
    match members.len() {
        0 => Ok(None),
        1 => Ok(members.pop()),
        _ => Ok(Some(Arc::new(UnionStorage::new(members)?))),
    }
}

/// Install the caching proxy in front of `origin` when a cache is present
pub fn wrap(origin: Arc<dyn Target>, cache: Option<Arc<dyn Storage>>) -> Arc<dyn Target> {
    match cache {
        Some(cache) => Arc::new(CachedTarget::new(origin, cache)),
        None => origin,
    }
}

/// Usage of one cache root
#[derive(Debug, Clone)]
pub struct RootInfo {
    pub root: PathBuf,
    pub writable: bool,
    pub usage: BlobUsage,
}

/// Report blob counts for every root
pub async fn info(roots: &[PathBuf]) -> OrcaResult<Vec<RootInfo>> {
    let mut infos = Vec::with_capacity(roots.len());
    for (i, root) in roots.iter().enumerate() {
        let usage = if root.exists() {
            OciLayout::open_existing(root).await?.blob_usage().await?
        } else {
            BlobUsage::default()
        };
        infos.push(RootInfo {
            root: root.clone(),
            writable: i == 0,
            usage,
        });
    }
    Ok(infos)
}
