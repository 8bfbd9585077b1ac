//! Local cache of downloaded source videos.
//!
//! Entries live at `<cache_dir>/<content key>.<quality>.<ext>` and are never
//! touched again once written. Downloads land on a private partial name and
//! are renamed into place only after the download tool succeeds, and callers
//! racing on the same key are serialized so the later one sees a cache hit.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::sources::SourceRegistry;
use crate::tools::{MediaTools, ToolError};

/// Failure to make a source video available locally
#[derive(thiserror::Error, Debug)]
pub enum DownloadError {
    #[error("Invalid source: {0}")]
    InvalidSource(String),

    #[error("Failed to download {url}: {source}")]
    Tool {
        url: String,
        #[source]
        source: ToolError,
    },

    #[error("Failed to store download of {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
}

impl DownloadError {
    /// Diagnostic output captured from the download tool, if any
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            DownloadError::Tool { source, .. } => source.diagnostics(),
            _ => None,
        }
    }
}

/// A source video present in the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedVideo {
    pub content_key: String,
    pub path: PathBuf,
    /// True when no download was needed
    pub cache_hit: bool,
}

/// Maps content keys to locally cached media files
pub struct VideoCache {
    dir: PathBuf,
    quality: String,
    extension: String,
    sources: SourceRegistry,
    tools: Arc<dyn MediaTools>,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl VideoCache {
    pub fn new(
        dir: impl Into<PathBuf>,
        quality: impl Into<String>,
        extension: impl Into<String>,
        tools: Arc<dyn MediaTools>,
    ) -> Self {
        Self {
            dir: dir.into(),
            quality: quality.into(),
            extension: extension.into(),
            sources: SourceRegistry::new(),
            tools,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_sources(mut self, sources: SourceRegistry) -> Self {
        self.sources = sources;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Deterministic location of the cache entry for `content_key`
    pub fn cache_path(&self, content_key: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{}.{}", content_key, self.quality, self.extension))
    }

    /// Return the cached file for `source_url`, downloading it on a miss
    pub async fn acquire(&self, source_url: &str) -> Result<CachedVideo, DownloadError> {
        let content_key = self
            .sources
            .content_key(source_url)
            .ok_or_else(|| DownloadError::InvalidSource(source_url.to_string()))?;
        let path = self.cache_path(&content_key);

        if is_present(&path).await {
            tracing::debug!("Video {} already in cache", content_key);
            return Ok(CachedVideo {
                content_key,
                path,
                cache_hit: true,
            });
        }

        let lock = self.key_lock(&content_key);
        let result = {
            let _guard = lock.lock().await;
            self.fill(source_url, &content_key, path).await
        };
        drop(lock);
        self.prune_locks();

        result
    }

    async fn fill(
        &self,
        source_url: &str,
        content_key: &str,
        path: PathBuf,
    ) -> Result<CachedVideo, DownloadError> {
        // Another caller may have finished while we waited for the lock.
        if is_present(&path).await {
            tracing::debug!("Video {} cached by a concurrent run", content_key);
            return Ok(CachedVideo {
                content_key: content_key.to_string(),
                path,
                cache_hit: true,
            });
        }

        let partial = PartialDownload::new(self.dir.join(format!(
            ".{}.{}.{}.part.{}",
            content_key,
            self.quality,
            &Uuid::new_v4().simple().to_string()[..8],
            self.extension
        )));

        tracing::info!("Downloading video {}...", content_key);

        if let Err(source) = self.tools.download(source_url, partial.path()).await {
            return Err(DownloadError::Tool {
                url: source_url.to_string(),
                source,
            });
        }

        if let Err(source) = tokio::fs::rename(partial.path(), &path).await {
            return Err(DownloadError::Io {
                key: content_key.to_string(),
                source,
            });
        }
        partial.keep();

        tracing::info!("Downloaded {}", content_key);

        Ok(CachedVideo {
            content_key: content_key.to_string(),
            path,
            cache_hit: false,
        })
    }

    fn key_lock(&self, content_key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        locks
            .entry(content_key.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    fn prune_locks(&self) {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }
}

async fn is_present(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|metadata| metadata.is_file())
        .unwrap_or(false)
}

/// An in-flight download, removed on drop unless it was moved into place.
///
/// Dropping covers abandoned runs too, such as a request whose client went
/// away while the download tool was still running.
struct PartialDownload {
    path: PathBuf,
    kept: bool,
}

impl PartialDownload {
    fn new(path: PathBuf) -> Self {
        Self { path, kept: false }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn keep(mut self) {
        self.kept = true;
    }
}

impl Drop for PartialDownload {
    fn drop(&mut self) {
        if self.kept {
            return;
        }
        match fs_err::remove_file(&self.path) {
            Ok(()) => tracing::debug!("Discarded partial download {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to remove partial download: {}", e),
        }
    }
}
