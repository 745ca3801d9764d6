//! On-disk image cache

use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::key::CacheKey;
use crate::error::{AppError, Result};

const ENTRY_EXTENSION: &str = "png";
const TEMP_SUFFIX: &str = ".tmp";

/// Flat directory of `{backend}--{key}.png` files; membership is file existence.
///
/// Entries are written to a hidden temporary file and renamed into place, so
/// readers see either nothing or the complete image. Nothing is ever evicted.
pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    /// Open the cache directory, creating it and clearing interrupted writes
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let store = Self { root: root.into() };
        store.ensure_storage_dir().await?;
        let purged = store.purge_partial_writes().await?;
        if purged > 0 {
            info!(path = ?store.root, purged, "Removed interrupted cache writes");
        }
        Ok(store)
    }

    /// Ensure the storage directory exists
    async fn ensure_storage_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.root).await.map_err(|e| {
            AppError::Storage(format!("cannot create cache directory {:?}: {}", self.root, e))
        })?;
        debug!(path = ?self.root, "Cache directory ready");
        Ok(())
    }

    /// Get the full path of the entry for a key
    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.root.join(format!("{}.{}", key.file_stem(), ENTRY_EXTENSION))
    }

    /// Whether a complete entry is present; I/O failures are reported, not read as a miss
    pub async fn exists(&self, key: &CacheKey) -> Result<bool> {
        Ok(fs::try_exists(self.path_for(key)).await?)
    }

    pub async fn read(&self, key: &CacheKey) -> Result<Bytes> {
        match fs::read(self.path_for(key)).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(AppError::NotFound(format!("no cached image for '{}'", key)))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Persist an entry atomically
    pub async fn write(&self, key: &CacheKey, data: &[u8]) -> Result<()> {
        let final_path = self.path_for(key);
        let temp_path = self
            .root
            .join(format!(".{}.{}{}", key.file_stem(), Uuid::new_v4(), TEMP_SUFFIX));

        if let Err(e) = write_synced(&temp_path, data).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e);
        }
        if let Err(e) = fs::rename(&temp_path, &final_path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        debug!(path = ?final_path, size = data.len(), "Saved cache entry");
        Ok(())
    }

    /// Delete temporary files left behind by writes that never finished
    pub async fn purge_partial_writes(&self) -> Result<usize> {
        let mut deleted = 0;
        let mut entries = fs::read_dir(&self.root).await?;

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.starts_with('.') && name.ends_with(TEMP_SUFFIX) {
                match fs::remove_file(entry.path()).await {
                    Ok(()) => deleted += 1,
                    Err(e) => warn!(path = ?entry.path(), error = %e, "Could not remove temp file"),
                }
            }
        }

        Ok(deleted)
    }

    /// Filename stems of every cached entry
    pub async fn list(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if !stem.starts_with('.') {
                    keys.push(stem.to_string());
                }
            }
        }

        Ok(keys)
    }
}

async fn write_synced(path: &Path, data: &[u8]) -> Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(data).await?;
    file.sync_all().await?;
    Ok(())
}
