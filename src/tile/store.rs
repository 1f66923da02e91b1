//! Durable tile storage on the local filesystem.
//!
//! # File Layout
//!
//! ```text
//! <root>/<cell_size>/<x>_<y>.<ext>
//! ```
//!
//! The layout is shared with earlier runs, so a warm cache directory is
//! reused as-is after a restart.
//!
//! # Writes
//!
//! A file that exists is never rewritten. New files are written to a sibling
//! `.partial` file and renamed into place while holding a lock scoped to the
//! destination path, so a reader sees either nothing or a complete file.
//!
//! # Corrupt Files
//!
//! A file that fails to decode is deleted and reported as absent, so the next
//! request regenerates it instead of failing on it forever.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use image::RgbaImage;
use tracing::{debug, warn};

use crate::error::TileError;
use crate::geo::TileKey;

use super::encoder::{TileCodec, TileFormat};
use super::image::TileImage;

// =============================================================================
// Path Locks
// =============================================================================

/// Table of per-path write locks.
///
/// Entries are held weakly: a lock lives only while some writer holds it and
/// dead entries are pruned on every acquisition, so the table stays as small
/// as the number of concurrent writes.
#[derive(Default)]
pub struct PathLocks {
    locks: Mutex<HashMap<PathBuf, Weak<tokio::sync::Mutex<()>>>>,
}

impl PathLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the lock for `path`, creating it if no live one exists.
    pub fn lock_for(&self, path: &Path) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.retain(|_, lock| lock.strong_count() > 0);

        if let Some(lock) = locks.get(path).and_then(Weak::upgrade) {
            return lock;
        }

        let lock = Arc::new(tokio::sync::Mutex::new(()));
        locks.insert(path.to_path_buf(), Arc::downgrade(&lock));
        lock
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.values().filter(|lock| lock.strong_count() > 0).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// Tile Store
// =============================================================================

/// File-backed tile persistence.
///
/// # Example
///
/// ```no_run
/// use image::RgbaImage;
/// use worldmap_tiles::geo::TileKey;
/// use worldmap_tiles::tile::{TileFormat, TileImage, TileStore};
///
/// #[tokio::main]
/// async fn main() {
///     let store = TileStore::new("/tmp/worldmap-cache", TileFormat::Png);
///     let key = TileKey::new(4, 0, 0);
///
///     store.save(key, &TileImage::new(RgbaImage::new(512, 512))).await.unwrap();
///     assert!(store.try_load(key).await.is_some());
/// }
/// ```
pub struct TileStore {
    root: PathBuf,
    codec: TileCodec,
    locks: PathLocks,
}

impl TileStore {
    /// Create a store rooted at `root`. Directories are created lazily.
    pub fn new(root: impl Into<PathBuf>, format: TileFormat) -> Self {
        Self {
            root: root.into(),
            codec: TileCodec::new(format),
            locks: PathLocks::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn format(&self) -> TileFormat {
        self.codec.format()
    }

    /// Directory holding every tile of one cell size.
    pub fn level_dir(&self, cell_size: u32) -> PathBuf {
        self.root.join(cell_size.to_string())
    }

    /// Path of a tile: `<root>/<cell_size>/<x>_<y>.<ext>`.
    pub fn path(&self, key: TileKey) -> PathBuf {
        self.level_dir(key.cell_size).join(format!(
            "{}_{}.{}",
            key.x,
            key.y,
            self.codec.format().extension()
        ))
    }

    /// Live per-path locks, for diagnostics.
    pub fn active_locks(&self) -> usize {
        self.locks.len()
    }

    /// Whether a file exists for `key`.
    pub async fn contains(&self, key: TileKey) -> bool {
        tokio::fs::try_exists(self.path(key)).await.unwrap_or(false)
    }

    /// Load a tile from disk.
    ///
    /// Returns `None` if the file is missing or unreadable. A file that fails
    /// to decode is deleted before returning `None`.
    pub async fn try_load(&self, key: TileKey) -> Option<TileImage> {
        let path = self.path(key);

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read cached tile");
                return None;
            }
        };

        let codec = self.codec;
        let decoded = tokio::task::spawn_blocking(move || codec.decode(&bytes)).await;

        match decoded {
            Ok(Ok(pixels)) => {
                debug!(tile = %key, "Loaded tile from disk");
                Some(TileImage::new(pixels))
            }
            Ok(Err(e)) => {
                let err = TileError::corrupt(&path, e);
                warn!(error = %err, "Deleting corrupt cache file");
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    if e.kind() != ErrorKind::NotFound {
                        warn!(path = %path.display(), error = %e, "Failed to delete corrupt cache file");
                    }
                }
                None
            }
            Err(e) => {
                warn!(tile = %key, error = %e, "Tile decode task failed");
                None
            }
        }
    }

    /// Persist a tile unless a file for it already exists.
    ///
    /// Returns `Ok(true)` if this call wrote the file and `Ok(false)` if it
    /// was already present.
    ///
    /// # Errors
    ///
    /// Returns [`TileError::PersistFailure`] if encoding or any filesystem
    /// operation fails. Nothing is left at the final path in that case.
    pub async fn save(&self, key: TileKey, image: &TileImage) -> Result<bool, TileError> {
        let path = self.path(key);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(false);
        }

        let lock = self.locks.lock_for(&path);
        let _guard = lock.lock().await;

        // Another writer may have finished while we waited
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(false);
        }

        let codec = self.codec;
        let image = image.clone();
        let encoded = tokio::task::spawn_blocking(move || codec.encode(image.pixels()))
            .await
            .map_err(|e| TileError::persist(&path, e))?
            .map_err(|e| TileError::persist(&path, e))?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| TileError::persist(parent, e))?;
        }

        let partial = partial_path(&path);
        if let Err(e) = tokio::fs::write(&partial, &encoded).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(TileError::persist(&partial, e));
        }
        if let Err(e) = tokio::fs::rename(&partial, &path).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(TileError::persist(&path, e));
        }

        debug!(tile = %key, bytes = encoded.len(), "Saved tile to disk");
        Ok(true)
    }

    /// Delete the file for `key`, if any.
    pub async fn remove(&self, key: TileKey) -> Result<bool, TileError> {
        let path = self.path(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(TileError::persist(&path, e)),
        }
    }

    /// Whether every tile of a `tiles_x` x `tiles_y` grid is on disk.
    pub async fn is_level_complete(&self, cell_size: u32, tiles_x: u32, tiles_y: u32) -> bool {
        if !tokio::fs::try_exists(self.level_dir(cell_size))
            .await
            .unwrap_or(false)
        {
            return false;
        }

        for y in 0..tiles_y {
            for x in 0..tiles_x {
                if !self.contains(TileKey::new(cell_size, x, y)).await {
                    return false;
                }
            }
        }
        true
    }

    /// Number of tile files stored for `cell_size`.
    pub async fn count_level(&self, cell_size: u32) -> usize {
        let extension = self.codec.format().extension();
        let mut entries = match tokio::fs::read_dir(self.level_dir(cell_size)).await {
            Ok(entries) => entries,
            Err(_) => return 0,
        };

        let mut count = 0;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) == Some(extension) {
                count += 1;
            }
        }
        count
    }

    /// Delete one level, or the whole cache when `cell_size` is `None`.
    ///
    /// Returns `Ok(false)` if there was nothing to delete.
    pub async fn purge(&self, cell_size: Option<u32>) -> Result<bool, TileError> {
        let dir = match cell_size {
            Some(cell_size) => self.level_dir(cell_size),
            None => self.root.clone(),
        };

        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(TileError::persist(&dir, e)),
        }
    }

    /// Decode a tile synchronously. Used by tools that inspect the cache
    /// outside an async context.
    pub fn load_blocking(&self, key: TileKey) -> Result<Option<RgbaImage>, TileError> {
        let path = self.path(key);
        match std::fs::read(&path) {
            Ok(bytes) => self
                .codec
                .decode(&bytes)
                .map(Some)
                .map_err(|e| TileError::corrupt(&path, e)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(TileError::corrupt(&path, e)),
        }
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".partial");
    path.with_file_name(name)
}
