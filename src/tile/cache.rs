//! In-memory cache of decoded tiles.
//!
//! This module provides a bounded LRU cache keyed by [`TileKey`], so that
//! compositing a view does not hit the disk or the generator for tiles that
//! were used recently.
//!
//! # Count-Based Eviction
//!
//! The cache holds at most `capacity` tiles. Inserting beyond that evicts the
//! least-recently-used entry. Evicted images are dropped immediately; callers
//! that still hold a [`TileImage`] handle keep their own reference.
//!
//! # Locking
//!
//! One mutex guards the map and the LRU order. Every operation, reads
//! included, takes it, which keeps `get` able to update recency. The lock is
//! synchronous so the render loop can consult the cache without an executor.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use lru::LruCache;
use tracing::debug;

use crate::geo::TileKey;

use super::image::TileImage;

/// Default cache capacity: 256 tiles
pub const DEFAULT_TILE_CACHE_CAPACITY: usize = 256;

// =============================================================================
// Tile Cache
// =============================================================================

/// LRU cache of decoded tiles with a fixed entry capacity.
///
/// # Thread Safety
///
/// The cache is thread-safe and can be shared via `Arc`.
///
/// # Example
///
/// ```
/// use image::RgbaImage;
/// use worldmap_tiles::geo::TileKey;
/// use worldmap_tiles::tile::{TileCache, TileImage};
///
/// let cache = TileCache::with_capacity(2);
/// let key = TileKey::new(4, 0, 0);
///
/// cache.put(key, TileImage::new(RgbaImage::new(8, 8)));
/// assert!(cache.get(&key).is_some());
/// ```
pub struct TileCache {
    /// The underlying LRU map
    entries: Mutex<LruCache<TileKey, TileImage>>,

    hits: AtomicU64,
    misses: AtomicU64,
}

impl TileCache {
    /// Create a new tile cache with default capacity (256 tiles).
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TILE_CACHE_CAPACITY)
    }

    /// Create a new tile cache holding at most `capacity` tiles.
    ///
    /// A capacity of zero is raised to one.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<TileKey, TileImage>> {
        // Entries are replaced wholesale, so a panic mid-operation cannot leave
        // a half-written value behind.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get a tile from the cache.
    ///
    /// This operation marks the entry as recently used.
    pub fn get(&self, key: &TileKey) -> Option<TileImage> {
        let found = self.lock().get(key).cloned();
        let counter = if found.is_some() {
            &self.hits
        } else {
            &self.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// Check if a tile is cached without updating LRU order.
    pub fn contains(&self, key: &TileKey) -> bool {
        self.lock().contains(key)
    }

    /// Get a tile without updating LRU order or statistics.
    pub fn peek(&self, key: &TileKey) -> Option<TileImage> {
        self.lock().peek(key).cloned()
    }

    /// Store a tile in the cache.
    ///
    /// If the tile already exists it is replaced and marked as recently used.
    /// Otherwise, when the cache is full, the least-recently-used entry is
    /// evicted.
    pub fn put(&self, key: TileKey, image: TileImage) {
        let displaced = self.lock().push(key, image);

        if let Some((old_key, old_image)) = displaced {
            if old_key != key {
                debug!(tile = %old_key, "Evicted tile from memory cache");
            }
            drop(old_image);
        }
    }

    /// Remove a tile from the cache.
    pub fn remove(&self, key: &TileKey) -> Option<TileImage> {
        self.lock().pop(key)
    }

    /// Clear all entries from the cache.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Get the current number of cached tiles.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Get the maximum number of tiles.
    pub fn capacity(&self) -> usize {
        self.lock().cap().get()
    }

    /// Keys from most to least recently used.
    pub fn keys(&self) -> Vec<TileKey> {
        self.lock().iter().map(|(key, _)| *key).collect()
    }

    /// `(hits, misses)` counted by [`TileCache::get`].
    pub fn hit_stats(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }
}

impl Default for TileCache {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
