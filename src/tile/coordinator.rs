//! Single-flight tile production.
//!
//! The coordinator is the only component that creates tile pixels. For a
//! requested [`TileKey`] it consults, in order:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    GenerationCoordinator                        │
//! │  request_tile(key)                                              │
//! │    1. TileCache hit          → ready future                     │
//! │    2. in-flight entry        → the same shared future           │
//! │    3. spawn producer task    → register and return new future   │
//! │         a. TileStore::try_load  (fast path)                     │
//! │         b. ContentGenerator     (blocking pool)                 │
//! │         c. TileStore::save + TileCache::put                     │
//! │         d. drop in-flight entry                                 │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! At most one producer runs per key. Every concurrent caller for a key gets
//! a clone of the same [`futures::future::Shared`] future and therefore the
//! same [`TileImage`] handle.
//!
//! Producers run as detached tasks on the runtime. Dropping every clone of a
//! returned future does not cancel generation; the result still lands in the
//! cache for later callers.
//!
//! Generator output may be any non-empty size up to one full tile; anything
//! past the tile's clipped rectangle is cropped away before the tile is
//! stored.
//!
//! A failed generation resolves to [`TileImage::placeholder`], is neither
//! cached nor persisted, and the key becomes requestable again as soon as the
//! producer finishes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};
use image::imageops;
use serde::Serialize;
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

use crate::error::TileError;
use crate::geo::{TileAddressSpace, TileKey};

use super::cache::TileCache;
use super::generator::{ContentGenerator, GenerateRequest};
use super::image::TileImage;
use super::store::TileStore;

/// Future resolving to a tile. Cheap to clone; all clones share one result.
pub type TileFuture = Shared<BoxFuture<'static, TileImage>>;

// =============================================================================
// Statistics
// =============================================================================

/// Counters for tile production.
#[derive(Debug, Default)]
struct Counters {
    generated: AtomicU64,
    loaded: AtomicU64,
    failed: AtomicU64,
    persisted: AtomicU64,
    persist_failures: AtomicU64,
}

/// Snapshot of the coordinator's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CoordinatorStats {
    /// Tiles produced by the content generator
    pub generated: u64,

    /// Tiles loaded from disk
    pub loaded: u64,

    /// Generations that ended in a placeholder
    pub failed: u64,

    /// Tiles written to disk
    pub persisted: u64,

    /// Writes that failed
    pub persist_failures: u64,
}

// =============================================================================
// Generation Coordinator
// =============================================================================

struct Inner {
    space: TileAddressSpace,
    cache: Arc<TileCache>,
    store: Arc<TileStore>,
    generator: Arc<dyn ContentGenerator>,
    in_flight: Mutex<HashMap<TileKey, TileFuture>>,
    runtime: Handle,
    counters: Counters,
}

/// Coordinates cache, store, and generator so each tile is produced once.
///
/// Cloning yields another handle to the same coordinator.
#[derive(Clone)]
pub struct GenerationCoordinator {
    inner: Arc<Inner>,
}

impl GenerationCoordinator {
    /// Create a coordinator that spawns producers on `runtime`.
    pub fn new(
        space: TileAddressSpace,
        cache: Arc<TileCache>,
        store: Arc<TileStore>,
        generator: Arc<dyn ContentGenerator>,
        runtime: Handle,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                space,
                cache,
                store,
                generator,
                in_flight: Mutex::new(HashMap::new()),
                runtime,
                counters: Counters::default(),
            }),
        }
    }

    /// Request a tile.
    ///
    /// Never blocks: returns a resolved future on a cache hit, the pending
    /// future if the tile is already being produced, or registers a new
    /// producer otherwise. The future never fails; see the module docs for
    /// what a failure resolves to.
    pub fn request_tile(&self, key: TileKey) -> TileFuture {
        if let Some(image) = self.inner.cache.get(&key) {
            return ready(image);
        }

        let mut in_flight = self.inner.lock_in_flight();

        if let Some(pending) = in_flight.get(&key) {
            debug!(tile = %key, "Joining in-flight generation");
            return pending.clone();
        }

        // A producer may have finished between the cache miss and taking the
        // lock; it publishes to the cache before leaving the in-flight map.
        if let Some(image) = self.inner.cache.peek(&key) {
            return ready(image);
        }

        let inner = Arc::clone(&self.inner);
        let task = self.inner.runtime.spawn(async move {
            let _registration = InFlightGuard {
                inner: Arc::clone(&inner),
                key,
            };
            inner.produce(key).await
        });

        let future = async move {
            match task.await {
                Ok(image) => image,
                Err(e) => {
                    error!(tile = %key, error = %e, "Tile producer task failed");
                    TileImage::placeholder()
                }
            }
        }
        .boxed()
        .shared();

        in_flight.insert(key, future.clone());
        future
    }

    /// Whether a producer is currently registered for `key`.
    pub fn is_in_flight(&self, key: &TileKey) -> bool {
        self.inner.lock_in_flight().contains_key(key)
    }

    /// Number of producers currently registered.
    pub fn in_flight_count(&self) -> usize {
        self.inner.lock_in_flight().len()
    }

    pub fn cache(&self) -> &Arc<TileCache> {
        &self.inner.cache
    }

    pub fn store(&self) -> &Arc<TileStore> {
        &self.inner.store
    }

    pub fn address_space(&self) -> TileAddressSpace {
        self.inner.space
    }

    pub fn runtime(&self) -> &Handle {
        &self.inner.runtime
    }

    /// Snapshot of the production counters.
    pub fn stats(&self) -> CoordinatorStats {
        let c = &self.inner.counters;
        CoordinatorStats {
            generated: c.generated.load(Ordering::Relaxed),
            loaded: c.loaded.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            persisted: c.persisted.load(Ordering::Relaxed),
            persist_failures: c.persist_failures.load(Ordering::Relaxed),
        }
    }
}

fn ready(image: TileImage) -> TileFuture {
    futures::future::ready(image).boxed().shared()
}

/// Removes the in-flight entry when the producer finishes or unwinds.
struct InFlightGuard {
    inner: Arc<Inner>,
    key: TileKey,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.inner.lock_in_flight().remove(&self.key);
    }
}

impl Inner {
    fn lock_in_flight(&self) -> MutexGuard<'_, HashMap<TileKey, TileFuture>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Load or generate a tile, publishing successes to store and cache.
    async fn produce(&self, key: TileKey) -> TileImage {
        if let Some(image) = self.store.try_load(key).await {
            self.counters.loaded.fetch_add(1, Ordering::Relaxed);
            self.cache.put(key, image.clone());
            return image;
        }

        let image = match self.generate(key).await {
            Ok(image) => image,
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!(tile = %key, error = %e, "Tile generation failed; serving placeholder");
                return TileImage::placeholder();
            }
        };
        self.counters.generated.fetch_add(1, Ordering::Relaxed);

        match self.store.save(key, &image).await {
            Ok(true) => {
                self.counters.persisted.fetch_add(1, Ordering::Relaxed);
            }
            Ok(false) => {}
            Err(e) => {
                self.counters.persist_failures.fetch_add(1, Ordering::Relaxed);
                warn!(tile = %key, error = %e, "Tile kept in memory only");
            }
        }

        self.cache.put(key, image.clone());
        info!(tile = %key, width = image.width(), height = image.height(), "Generated tile");
        image
    }

    async fn generate(&self, key: TileKey) -> Result<TileImage, TileError> {
        let rect = self
            .space
            .tile_rect(key)
            .ok_or_else(|| TileError::InvalidDimensions {
                width: 0,
                height: 0,
                reason: format!("tile {} lies outside the map raster", key),
            })?;
        let bounds = self
            .space
            .geo_bounds(key)
            .ok_or_else(|| TileError::generation(key, "no geographic bounds"))?;

        let request = GenerateRequest {
            key,
            bounds,
            cell_size: key.cell_size,
            width: rect.width,
            height: rect.height,
        };

        let generator = Arc::clone(&self.generator);
        let pixels = tokio::task::spawn_blocking(move || generator.generate(&request))
            .await
            .map_err(|e| TileError::generation(key, format!("generator panicked: {}", e)))??;

        let (width, height) = pixels.dimensions();
        let tile_size = self.space.tile_size();
        if width == 0 || height == 0 || width > tile_size || height > tile_size {
            return Err(TileError::generation(
                key,
                format!(
                    "generator returned {}x{}, expected at most {}x{}",
                    width, height, tile_size, tile_size
                ),
            ));
        }

        // Generators may paint a full tile at the raster edge
        let pixels = if width > rect.width || height > rect.height {
            imageops::crop_imm(&pixels, 0, 0, width.min(rect.width), height.min(rect.height))
                .to_image()
        } else {
            pixels
        };

        Ok(TileImage::new(pixels))
    }
}

// =============================================================================
// Tests
// =============================================================================
