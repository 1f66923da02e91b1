//! The map as the UI sees it.
//!
//! [`WorldMap`] wires zoom mapping, cache, store, coordinator and compositor
//! together from a [`MapConfig`] and exposes the handful of calls a render
//! loop needs.

use std::sync::Arc;

use serde::Serialize;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::MapConfig;
use crate::error::ConfigError;
use crate::geo::{TileAddressSpace, TileKey, ViewRect};
use crate::tile::{
    ContentGenerator, CoordinatorStats, GenerationCoordinator, TileCache, TileFuture, TileStore,
};
use crate::view::{ComposedView, PreloadSummary, TileReadyCallback, ViewCompositor};

/// Summary of one zoom level's disk cache.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LevelReport {
    pub zoom: f64,
    pub cell_size: u32,
    pub map_width: u32,
    pub map_height: u32,
    pub tiles_x: u32,
    pub tiles_y: u32,
    pub tiles_on_disk: usize,
    pub complete: bool,
}

impl LevelReport {
    pub fn total_tiles(&self) -> u64 {
        self.tiles_x as u64 * self.tiles_y as u64
    }
}

/// A tiled, cached, lazily generated world map.
///
/// # Example
///
/// ```no_run
/// use image::RgbaImage;
/// use worldmap_tiles::geo::ViewRect;
/// use worldmap_tiles::tile::GenerateRequest;
/// use worldmap_tiles::{MapConfig, TileError, WorldMap};
///
/// #[tokio::main]
/// async fn main() {
///     let config = MapConfig::new(360, 180, "/tmp/worldmap-cache");
///     let generator = |request: &GenerateRequest| {
///         Ok::<_, TileError>(RgbaImage::new(request.width, request.height))
///     };
///     let map = WorldMap::new(config, generator).unwrap();
///
///     let view = map.assemble_view(3.0, ViewRect::new(0, 0, 1024, 768), None);
///     println!("{} tiles still loading", view.missing);
/// }
/// ```
pub struct WorldMap {
    config: MapConfig,
    compositor: ViewCompositor,
}

impl WorldMap {
    /// Build a map that runs its background work on the current runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime; use
    /// [`WorldMap::with_runtime`] from other threads.
    pub fn new(config: MapConfig, generator: impl ContentGenerator) -> Result<Self, ConfigError> {
        Self::with_runtime(config, Arc::new(generator), Handle::current())
    }

    /// Build a map whose background work runs on `runtime`.
    pub fn with_runtime(
        config: MapConfig,
        generator: Arc<dyn ContentGenerator>,
        runtime: Handle,
    ) -> Result<Self, ConfigError> {
        let zoom = config.zoom_mapper()?;
        let space = TileAddressSpace::new(config.base_width, config.base_height, config.tile_size_px);
        let cache = Arc::new(TileCache::with_capacity(config.cache_capacity));
        let store = Arc::new(TileStore::new(config.cache_dir.clone(), config.tile_format));

        info!(
            base_width = config.base_width,
            base_height = config.base_height,
            tile_size = config.tile_size_px,
            max_cell_size = zoom.max_cell_size(),
            cache_dir = %config.cache_dir.display(),
            "Initialized world map"
        );

        let coordinator = GenerationCoordinator::new(space, cache, store, generator, runtime);
        let compositor = ViewCompositor::new(
            coordinator,
            zoom,
            config.raster_limits(),
            config.preload_parallelism,
        );

        Ok(Self { config, compositor })
    }

    pub fn config(&self) -> &MapConfig {
        &self.config
    }

    pub fn compositor(&self) -> &ViewCompositor {
        &self.compositor
    }

    pub fn coordinator(&self) -> &GenerationCoordinator {
        self.compositor.coordinator()
    }

    pub fn cache(&self) -> &Arc<TileCache> {
        self.coordinator().cache()
    }

    pub fn store(&self) -> &Arc<TileStore> {
        self.coordinator().store()
    }

    pub fn address_space(&self) -> TileAddressSpace {
        self.coordinator().address_space()
    }

    /// Pixels per cell at `zoom`.
    pub fn cell_size(&self, zoom: f64) -> u32 {
        self.compositor.cell_size(zoom)
    }

    /// Full raster size at `zoom`.
    pub fn get_map_size(&self, zoom: f64) -> (u32, u32) {
        self.compositor.map_size(zoom)
    }

    /// See [`ViewCompositor::assemble_view`].
    pub fn assemble_view(
        &self,
        zoom: f64,
        view: ViewRect,
        on_ready: Option<TileReadyCallback>,
    ) -> ComposedView {
        self.compositor.assemble_view(zoom, view, on_ready)
    }

    /// See [`ViewCompositor::preload_visible`].
    pub fn preload_visible(&self, zoom: f64, view: ViewRect) -> Vec<TileFuture> {
        self.compositor.preload_visible(zoom, view)
    }

    /// See [`ViewCompositor::preload_region`].
    pub async fn preload_region<P>(
        &self,
        zoom: f64,
        view: ViewRect,
        radius: u32,
        cancel: &CancellationToken,
        progress: P,
    ) -> PreloadSummary
    where
        P: FnMut(usize, usize) + Send,
    {
        self.compositor
            .preload_region(zoom, view, radius, cancel, progress)
            .await
    }

    pub fn request_tile(&self, key: TileKey) -> TileFuture {
        self.coordinator().request_tile(key)
    }

    /// Drop every tile held in memory. Disk files are kept.
    pub fn clear_cache(&self) {
        let released = self.cache().len();
        self.cache().clear();
        self.compositor.reset_pending();
        info!(released, "Cleared memory tile cache");
    }

    /// Whether every tile of the level `zoom` resolves to is on disk.
    pub async fn is_cache_complete(&self, zoom: f64) -> bool {
        let cell_size = self.cell_size(zoom);
        let (tiles_x, tiles_y) = self.address_space().tile_grid(cell_size);
        self.store()
            .is_level_complete(cell_size, tiles_x, tiles_y)
            .await
    }

    /// Disk cache summary for the level `zoom` resolves to.
    pub async fn level_report(&self, zoom: f64) -> LevelReport {
        let cell_size = self.cell_size(zoom);
        let space = self.address_space();
        let (map_width, map_height) = space.map_size(cell_size);
        let (tiles_x, tiles_y) = space.tile_grid(cell_size);

        LevelReport {
            zoom,
            cell_size,
            map_width,
            map_height,
            tiles_x,
            tiles_y,
            tiles_on_disk: self.store().count_level(cell_size).await,
            complete: self.is_cache_complete(zoom).await,
        }
    }

    pub fn stats(&self) -> CoordinatorStats {
        self.coordinator().stats()
    }
}
