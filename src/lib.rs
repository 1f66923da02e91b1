//! # Worldmap Tiles
//!
//! Multi-resolution tile cache and generation pipeline for procedurally
//! generated world maps.
//!
//! A continuous zoom value resolves to an integer cell size (pixels per map
//! cell). At that size the map is a raster cut into fixed-size tiles, each
//! produced on demand by a pluggable content generator, persisted to disk, and
//! kept in a bounded memory cache. Views are assembled from whatever tiles are
//! in memory; missing tiles are generated in the background.
//!
//! ## Features
//!
//! - **Single-flight generation**: concurrent requests for one tile share one
//!   generation and receive the same image
//! - **Warm restarts**: tiles persist as `<root>/<cell_size>/<x>_<y>.png`
//!   and corrupt files are regenerated
//! - **Non-blocking composition**: the render loop never waits on a tile
//!
//! ## Architecture
//!
//! - [`geo`] - Zoom mapping and tile addressing (pure)
//! - [`tile`] - Cache, store, generator seam and single-flight coordinator
//! - [`view`] - Viewport composition and preloading
//! - [`map`] - The [`WorldMap`] facade used by the UI
//! - [`config`] - Map configuration and CLI types
//!
//! ## Example
//!
//! ```rust,no_run
//! use worldmap_tiles::geo::ViewRect;
//! use worldmap_tiles::tile::GraticuleGenerator;
//! use worldmap_tiles::{MapConfig, WorldMap};
//!
//! #[tokio::main]
//! async fn main() {
//!     let map = WorldMap::new(MapConfig::default(), GraticuleGenerator::default()).unwrap();
//!     let view = ViewRect::new(0, 0, 1280, 720);
//!
//!     // Wait for the tiles instead of reacting to ready-callbacks
//!     futures::future::join_all(map.preload_visible(4.0, view)).await;
//!
//!     let composed = map.assemble_view(4.0, view, None);
//!     assert!(composed.is_complete());
//! }
//! ```

pub mod config;
pub mod error;
pub mod geo;
pub mod map;
pub mod tile;
pub mod view;

// Re-export commonly used types
pub use config::{
    CheckConfig, ClearConfig, Cli, Command, MapArgs, MapConfig, OutputFormat, RenderConfig,
    WarmConfig,
};
pub use error::{ConfigError, TileError};
pub use geo::{GeoBounds, TileAddressSpace, TileKey, ViewRect, ZoomAnchor, ZoomMapper};
pub use map::{LevelReport, WorldMap};
pub use tile::{
    ContentGenerator, CoordinatorStats, GenerateRequest, GenerationCoordinator, TileCache,
    TileFormat, TileImage, TileStore,
};
pub use view::{ComposedView, PreloadSummary, TileReadyCallback, ViewCompositor};
