//! Tile production and caching.
//!
//! This module owns everything between a [`TileKey`](crate::geo::TileKey) and
//! the pixels for it.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │             ViewCompositor              │
//! └────────────────────┬────────────────────┘
//!                      │ request_tile
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │         GenerationCoordinator           │
//! │  ┌──────────────┐  ┌─────────────────┐  │
//! │  │  TileCache   │  │   TileStore     │  │
//! │  │  (decoded    │  │  (PNG/JPEG on   │  │
//! │  │   RGBA, LRU) │  │   disk)         │  │
//! │  └──────────────┘  └─────────────────┘  │
//! └────────────────────┬────────────────────┘
//!                      │ spawn_blocking
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │           ContentGenerator              │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`GenerationCoordinator`]: single-flight production, the only writer of
//!   cache and store
//! - [`TileCache`]: bounded LRU of decoded tiles
//! - [`TileStore`]: durable per-tile files with corrupt-file recovery
//! - [`TileCodec`]: PNG/JPEG encoding for the store
//! - [`ContentGenerator`]: the seam to whatever paints the map
//! - [`TileImage`]: reference-counted immutable pixels

mod cache;
mod coordinator;
mod encoder;
mod generator;
mod image;
mod store;

pub use cache::{TileCache, DEFAULT_TILE_CACHE_CAPACITY};
pub use coordinator::{CoordinatorStats, GenerationCoordinator, TileFuture};
pub use encoder::{
    clamp_quality, is_valid_quality, TileCodec, TileFormat, DEFAULT_JPEG_QUALITY,
    MAX_JPEG_QUALITY, MIN_JPEG_QUALITY,
};
pub use generator::{ContentGenerator, GenerateRequest, GraticuleGenerator};
pub use self::image::TileImage;
pub use store::{PathLocks, TileStore};
